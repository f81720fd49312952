// 该文件是 Wangqiu （网球） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

use crate::frame::RgbFrame;

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 单张图片输入，迭代一次后结束
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl ImageFileInput {
  pub fn open(path: &Path) -> Result<Self, ImageFileInputError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    debug!(
      "读取图片 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );

    Ok(ImageFileInput {
      image: Some(image.into_rgb8()),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take().map(RgbFrame::from)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_the_image_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("court.png");
    RgbImage::from_pixel(8, 4, image::Rgb([0, 128, 0]))
      .save(&path)
      .unwrap();

    let mut input = ImageFileInput::open(&path).unwrap();
    let frame = input.next().unwrap();
    assert_eq!((frame.width(), frame.height()), (8, 4));
    assert_eq!(frame.index, 0);
    assert!(input.next().is_none());
  }
}
