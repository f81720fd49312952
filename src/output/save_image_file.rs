// 该文件是 Wangqiu （网球） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::{
  frame::RgbFrame,
  model::DetectResult,
  output::{Render, draw::Draw},
};

pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

impl SaveImageFileOutput {
  pub fn new(path: PathBuf, draw: Draw) -> Self {
    Self { path, draw }
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&mut self, frame: &RgbFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let mut image = frame.to_rgb_image();
    self.draw.draw_detections(&mut image, &result.boxes);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Boxes, DetectBox, Speed};

  #[test]
  fn annotated_copy_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/court.png");
    let mut output = SaveImageFileOutput::new(path.clone(), Draw::boxes_only());

    let frame = RgbFrame::from(image::RgbImage::new(32, 16));
    let result = DetectResult {
      path: "court.png".to_string(),
      frame: 0,
      orig_shape: (16, 32),
      boxes: Boxes::from(vec![DetectBox {
        xyxy: [2.0, 2.0, 20.0, 12.0],
        conf: 0.7,
        cls: 0,
        name: "person".to_string(),
      }]),
      speed: Speed::default(),
    };
    output.render_result(&frame, &result).unwrap();

    let saved = image::open(&path).unwrap().into_rgb8();
    assert_eq!(saved.dimensions(), (32, 16));
    assert_eq!(*saved.get_pixel(2, 5), crate::output::draw::color(0));
  }
}
