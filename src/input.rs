// 该文件是 Wangqiu （网球） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::frame::{FrameError, RgbFrame};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError};

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("输入文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("未启用 {feature} 特性，无法读取: {path}")]
  Unsupported { path: PathBuf, feature: &'static str },
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
}

/// 输入源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
  Image,
  Video,
}

impl SourceKind {
  /// 按扩展名判断，非图片一律按视频处理
  pub fn of(path: &Path) -> Self {
    let is_image = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| {
        IMAGE_EXTENSIONS
          .iter()
          .any(|known| ext.eq_ignore_ascii_case(known))
      })
      .unwrap_or(false);

    if is_image {
      SourceKind::Image
    } else {
      SourceKind::Video
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      SourceKind::Image => "image",
      SourceKind::Video => "video",
    }
  }
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
}

impl InputWrapper {
  pub fn open(path: &Path) -> Result<Self, InputError> {
    if !path.is_file() {
      return Err(InputError::NotFound(path.to_path_buf()));
    }

    match SourceKind::of(path) {
      SourceKind::Image => open_image(path),
      SourceKind::Video => open_video(path),
    }
  }

  pub fn kind(&self) -> SourceKind {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(_) => SourceKind::Image,
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(_) => SourceKind::Video,
    }
  }

  /// 帧率，图片输入为 `None`
  pub fn fps(&self) -> Option<f64> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(_) => None,
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => Some(input.fps()),
    }
  }
}

#[cfg(feature = "read_image_file")]
fn open_image(path: &Path) -> Result<InputWrapper, InputError> {
  Ok(InputWrapper::ReadImageFile(ImageFileInput::open(path)?))
}

#[cfg(not(feature = "read_image_file"))]
fn open_image(path: &Path) -> Result<InputWrapper, InputError> {
  Err(InputError::Unsupported {
    path: path.to_path_buf(),
    feature: "read_image_file",
  })
}

#[cfg(feature = "gstreamer_input")]
fn open_video(path: &Path) -> Result<InputWrapper, InputError> {
  Ok(InputWrapper::GStreamerInput(GStreamerInput::open(path)?))
}

#[cfg(not(feature = "gstreamer_input"))]
fn open_video(path: &Path) -> Result<InputWrapper, InputError> {
  Err(InputError::Unsupported {
    path: path.to_path_buf(),
    feature: "gstreamer_input",
  })
}

impl Iterator for InputWrapper {
  type Item = Result<RgbFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next().map(Ok),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next().map(|r| r.map_err(InputError::from)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn source_kind_by_extension() {
    assert_eq!(SourceKind::of(Path::new("court.JPG")), SourceKind::Image);
    assert_eq!(SourceKind::of(Path::new("a/b/serve.webp")), SourceKind::Image);
    assert_eq!(
      SourceKind::of(Path::new("input_videos/input_video.mp4")),
      SourceKind::Video
    );
    assert_eq!(SourceKind::of(Path::new("no_extension")), SourceKind::Video);
  }

  #[test]
  fn missing_file_fails_before_decoding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.mp4");
    match InputWrapper::open(&path) {
      Err(InputError::NotFound(p)) => assert_eq!(p, path),
      Err(other) => panic!("unexpected error: {other}"),
      Ok(_) => panic!("missing file opened"),
    }
  }
}
