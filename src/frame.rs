// 该文件是 Wangqiu （网球） 项目的一部分。
// src/frame.rs - RGB 帧定义
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

use image::RgbImage;
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 紧密排列的 RGB 帧（NHWC，行间无填充）
#[derive(Debug, Clone)]
pub struct RgbFrame {
  data: Box<[u8]>,
  width: u32,
  height: u32,
  /// 帧序号，从 0 开始
  pub index: u64,
  /// 时间戳（毫秒），图片输入恒为 0
  pub timestamp_ms: u64,
}

impl RgbFrame {
  pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      width,
      height,
      index: 0,
      timestamp_ms: 0,
    })
  }

  pub fn with_position(mut self, index: u64, timestamp_ms: u64) -> Self {
    self.index = index;
    self.timestamp_ms = timestamp_ms;
    self
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn as_nhwc(&self) -> &[u8] {
    &self.data
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    // 长度在构造时已校验，from_raw 不会失败
    RgbImage::from_raw(self.width, self.height, self.data.to_vec())
      .unwrap_or_else(|| RgbImage::new(self.width, self.height))
  }
}

impl From<RgbImage> for RgbFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      data: image.into_raw().into_boxed_slice(),
      width,
      height,
      index: 0,
      timestamp_ms: 0,
    }
  }
}
