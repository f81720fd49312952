// 该文件是 Wangqiu （网球） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件输入
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

//! # GStreamer 视频文件输入
//!
//! 管道固定为
//! `filesrc ! decodebin ! videoconvert ! video/x-raw,format=RGB ! appsink`，
//! 打开时先 preroll，拿到宽高与帧率后再进入播放状态。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev \
//!   gstreamer1.0-plugins-good gstreamer1.0-libav
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use std::path::Path;
//! use wangqiu::input::GStreamerInput;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let input = GStreamerInput::open(Path::new("input_video.mp4"))?;
//! println!("{}x{} @ {:.2} fps", input.width(), input.height(), input.fps());
//! for frame in input {
//!   let frame = frame?;
//!   println!("帧 {} ({}ms)", frame.index, frame.timestamp_ms);
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::{FrameError, RgbFrame};

const PREROLL_TIMEOUT_SECS: u64 = 30;
const RGB_CHANNELS: usize = 3;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Frame error: {0}")]
  FrameError(#[from] FrameError),
}

/// GStreamer 视频文件输入
///
/// 管理解码管道和 appsink，按顺序产出 RGB 帧，EOS 后迭代结束。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  width: u32,
  height: u32,
  fps: f64,
  frame_index: u64,
  finished: bool,
}

impl GStreamerInput {
  pub fn open(path: &Path) -> Result<Self, GStreamerInputError> {
    gst::init()?;

    let description = "filesrc name=src ! decodebin ! videoconvert ! video/x-raw,format=RGB \
       ! appsink name=sink sync=false max-buffers=4 drop=false";
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let filesrc = pipeline
      .by_name("src")
      .ok_or_else(|| GStreamerInputError::PipelineError("filesrc not found".to_string()))?;
    filesrc.set_property("location", &*path.to_string_lossy());

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    // preroll 后才能拿到协商好的 caps
    pipeline.set_state(gst::State::Paused)?;
    let (state, _, _) = pipeline.state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
    if let Err(e) = state {
      let detail = pop_bus_error(&pipeline).unwrap_or_else(|| e.to_string());
      let _ = pipeline.set_state(gst::State::Null);
      return Err(GStreamerInputError::PipelineError(detail));
    }

    let preroll = appsink.pull_preroll()?;
    let caps = preroll
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let fps = {
      let fraction = video_info.fps();
      if fraction.denom() > 0 && fraction.numer() > 0 {
        fraction.numer() as f64 / fraction.denom() as f64
      } else {
        warn!("视频未声明帧率，按 30 fps 处理");
        30.0
      }
    };

    pipeline.set_state(gst::State::Playing)?;

    info!(
      "视频已打开: {} {}x{} @ {:.2} fps",
      path.display(),
      video_info.width(),
      video_info.height(),
      fps
    );

    Ok(GStreamerInput {
      pipeline,
      appsink,
      width: video_info.width(),
      height: video_info.height(),
      fps,
      frame_index: 0,
      finished: false,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn fps(&self) -> f64 {
    self.fps
  }

  fn convert_sample(&self, sample: gst::Sample) -> Result<RgbFrame, GStreamerInputError> {
    let buffer = sample
      .buffer()
      .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
    let caps = sample
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let width = video_info.width();
    let height = video_info.height();
    let stride = video_info.stride()[0] as usize;

    let map = buffer.map_readable().map_err(|e| {
      GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
    })?;
    let data = pack_rows(map.as_slice(), width as usize, height as usize, stride)?;

    let timestamp_ms = buffer.pts().map(|pts| pts.mseconds()).unwrap_or(0);
    Ok(RgbFrame::from_raw(width, height, data)?.with_position(self.frame_index, timestamp_ms))
  }
}

impl Iterator for GStreamerInput {
  type Item = Result<RgbFrame, GStreamerInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match self.appsink.pull_sample() {
      Ok(sample) => {
        let frame = self.convert_sample(sample);
        self.frame_index += 1;
        Some(frame)
      }
      Err(_) => {
        self.finished = true;
        if self.appsink.is_eos() {
          debug!("视频读取结束，共 {} 帧", self.frame_index);
          return None;
        }
        let detail =
          pop_bus_error(&self.pipeline).unwrap_or_else(|| "Failed to pull sample".to_string());
        Some(Err(GStreamerInputError::PipelineError(detail)))
      }
    }
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

fn pop_bus_error(pipeline: &gst::Pipeline) -> Option<String> {
  let bus = pipeline.bus()?;
  let message = bus.pop_filtered(&[gst::MessageType::Error])?;
  match message.view() {
    gst::MessageView::Error(err) => Some(format!(
      "{} ({})",
      err.error(),
      err.debug().map(|d| d.to_string()).unwrap_or_default()
    )),
    _ => None,
  }
}

/// 去掉每行末尾的对齐填充，得到紧密排列的 RGB 数据
fn pack_rows(
  data: &[u8],
  width: usize,
  height: usize,
  stride: usize,
) -> Result<Vec<u8>, GStreamerInputError> {
  let row = width * RGB_CHANNELS;
  let expected = if height == 0 {
    0
  } else {
    stride * (height - 1) + row
  };
  if stride < row || data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  if stride == row {
    return Ok(data[..row * height].to_vec());
  }

  let mut packed = Vec::with_capacity(row * height);
  for y in 0..height {
    packed.extend_from_slice(&data[y * stride..y * stride + row]);
  }
  Ok(packed)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn padded_rows_are_packed() {
    // 宽 3 像素，每行 9 字节，对齐到 12 字节
    let mut data = Vec::new();
    for y in 0..2u8 {
      data.extend((0..9).map(|i| y * 10 + i));
      data.extend([0xEE; 3]);
    }

    let packed = pack_rows(&data, 3, 2, 12).unwrap();
    assert_eq!(packed.len(), 18);
    assert_eq!(&packed[..9], &[0, 1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(packed[9], 10);
    assert!(!packed.contains(&0xEE));
  }

  #[test]
  fn short_buffer_is_rejected() {
    let err = pack_rows(&[0u8; 20], 4, 2, 12).unwrap_err();
    assert!(matches!(
      err,
      GStreamerInputError::BufferSizeMismatch {
        expected: 24,
        actual: 20
      }
    ));
  }
}
