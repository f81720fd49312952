// 该文件是 Wangqiu （网球） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出
//!
//! 把标注后的帧编码为 MP4 (H.264)。管道在收到第一帧时按帧尺寸建立：
//!
//! `appsrc ! videoconvert ! video/x-raw,format=I420 ! x264enc ! h264parse ! mp4mux ! filesink`
//!
//! `finish` 发送 EOS 并等待 mp4mux 写完文件尾；未调用 `finish` 就被丢弃时，
//! `Drop` 会做同样的事情。

use std::path::PathBuf;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  frame::RgbFrame,
  model::DetectResult,
  output::{Render, draw::Draw},
};

const EOS_TIMEOUT_SECS: u64 = 30;
const RGB_CHANNELS: usize = 3;

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 无法转换元素为 appsrc
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 缓冲区创建错误
  #[error("Buffer creation error")]
  BufferCreationError,
  /// 帧尺寸与第一帧不一致
  #[error("Frame size changed from {expected:?} to {actual:?}")]
  FrameSizeChanged {
    expected: (u32, u32),
    actual: (u32, u32),
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

struct Pipeline {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  video_info: gst_video::VideoInfo,
}

/// GStreamer 视频文件输出
pub struct GStreamerVideoOutput {
  path: PathBuf,
  fps: f64,
  draw: Draw,
  pipeline: Option<Pipeline>,
  frame_count: u64,
}

impl GStreamerVideoOutput {
  pub fn new(path: PathBuf, fps: f64, draw: Draw) -> Self {
    Self {
      path,
      fps,
      draw,
      pipeline: None,
      frame_count: 0,
    }
  }

  fn start(&self, width: u32, height: u32) -> Result<Pipeline, GStreamerVideoOutputError> {
    gst::init()?;

    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let pipeline_desc = "appsrc name=src ! videoconvert ! video/x-raw,format=I420 \
       ! x264enc speed-preset=fast ! h264parse ! mp4mux ! filesink name=sink";
    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let filesink = pipeline
      .by_name("sink")
      .ok_or_else(|| GStreamerVideoOutputError::PipelineError("filesink not found".to_string()))?;
    filesink.set_property("location", &*self.path.to_string_lossy());

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;

    let video_info = gst_video::VideoInfo::builder(gst_video::VideoFormat::Rgb, width, height)
      .fps(fps_fraction(self.fps))
      .build()?;
    let caps = video_info.to_caps()?;

    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;

    info!(
      "Video output initialized: {}x{} @ {:.2} fps -> {}",
      width,
      height,
      self.fps,
      self.path.display()
    );

    Ok(Pipeline {
      pipeline,
      appsrc,
      video_info,
    })
  }

  fn push_frame(&mut self, image: &image::RgbImage) -> Result<(), GStreamerVideoOutputError> {
    let size = (image.width(), image.height());
    if self.pipeline.is_none() {
      self.pipeline = Some(self.start(size.0, size.1)?);
    }
    let Some(state) = &self.pipeline else {
      return Err(GStreamerVideoOutputError::PipelineError(
        "Pipeline not started".to_string(),
      ));
    };

    let expected = (state.video_info.width(), state.video_info.height());
    if expected != size {
      return Err(GStreamerVideoOutputError::FrameSizeChanged {
        expected,
        actual: size,
      });
    }

    let stride = state.video_info.stride()[0] as usize;
    let mut buffer = gst::Buffer::with_size(state.video_info.size())
      .map_err(|_| GStreamerVideoOutputError::BufferCreationError)?;

    let duration_ns = (1_000_000_000.0 / self.fps) as u64;
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(
        self.frame_count * duration_ns,
      ));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(duration_ns));

      let mut map = buffer_ref.map_writable().map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to map buffer".to_string())
      })?;
      copy_rows(image.as_raw(), map.as_mut_slice(), size.0 as usize, stride);
    }

    state.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    self.frame_count += 1;

    Ok(())
  }

  fn close(&mut self) -> Result<(), GStreamerVideoOutputError> {
    let Some(state) = self.pipeline.take() else {
      return Ok(());
    };

    let _ = state.appsrc.end_of_stream();

    let outcome = match state.pipeline.bus() {
      Some(bus) => match bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      ) {
        Some(message) => match message.view() {
          gst::MessageView::Error(err) => Err(GStreamerVideoOutputError::PipelineError(format!(
            "{} ({})",
            err.error(),
            err.debug().map(|d| d.to_string()).unwrap_or_default()
          ))),
          _ => Ok(()),
        },
        None => {
          warn!("等待 EOS 超时，视频文件可能不完整");
          Ok(())
        }
      },
      None => Ok(()),
    };

    state.pipeline.set_state(gst::State::Null)?;
    info!(
      "Video output closed. Total frames written: {} -> {}",
      self.frame_count,
      self.path.display()
    );

    outcome
  }
}

impl Render for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn render_result(&mut self, frame: &RgbFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let mut image = frame.to_rgb_image();
    self.draw.draw_detections(&mut image, &result.boxes);
    self.push_frame(&image)
  }

  fn finish(mut self) -> Result<(), Self::Error> {
    self.close()
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      warn!("Failed to close GStreamer video output: {}", e);
    }
  }
}

/// 帧率转为分数，保留三位小数（29.97 -> 29970/1000）
fn fps_fraction(fps: f64) -> gst::Fraction {
  if fps.is_finite() && fps > 0.0 {
    let numer = (fps * 1000.0).round() as i32;
    let divisor = gcd(numer, 1000);
    gst::Fraction::new(numer / divisor, 1000 / divisor)
  } else {
    gst::Fraction::new(30, 1)
  }
}

fn gcd(a: i32, b: i32) -> i32 {
  if b == 0 { a.abs().max(1) } else { gcd(b, a % b) }
}

/// 紧密排列的 RGB 行拷贝到带对齐填充的目标缓冲
fn copy_rows(src: &[u8], dst: &mut [u8], width: usize, stride: usize) {
  let row = width * RGB_CHANNELS;
  for (src_row, dst_row) in src.chunks_exact(row).zip(dst.chunks_mut(stride)) {
    dst_row[..row].copy_from_slice(src_row);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fps_becomes_reduced_fraction() {
    let f = fps_fraction(30.0);
    assert_eq!((f.numer(), f.denom()), (30, 1));
    let f = fps_fraction(29.97);
    assert_eq!((f.numer(), f.denom()), (2997, 100));
    let f = fps_fraction(0.0);
    assert_eq!((f.numer(), f.denom()), (30, 1));
  }

  #[test]
  fn rows_are_copied_into_padded_stride() {
    let src: Vec<u8> = (0..12).collect();
    let mut dst = vec![0xEE; 16];
    copy_rows(&src, &mut dst, 2, 8);
    assert_eq!(&dst[..6], &[0, 1, 2, 3, 4, 5]);
    assert_eq!(&dst[6..8], &[0xEE, 0xEE]);
    assert_eq!(&dst[8..14], &[6, 7, 8, 9, 10, 11]);
  }
}
