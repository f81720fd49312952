// 该文件是 Wangqiu （网球） 项目的一部分。
// src/output.rs - 输出定义
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
use tracing::info;

use crate::{config::PredictConfig, frame::RgbFrame, input::SourceKind, model::DetectResult};

pub trait Render {
  type Error;

  fn render_result(&mut self, frame: &RgbFrame, result: &DetectResult) -> Result<(), Self::Error>;

  /// 收尾（例如写入视频文件尾），默认什么也不做
  fn finish(self) -> Result<(), Self::Error>
  where
    Self: Sized,
  {
    Ok(())
  }
}

impl<R: Render> Render for Option<R> {
  type Error = R::Error;

  fn render_result(&mut self, frame: &RgbFrame, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      Some(output) => output.render_result(frame, result),
      None => Ok(()),
    }
  }

  fn finish(self) -> Result<(), Self::Error> {
    match self {
      Some(output) => output.finish(),
      None => Ok(()),
    }
  }
}

pub mod draw;
pub mod label_record;
pub mod save_dir;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{GStreamerVideoOutput, GStreamerVideoOutputError};

use self::{draw::Draw, label_record::LabelRecord};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
  #[error("未启用 {feature} 特性，无法保存{kind}结果")]
  Unsupported {
    kind: &'static str,
    feature: &'static str,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "gstreamer_output")]
  GStreamerVideoOutput(GStreamerVideoOutput),
}

impl OutputWrapper {
  /// 按输入源类型选择保存方式，文件名沿用输入源
  pub fn create(
    source: &Path,
    kind: SourceKind,
    fps: Option<f64>,
    save_dir: &Path,
    draw: Draw,
  ) -> Result<Self, OutputError> {
    match kind {
      SourceKind::Image => {
        let file_name = source
          .file_name()
          .map(PathBuf::from)
          .unwrap_or_else(|| PathBuf::from("image.jpg"));
        create_image(save_dir.join(file_name), draw)
      }
      SourceKind::Video => {
        let stem = source
          .file_stem()
          .map(|s| s.to_string_lossy().into_owned())
          .unwrap_or_else(|| "video".to_string());
        create_video(
          save_dir.join(format!("{}.mp4", stem)),
          fps.unwrap_or(DEFAULT_FPS),
          draw,
        )
      }
    }
  }
}

const DEFAULT_FPS: f64 = 30.0;

#[cfg(feature = "save_image_file")]
fn create_image(path: PathBuf, draw: Draw) -> Result<OutputWrapper, OutputError> {
  Ok(OutputWrapper::SaveImageFileOutput(SaveImageFileOutput::new(
    path, draw,
  )))
}

#[cfg(not(feature = "save_image_file"))]
fn create_image(_path: PathBuf, _draw: Draw) -> Result<OutputWrapper, OutputError> {
  Err(OutputError::Unsupported {
    kind: "图片",
    feature: "save_image_file",
  })
}

#[cfg(feature = "gstreamer_output")]
fn create_video(path: PathBuf, fps: f64, draw: Draw) -> Result<OutputWrapper, OutputError> {
  Ok(OutputWrapper::GStreamerVideoOutput(GStreamerVideoOutput::new(
    path, fps, draw,
  )))
}

#[cfg(not(feature = "gstreamer_output"))]
fn create_video(_path: PathBuf, _fps: f64, _draw: Draw) -> Result<OutputWrapper, OutputError> {
  Err(OutputError::Unsupported {
    kind: "视频",
    feature: "gstreamer_output",
  })
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&mut self, frame: &RgbFrame, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }

  fn finish(self) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.finish().map_err(OutputError::from),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output.finish().map_err(OutputError::from),
    }
  }
}

/// `save=True` 时的完整输出：保存目录、标注后的媒体文件、可选的 txt 标签
pub struct PredictOutput {
  save_dir: PathBuf,
  media: OutputWrapper,
  labels: Option<LabelRecord>,
}

impl PredictOutput {
  pub fn create(
    source: &Path,
    kind: SourceKind,
    fps: Option<f64>,
    config: &PredictConfig,
  ) -> Result<Self, OutputError> {
    let save_dir = save_dir::increment_path(&config.project.join(&config.name))?;
    info!("结果将保存到 {}", save_dir.display());

    let draw = Draw::new(config.font.as_deref());
    let media = OutputWrapper::create(source, kind, fps, &save_dir, draw)?;
    let labels = config
      .save_txt
      .then(|| LabelRecord::new(save_dir.join("labels"), source, kind, config.save_conf));

    Ok(PredictOutput {
      save_dir,
      media,
      labels,
    })
  }

  pub fn save_dir(&self) -> &Path {
    &self.save_dir
  }
}

impl Render for PredictOutput {
  type Error = OutputError;

  fn render_result(&mut self, frame: &RgbFrame, result: &DetectResult) -> Result<(), Self::Error> {
    self.media.render_result(frame, result)?;
    if let Some(labels) = &self.labels {
      labels.record(result)?;
    }
    Ok(())
  }

  fn finish(self) -> Result<(), Self::Error> {
    self.media.finish()?;
    info!("结果已保存到 {}", self.save_dir.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Boxes, DetectBox, Speed};

  struct Counting {
    frames: usize,
    finished: bool,
  }

  impl Render for &mut Counting {
    type Error = std::convert::Infallible;

    fn render_result(&mut self, _: &RgbFrame, _: &DetectResult) -> Result<(), Self::Error> {
      self.frames += 1;
      Ok(())
    }

    fn finish(self) -> Result<(), Self::Error> {
      self.finished = true;
      Ok(())
    }
  }

  fn result() -> DetectResult {
    DetectResult {
      path: "court.png".to_string(),
      frame: 0,
      orig_shape: (4, 8),
      boxes: Boxes::from(vec![DetectBox {
        xyxy: [1.0, 1.0, 6.0, 3.0],
        conf: 0.8,
        cls: 0,
        name: "person".to_string(),
      }]),
      speed: Speed::default(),
    }
  }

  #[test]
  fn optional_output_forwards_or_skips() {
    let frame = RgbFrame::from(image::RgbImage::new(8, 4));
    let mut counting = Counting {
      frames: 0,
      finished: false,
    };

    let mut none: Option<&mut Counting> = None;
    none.render_result(&frame, &result()).unwrap();
    none.finish().unwrap();

    let mut some = Some(&mut counting);
    some.render_result(&frame, &result()).unwrap();
    some.finish().unwrap();

    assert_eq!(counting.frames, 1);
    assert!(counting.finished);
  }

  #[cfg(feature = "save_image_file")]
  #[test]
  fn image_prediction_lands_in_fresh_save_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = PredictConfig {
      project: dir.path().join("runs/detect"),
      save_txt: true,
      ..PredictConfig::default()
    };
    std::fs::create_dir_all(config.project.join("predict")).unwrap();

    let source = Path::new("court.png");
    let mut output = PredictOutput::create(source, SourceKind::Image, None, &config).unwrap();
    assert_eq!(output.save_dir(), config.project.join("predict2"));

    let frame = RgbFrame::from(image::RgbImage::new(8, 4));
    output.render_result(&frame, &result()).unwrap();
    let save_dir = output.save_dir().to_path_buf();
    output.finish().unwrap();

    assert!(save_dir.join("court.png").is_file());
    assert!(save_dir.join("labels/court.txt").is_file());
  }
}
