// 该文件是 Wangqiu （网球） 项目的一部分。
// src/task.rs - 逐帧预测任务
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

use tracing::info;

use crate::{
  frame::RgbFrame,
  input::SourceKind,
  model::{DetectResult, Detector, Speed},
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 对输入源的每一帧做检测，收集全部结果
#[derive(Debug, Clone)]
pub struct PredictTask {
  path: String,
  kind: SourceKind,
}

impl PredictTask {
  pub fn new(path: impl Into<String>, kind: SourceKind) -> Self {
    Self {
      path: path.into(),
      kind,
    }
  }
}

impl<
  FE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<RgbFrame, FE>>,
  M: Detector<Error = ME>,
  O: Render<Error = RE>,
> Task<I, M, O> for PredictTask
{
  type Output = Vec<DetectResult>;
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, mut output: O) -> Result<Self::Output, Self::Error> {
    info!("开始预测: {}", self.path);
    let mut results = Vec::new();
    let mut total = Speed::default();

    for frame in input {
      let frame = frame?;
      let detections = model.detect(&frame)?;

      let result = DetectResult {
        path: self.path.clone(),
        frame: frame.index,
        orig_shape: (frame.height(), frame.width()),
        boxes: detections.boxes,
        speed: detections.speed,
      };

      info!(
        "{} (frame {}) {}: {}x{} {}, {:.1}ms",
        self.kind.as_str(),
        frame.index + 1,
        self.path,
        frame.height(),
        frame.width(),
        result.boxes.summary(),
        result.speed.inference
      );

      output.render_result(&frame, &result)?;
      total += result.speed;
      results.push(result);
    }

    output.finish()?;

    if !results.is_empty() {
      let n = results.len() as f64;
      let height = results[0].orig_shape.0;
      let width = results[0].orig_shape.1;
      info!(
        "Speed: {:.1}ms preprocess, {:.1}ms inference, {:.1}ms postprocess per frame of {}x{}",
        total.preprocess / n,
        total.inference / n,
        total.postprocess / n,
        height,
        width
      );
    }
    info!("预测完成，共 {} 帧", results.len());

    Ok(results)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Boxes, DetectBox, Detections};

  #[derive(Debug, thiserror::Error)]
  #[error("mock failure")]
  struct MockError;

  /// 第 n 帧给出 n 个检测框
  struct CountingDetector;

  impl Detector for CountingDetector {
    type Error = MockError;

    fn detect(&mut self, frame: &RgbFrame) -> Result<Detections, Self::Error> {
      let boxes = (0..frame.index)
        .map(|i| DetectBox {
          xyxy: [0.0, 0.0, 1.0 + i as f32, 1.0],
          conf: 0.5,
          cls: 0,
          name: "person".to_string(),
        })
        .collect::<Vec<_>>();
      Ok(Detections {
        boxes: Boxes::from(boxes),
        speed: Speed {
          preprocess: 1.0,
          inference: 2.0,
          postprocess: 3.0,
        },
      })
    }
  }

  struct FailingDetector;

  impl Detector for FailingDetector {
    type Error = MockError;

    fn detect(&mut self, _: &RgbFrame) -> Result<Detections, Self::Error> {
      Err(MockError)
    }
  }

  #[derive(Default)]
  struct Recorder {
    frames: Vec<u64>,
    finished: bool,
  }

  impl Render for &mut Recorder {
    type Error = MockError;

    fn render_result(&mut self, _: &RgbFrame, result: &DetectResult) -> Result<(), Self::Error> {
      self.frames.push(result.frame);
      Ok(())
    }

    fn finish(self) -> Result<(), Self::Error> {
      self.finished = true;
      Ok(())
    }
  }

  fn frames(n: u64) -> impl Iterator<Item = Result<RgbFrame, MockError>> {
    (0..n).map(|i| Ok(RgbFrame::from(image::RgbImage::new(4, 2)).with_position(i, i * 40)))
  }

  #[test]
  fn every_frame_becomes_a_result_in_order() {
    let mut recorder = Recorder::default();
    let task = PredictTask::new("input_video.mp4", SourceKind::Video);
    let results = task
      .run_task(frames(3), CountingDetector, &mut recorder)
      .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(
      results.iter().map(|r| r.boxes.len()).collect::<Vec<_>>(),
      [0, 1, 2]
    );
    assert_eq!(results[2].orig_shape, (2, 4));
    assert_eq!(results[1].path, "input_video.mp4");
    assert_eq!(recorder.frames, [0, 1, 2]);
    assert!(recorder.finished);
  }

  #[test]
  fn empty_input_gives_empty_results() {
    let task = PredictTask::new("empty.mp4", SourceKind::Video);
    let results = task
      .run_task(frames(0), CountingDetector, None::<&mut Recorder>)
      .unwrap();
    assert!(results.is_empty());
  }

  #[test]
  fn detector_failure_stops_the_loop() {
    let mut recorder = Recorder::default();
    let task = PredictTask::new("input_video.mp4", SourceKind::Video);
    let err = task
      .run_task(frames(2), FailingDetector, &mut recorder)
      .unwrap_err();

    assert_eq!(err.to_string(), "mock failure");
    assert!(recorder.frames.is_empty());
    assert!(!recorder.finished);
  }
}
