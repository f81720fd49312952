// 该文件是 Wangqiu （网球） 项目的一部分。
// src/model/yolo.rs - 按检查点名加载并预测的 YOLO 模型
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

use tracing::info;

use crate::{
  config::PredictConfig,
  input::InputWrapper,
  model::{DetectResult, Model, ModelLoader, checkpoint, yolov8::ModelError, yolov8::Yolov8},
  output::PredictOutput,
  task::{PredictTask, Task},
};

/// 从检查点名构建 [`Yolo`]
#[derive(Debug, Clone, Default)]
pub struct YoloLoader {
  config: PredictConfig,
}

impl YoloLoader {
  pub fn new(config: PredictConfig) -> Self {
    Self { config }
  }
}

impl ModelLoader for YoloLoader {
  type Model = Yolo;
  type Error = ModelError;

  fn load(&self, checkpoint: &str) -> Result<Self::Model, Self::Error> {
    let path = checkpoint::resolve(checkpoint, &self.config.checkpoint)?;
    let detector = Yolov8::load(&path, &self.config)?;
    info!(
      "{} 已就绪: {} 个类别, 输入 {}x{}",
      checkpoint,
      detector.names().len(),
      detector.imgsz(),
      detector.imgsz()
    );
    Ok(Yolo {
      detector,
      config: self.config.clone(),
    })
  }
}

pub struct Yolo {
  detector: Yolov8,
  config: PredictConfig,
}

impl Model for Yolo {
  type Error = anyhow::Error;

  fn predict(&mut self, source: &Path, save: bool) -> Result<Vec<DetectResult>, Self::Error> {
    let input = InputWrapper::open(source)?;
    let kind = input.kind();

    let output = if save {
      Some(PredictOutput::create(
        source,
        kind,
        input.fps(),
        &self.config,
      )?)
    } else {
      None
    };

    let task = PredictTask::new(source.display().to_string(), kind);
    let results = task.run_task(input, &mut self.detector, output)?;
    info!("{} 共得到 {} 个结果", source.display(), results.len());

    Ok(results)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{config::CheckpointConfig, model::checkpoint::CheckpointError};

  #[test]
  fn unresolvable_checkpoint_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let loader = YoloLoader::new(PredictConfig {
      checkpoint: CheckpointConfig {
        weights_dir: dir.path().to_path_buf(),
        download_url: None,
      },
      ..PredictConfig::default()
    });

    match loader.load("wangqiu-no-such-model") {
      Err(ModelError::CheckpointError(CheckpointError::NotFound { name, .. })) => {
        assert_eq!(name, "wangqiu-no-such-model")
      }
      Err(other) => panic!("unexpected error: {other}"),
      Ok(_) => panic!("missing checkpoint loaded"),
    }
  }
}
