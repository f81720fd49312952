// 该文件是 Wangqiu （网球） 项目的一部分。
// src/driver.rs - 加载、预测、打印
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

//! 主流程：按检查点名加载模型，对输入源预测，打印结果集与第一个结果的检测框。
//!
//! 输出格式固定为三段：
//!
//! ```text
//! <结果集的 {:?} 输出>
//! boxes:
//! <results[0] 的每个检测框，一行一个>
//! ```

use std::{io::Write, path::PathBuf};

use thiserror::Error;
use tracing::info;

use crate::{
  config::{DEFAULT_CHECKPOINT, DEFAULT_SOURCE},
  model::{DetectResult, Model, ModelLoader},
};

/// 一次预测请求
#[derive(Debug, Clone, PartialEq)]
pub struct PredictRequest {
  pub checkpoint: String,
  pub source: PathBuf,
  pub save: bool,
}

impl Default for PredictRequest {
  fn default() -> Self {
    Self {
      checkpoint: DEFAULT_CHECKPOINT.to_string(),
      source: PathBuf::from(DEFAULT_SOURCE),
      save: true,
    }
  }
}

#[derive(Error, Debug)]
pub enum ReportError {
  /// 结果集为空，没有第一个结果可以取检测框
  #[error("结果集为空，无法读取第一个结果的检测框")]
  EmptyResultSet,
  #[error("输出错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 打印结果集、`boxes:` 行，以及第一个结果的每个检测框
pub fn report<W: Write>(out: &mut W, results: &[DetectResult]) -> Result<(), ReportError> {
  writeln!(out, "{:?}", results)?;
  writeln!(out, "boxes:")?;

  let first = results.first().ok_or(ReportError::EmptyResultSet)?;
  for item in &first.boxes {
    writeln!(out, "{}", item)?;
  }
  out.flush()?;

  Ok(())
}

/// 加载 → 预测 → 打印。任何一步失败都直接返回，加载失败时不输出任何内容
pub fn run<L, W>(loader: &L, request: &PredictRequest, out: &mut W) -> anyhow::Result<()>
where
  L: ModelLoader,
  L::Error: Into<anyhow::Error>,
  <L::Model as Model>::Error: Into<anyhow::Error>,
  W: Write,
{
  info!("加载模型 {}", request.checkpoint);
  let mut model = loader.load(&request.checkpoint).map_err(Into::<anyhow::Error>::into)?;

  info!(
    "预测 {} (save={})",
    request.source.display(),
    request.save
  );
  let results = model
    .predict(&request.source, request.save)
    .map_err(Into::<anyhow::Error>::into)?;

  report(out, &results)?;
  Ok(())
}
