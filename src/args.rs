// 该文件是 Wangqiu （网球） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::{ArgAction, Parser};
use url::Url;

use wangqiu::{
  config::{CheckpointConfig, DEFAULT_CHECKPOINT, DEFAULT_SOURCE, PredictConfig},
  driver::PredictRequest,
};

/// Wangqiu 参数配置，不带参数运行即对默认视频做一次 yolov8x 预测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检查点名（`yolov8x`）或 ONNX 权重路径
  #[arg(long, default_value = DEFAULT_CHECKPOINT, value_name = "CHECKPOINT")]
  pub model: String,

  /// 输入来源（视频文件或图片文件）
  #[arg(long, default_value = DEFAULT_SOURCE, value_name = "SOURCE")]
  pub source: PathBuf,

  /// 保存标注后的结果
  #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
  pub save: bool,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.25, value_name = "THRESHOLD")]
  pub conf: f32,

  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.7, value_name = "THRESHOLD")]
  pub iou: f32,

  /// 单帧最大检测数
  #[arg(long, default_value_t = 300, value_name = "COUNT")]
  pub max_det: usize,

  /// 模型输入边长，模型元数据带有 imgsz 时以元数据为准
  #[arg(long, default_value_t = 640, value_name = "PIXELS")]
  pub imgsz: u32,

  /// 保存根目录
  #[arg(long, default_value = "runs/detect", value_name = "DIR")]
  pub project: PathBuf,

  /// 保存子目录名，已存在时追加序号
  #[arg(long, default_value = "predict", value_name = "NAME")]
  pub name: String,

  /// 权重目录
  #[arg(long, default_value = "weights", value_name = "DIR")]
  pub weights_dir: PathBuf,

  /// 缺失权重时的下载地址前缀，须提供 `<name>.onnx`；不指定则只查找本地
  #[arg(long, value_name = "URL")]
  pub download_url: Option<Url>,

  /// 标签字体（TrueType）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 同时保存 txt 标签
  #[arg(long)]
  pub save_txt: bool,

  /// txt 标签中附带置信度
  #[arg(long)]
  pub save_conf: bool,

  /// ONNX Runtime 线程数，默认使用全部核心
  #[arg(long, value_name = "COUNT")]
  pub threads: Option<usize>,
}

impl Args {
  pub fn request(&self) -> PredictRequest {
    PredictRequest {
      checkpoint: self.model.clone(),
      source: self.source.clone(),
      save: self.save,
    }
  }
}

impl From<&Args> for PredictConfig {
  fn from(args: &Args) -> Self {
    let defaults = PredictConfig::default();
    PredictConfig {
      conf: args.conf,
      iou: args.iou,
      max_det: args.max_det,
      imgsz: args.imgsz,
      threads: args.threads.unwrap_or(defaults.threads),
      project: args.project.clone(),
      name: args.name.clone(),
      font: args.font.clone(),
      save_txt: args.save_txt,
      save_conf: args.save_conf,
      checkpoint: CheckpointConfig {
        weights_dir: args.weights_dir.clone(),
        download_url: args.download_url.clone(),
      },
    }
  }
}
