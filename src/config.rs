// 该文件是 Wangqiu （网球） 项目的一部分。
// src/config.rs - 推理配置
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

use url::Url;

pub const DEFAULT_CHECKPOINT: &str = "yolov8x";
pub const DEFAULT_SOURCE: &str =
  "/mnt/c/Users/SUNYLoaner/Downloads/tennis-analysis/input_videos/input_video.mp4";

/// 权重文件查找与下载配置
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
  /// 本地权重目录
  pub weights_dir: PathBuf,
  /// 提供 ONNX 导出文件的下载地址前缀，`None` 表示只查找本地
  pub download_url: Option<Url>,
}

impl Default for CheckpointConfig {
  fn default() -> Self {
    Self {
      weights_dir: PathBuf::from("weights"),
      download_url: None,
    }
  }
}

/// 检测后端配置
#[derive(Debug, Clone)]
pub struct PredictConfig {
  /// 置信度阈值
  pub conf: f32,
  /// NMS IoU 阈值
  pub iou: f32,
  /// 单帧最大检测数
  pub max_det: usize,
  /// 模型输入边长（模型元数据优先）
  pub imgsz: u32,
  /// ONNX Runtime 算子内线程数
  pub threads: usize,
  /// 保存根目录
  pub project: PathBuf,
  /// 保存子目录名，重名时自动追加序号
  pub name: String,
  /// 标签字体（TrueType）
  pub font: Option<PathBuf>,
  /// 同时保存 txt 标签
  pub save_txt: bool,
  /// txt 标签中附带置信度
  pub save_conf: bool,
  pub checkpoint: CheckpointConfig,
}

impl Default for PredictConfig {
  fn default() -> Self {
    Self {
      conf: 0.25,
      iou: 0.7,
      max_det: 300,
      imgsz: 640,
      threads: std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4),
      project: PathBuf::from("runs/detect"),
      name: "predict".to_string(),
      font: None,
      save_txt: false,
      save_conf: false,
      checkpoint: CheckpointConfig::default(),
    }
  }
}
