// 该文件是 Wangqiu （网球） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 ONNX 推理
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

use std::{path::Path, time::Instant};

use image::{Rgb, RgbImage, imageops};
use ndarray::Array4;
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::TensorRef,
};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  config::PredictConfig,
  frame::RgbFrame,
  model::{Boxes, DetectBox, Detections, Detector, Speed, coco::COCO_CLASSES},
};

const YOLOV8_BOX_ROWS: usize = 4;
const LETTERBOX_FILL: u8 = 114;

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("输出形状不符合 YOLOv8 检测头: {0:?}")]
  OutputShape(Vec<usize>),
  #[error("检查点错误: {0}")]
  CheckpointError(#[from] super::checkpoint::CheckpointError),
}

/// letterbox 变换参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub gain: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub size: u32,
}

impl Letterbox {
  pub fn new(width: u32, height: u32, size: u32) -> Self {
    let gain = (size as f32 / height as f32).min(size as f32 / width as f32);
    let new_w = (width as f32 * gain).round();
    let new_h = (height as f32 * gain).round();
    Self {
      gain,
      pad_x: ((size as f32 - new_w) / 2.0).floor(),
      pad_y: ((size as f32 - new_h) / 2.0).floor(),
      size,
    }
  }

  fn resized(&self, width: u32, height: u32) -> (u32, u32) {
    (
      ((width as f32 * self.gain).round() as u32).clamp(1, self.size),
      ((height as f32 * self.gain).round() as u32).clamp(1, self.size),
    )
  }

  /// 把 letterbox 空间的 xyxy 映射回原始帧并裁剪
  pub fn restore(&self, xyxy: [f32; 4], width: u32, height: u32) -> [f32; 4] {
    let (w, h) = (width as f32, height as f32);
    [
      ((xyxy[0] - self.pad_x) / self.gain).clamp(0.0, w),
      ((xyxy[1] - self.pad_y) / self.gain).clamp(0.0, h),
      ((xyxy[2] - self.pad_x) / self.gain).clamp(0.0, w),
      ((xyxy[3] - self.pad_y) / self.gain).clamp(0.0, h),
    ]
  }
}

/// 后处理参数
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
  pub conf: f32,
  pub iou: f32,
  pub max_det: usize,
}

impl From<&PredictConfig> for DecodeParams {
  fn from(config: &PredictConfig) -> Self {
    Self {
      conf: config.conf,
      iou: config.iou,
      max_det: config.max_det,
    }
  }
}

pub struct Yolov8 {
  session: Session,
  input_name: String,
  output_name: String,
  names: Vec<String>,
  imgsz: u32,
  params: DecodeParams,
}

impl Yolov8 {
  pub fn load(path: &Path, config: &PredictConfig) -> Result<Self, ModelError> {
    info!("加载模型文件: {}", path.display());
    if !path.is_file() {
      return Err(ModelError::ModelLoadError(format!(
        "模型文件不存在: {}",
        path.display()
      )));
    }

    let session = Session::builder()
      .map_err(|e| ModelError::ModelLoadError(format!("无法创建会话构建器: {e}")))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| ModelError::ModelLoadError(format!("无法设置优化级别: {e}")))?
      .with_intra_threads(config.threads)
      .map_err(|e| ModelError::ModelLoadError(format!("无法设置线程数: {e}")))?
      .commit_from_file(path)
      .map_err(|e| ModelError::ModelLoadError(format!("无法加载模型: {e}")))?;

    let input_name = session
      .inputs
      .first()
      .map(|i| i.name.clone())
      .unwrap_or_else(|| "images".to_string());
    let output_name = session
      .outputs
      .first()
      .map(|o| o.name.clone())
      .ok_or_else(|| ModelError::ModelLoadError("模型没有输出".to_string()))?;

    let (names, imgsz) = match session.metadata() {
      Ok(metadata) => {
        let names = metadata
          .custom("names")
          .ok()
          .flatten()
          .and_then(|raw| parse_names(&raw));
        let imgsz = metadata
          .custom("imgsz")
          .ok()
          .flatten()
          .and_then(|raw| parse_imgsz(&raw));
        (names, imgsz)
      }
      Err(e) => {
        error!("读取模型元数据失败: {}", e);
        (None, None)
      }
    };

    let names = names.unwrap_or_else(|| {
      debug!("模型元数据中没有类别名，使用 COCO 类别");
      COCO_CLASSES.iter().map(|s| s.to_string()).collect()
    });
    let imgsz = imgsz.unwrap_or(config.imgsz);

    info!(
      "模型加载完成: 输入 {} ({}x{}), 输出 {}, {} 个类别",
      input_name,
      imgsz,
      imgsz,
      output_name,
      names.len()
    );

    Ok(Self {
      session,
      input_name,
      output_name,
      names,
      imgsz,
      params: DecodeParams::from(config),
    })
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn imgsz(&self) -> u32 {
    self.imgsz
  }

  fn run_inference(&mut self, input: &Array4<f32>) -> Result<(Vec<f32>, Vec<usize>), ModelError> {
    let input_contiguous = input.as_standard_layout();
    let input_tensor = TensorRef::from_array_view(&input_contiguous)
      .map_err(|e| ModelError::InferenceError(format!("无法创建输入张量: {e}")))?;

    let outputs = self
      .session
      .run(ort::inputs![&self.input_name => input_tensor])
      .map_err(|e| ModelError::InferenceError(format!("推理失败: {e}")))?;

    let output = outputs
      .get(self.output_name.as_str())
      .ok_or_else(|| ModelError::InferenceError(format!("找不到输出 {}", self.output_name)))?;

    let (shape, data) = output
      .try_extract_tensor::<f32>()
      .map_err(|e| ModelError::InferenceError(format!("无法读取输出: {e}")))?;

    let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
    Ok((data.to_vec(), shape))
  }
}

impl Detector for Yolov8 {
  type Error = ModelError;

  fn detect(&mut self, frame: &RgbFrame) -> Result<Detections, Self::Error> {
    let start = Instant::now();
    let (tensor, letterbox) = preprocess(frame, self.imgsz);
    let preprocess_ms = start.elapsed().as_secs_f64() * 1000.0;

    let start = Instant::now();
    let (data, shape) = self.run_inference(&tensor)?;
    let inference_ms = start.elapsed().as_secs_f64() * 1000.0;

    let start = Instant::now();
    let boxes = decode(
      &data,
      &shape,
      &letterbox,
      (frame.width(), frame.height()),
      &self.names,
      &self.params,
    )?;
    let postprocess_ms = start.elapsed().as_secs_f64() * 1000.0;

    Ok(Detections {
      boxes,
      speed: Speed {
        preprocess: preprocess_ms,
        inference: inference_ms,
        postprocess: postprocess_ms,
      },
    })
  }
}

/// 缩放、居中填充并归一化为 NCHW 张量
pub fn preprocess(frame: &RgbFrame, size: u32) -> (Array4<f32>, Letterbox) {
  let letterbox = Letterbox::new(frame.width(), frame.height(), size);
  let (new_w, new_h) = letterbox.resized(frame.width(), frame.height());

  let resized = imageops::resize(
    &frame.to_rgb_image(),
    new_w,
    new_h,
    imageops::FilterType::Triangle,
  );

  let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
  imageops::overlay(
    &mut canvas,
    &resized,
    letterbox.pad_x as i64,
    letterbox.pad_y as i64,
  );

  let size = size as usize;
  let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
  for (x, y, pixel) in canvas.enumerate_pixels() {
    for c in 0..3 {
      tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
    }
  }

  (tensor, letterbox)
}

/// 解析 [1, 4 + nc, N] 输出为原始帧坐标的检测框
pub fn decode(
  data: &[f32],
  shape: &[usize],
  letterbox: &Letterbox,
  (width, height): (u32, u32),
  names: &[String],
  params: &DecodeParams,
) -> Result<Boxes, ModelError> {
  let (rows, anchors) = match shape {
    [1, rows, anchors] if *rows > YOLOV8_BOX_ROWS => (*rows, *anchors),
    _ => return Err(ModelError::OutputShape(shape.to_vec())),
  };
  if data.len() != rows * anchors {
    return Err(ModelError::OutputShape(shape.to_vec()));
  }

  let num_classes = rows - YOLOV8_BOX_ROWS;
  let mut candidates = Vec::new();

  for i in 0..anchors {
    let mut best_score = f32::MIN;
    let mut best_class = 0usize;
    for c in 0..num_classes {
      let score = data[(YOLOV8_BOX_ROWS + c) * anchors + i];
      if score > best_score {
        best_score = score;
        best_class = c;
      }
    }

    // 与阈值相等的 anchor 同样丢弃
    if !best_score.is_finite() || best_score <= params.conf {
      continue;
    }

    let cx = data[i];
    let cy = data[anchors + i];
    let w = data[2 * anchors + i];
    let h = data[3 * anchors + i];

    let xyxy = letterbox.restore(
      [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
      width,
      height,
    );

    candidates.push(DetectBox {
      xyxy,
      conf: best_score,
      cls: best_class as u32,
      name: names
        .get(best_class)
        .cloned()
        .unwrap_or_else(|| best_class.to_string()),
    });
  }

  debug!("置信度过滤后剩余 {} 个候选框", candidates.len());
  Ok(Boxes::from(nms(candidates, params.iou, params.max_det)))
}

/// 按类别的非极大值抑制
pub fn nms(mut detections: Vec<DetectBox>, iou_threshold: f32, max_det: usize) -> Vec<DetectBox> {
  // 按置信度降序排序
  detections.sort_by(|a, b| b.conf.total_cmp(&a.conf));

  let mut result: Vec<DetectBox> = Vec::new();
  for det in detections {
    if result.len() >= max_det {
      break;
    }
    let suppressed = result
      .iter()
      .any(|kept| kept.cls == det.cls && kept.iou(&det) > iou_threshold);
    if !suppressed {
      result.push(det);
    }
  }

  result
}

/// 解析 Ultralytics 元数据中的类别表，例如 `{0: 'person', 1: 'bicycle'}`
pub fn parse_names(raw: &str) -> Option<Vec<String>> {
  let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;

  let mut entries = Vec::new();
  let mut rest = body;
  while !rest.trim().is_empty() {
    let (key, tail) = rest.split_once(':')?;
    let id: usize = key.trim().trim_start_matches(',').trim().parse().ok()?;

    let tail = tail.trim_start();
    let quote = tail.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let tail = &tail[1..];
    let end = tail.find(quote)?;
    entries.push((id, tail[..end].to_string()));
    rest = &tail[end + 1..];
  }

  // 编号必须恰好是 0..n，不接受稀疏或重复的表
  entries.sort_by_key(|(id, _)| *id);
  if entries.is_empty() || entries.iter().enumerate().any(|(i, (id, _))| i != *id) {
    return None;
  }

  Some(entries.into_iter().map(|(_, name)| name).collect())
}

/// 解析 `[640, 640]` 形式的输入尺寸，只接受正方形
pub fn parse_imgsz(raw: &str) -> Option<u32> {
  let body = raw.trim().trim_start_matches('[').trim_end_matches(']');
  let dims: Vec<u32> = body
    .split(',')
    .map(|d| d.trim().parse().ok())
    .collect::<Option<_>>()?;
  match dims.as_slice() {
    [s] => Some(*s),
    [h, w] if h == w => Some(*h),
    _ => None,
  }
}
