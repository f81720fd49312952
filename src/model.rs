// 该文件是 Wangqiu （网球） 项目的一部分。
// src/model.rs - 模型
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

use std::{collections::BTreeMap, fmt, ops::AddAssign, path::Path};

use serde_json::json;

use crate::frame::RgbFrame;

/// 按检查点名加载模型
pub trait ModelLoader {
  type Model: Model;
  type Error;

  fn load(&self, checkpoint: &str) -> Result<Self::Model, Self::Error>;
}

/// 已加载的模型，对整个输入源做预测
pub trait Model {
  type Error;

  fn predict(&mut self, source: &Path, save: bool) -> Result<Vec<DetectResult>, Self::Error>;
}

/// 单帧检测器
pub trait Detector {
  type Error;

  fn detect(&mut self, frame: &RgbFrame) -> Result<Detections, Self::Error>;
}

impl<D: Detector + ?Sized> Detector for &mut D {
  type Error = D::Error;

  fn detect(&mut self, frame: &RgbFrame) -> Result<Detections, Self::Error> {
    (**self).detect(frame)
  }
}

/// 单帧检测输出
#[derive(Debug, Clone, Default)]
pub struct Detections {
  pub boxes: Boxes,
  pub speed: Speed,
}

/// 各阶段耗时（毫秒）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Speed {
  pub preprocess: f64,
  pub inference: f64,
  pub postprocess: f64,
}

impl Speed {
  pub fn total(&self) -> f64 {
    self.preprocess + self.inference + self.postprocess
  }
}

impl AddAssign for Speed {
  fn add_assign(&mut self, rhs: Self) {
    self.preprocess += rhs.preprocess;
    self.inference += rhs.inference;
    self.postprocess += rhs.postprocess;
  }
}

/// 单个检测框，坐标为原始帧像素 [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone, PartialEq)]
pub struct DetectBox {
  pub xyxy: [f32; 4],
  pub conf: f32,
  pub cls: u32,
  pub name: String,
}

impl DetectBox {
  /// 中心点与宽高
  pub fn xywh(&self) -> [f32; 4] {
    let [x1, y1, x2, y2] = self.xyxy;
    [(x1 + x2) / 2.0, (y1 + y2) / 2.0, x2 - x1, y2 - y1]
  }

  /// 按帧尺寸归一化的中心点与宽高
  pub fn xywhn(&self, width: u32, height: u32) -> [f32; 4] {
    let [cx, cy, w, h] = self.xywh();
    let (fw, fh) = (width as f32, height as f32);
    [cx / fw, cy / fh, w / fw, h / fh]
  }

  pub fn area(&self) -> f32 {
    let [x1, y1, x2, y2] = self.xyxy;
    (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
  }

  pub fn iou(&self, other: &DetectBox) -> f32 {
    let x1 = self.xyxy[0].max(other.xyxy[0]);
    let y1 = self.xyxy[1].max(other.xyxy[1]);
    let x2 = self.xyxy[2].min(other.xyxy[2]);
    let y2 = self.xyxy[3].min(other.xyxy[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

impl fmt::Display for DetectBox {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let [x1, y1, x2, y2] = self.xyxy;
    write!(
      f,
      "cls: {} ({}) conf: {:.4} xyxy: [{:.1}, {:.1}, {:.1}, {:.1}]",
      self.cls, self.name, self.conf, x1, y1, x2, y2
    )
  }
}

/// 有序的检测框集合
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Boxes(Vec<DetectBox>);

impl Boxes {
  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectBox> {
    self.0.iter()
  }

  /// 按类别计数，例如 "2 person, 1 sports ball"
  pub fn summary(&self) -> String {
    if self.0.is_empty() {
      return "(no detections)".to_string();
    }

    let mut counts: BTreeMap<u32, (&str, usize)> = BTreeMap::new();
    for item in &self.0 {
      counts.entry(item.cls).or_insert((item.name.as_str(), 0)).1 += 1;
    }
    counts
      .values()
      .map(|(name, n)| format!("{} {}", n, name))
      .collect::<Vec<_>>()
      .join(", ")
  }
}

impl From<Vec<DetectBox>> for Boxes {
  fn from(items: Vec<DetectBox>) -> Self {
    Self(items)
  }
}

impl<'a> IntoIterator for &'a Boxes {
  type Item = &'a DetectBox;
  type IntoIter = std::slice::Iter<'a, DetectBox>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}

/// 单帧（或单张图片）的预测结果
#[derive(Debug, Clone)]
pub struct DetectResult {
  pub path: String,
  pub frame: u64,
  /// 原始帧尺寸 (height, width)
  pub orig_shape: (u32, u32),
  pub boxes: Boxes,
  pub speed: Speed,
}

impl DetectResult {
  pub fn to_json(&self) -> serde_json::Value {
    let (height, width) = self.orig_shape;
    let boxes = self
      .boxes
      .iter()
      .map(|item| {
        json!({
          "name": item.name,
          "class": item.cls,
          "confidence": item.conf,
          "box": {
            "x1": item.xyxy[0],
            "y1": item.xyxy[1],
            "x2": item.xyxy[2],
            "y2": item.xyxy[3],
          },
        })
      })
      .collect::<Vec<_>>();

    json!({
      "path": self.path,
      "frame": self.frame,
      "shape": [height, width],
      "boxes": boxes,
    })
  }
}

pub mod checkpoint;
mod coco;
mod yolo;
pub mod yolov8;

pub use self::coco::COCO_CLASSES;
pub use self::yolo::{Yolo, YoloLoader};
pub use self::yolov8::{ModelError, Yolov8};
