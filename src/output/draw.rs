// 该文件是 Wangqiu （网球） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::{debug, warn};

use crate::model::{Boxes, DetectBox};

/// Ultralytics 调色板，按类别编号循环取色
const PALETTE: [u32; 20] = [
  0xFF3838, 0xFF9D97, 0xFF701F, 0xFFB21D, 0xCFD231, 0x48F90A, 0x92CC17, 0x3DDB86, 0x1A9334,
  0x00D4BB, 0x2C99A8, 0x00C2FF, 0x344593, 0x6473FF, 0x0018EC, 0x8438FF, 0x520085, 0xCB38FF,
  0xFF95C8, 0xFF37C7,
];

const SYSTEM_FONTS: [&str; 6] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const MIN_LINE_WIDTH: u32 = 2;
const MIN_FONT_SIZE: f32 = 12.0;

pub fn color(cls: u32) -> Rgb<u8> {
  let hex = PALETTE[cls as usize % PALETTE.len()];
  Rgb([(hex >> 16) as u8, (hex >> 8) as u8, hex as u8])
}

/// 线宽与字号随图像尺寸缩放
fn line_width(width: u32, height: u32) -> u32 {
  (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(MIN_LINE_WIDTH)
}

fn font_size(width: u32, height: u32) -> f32 {
  ((width + height) as f32 / 2.0 * 0.035)
    .round()
    .max(MIN_FONT_SIZE)
}

pub struct Draw {
  font: Option<FontVec>,
}

impl Draw {
  /// 优先使用指定字体，否则尝试常见系统字体；都没有时只画框
  pub fn new(font: Option<&Path>) -> Self {
    let font = match font {
      Some(path) => load_font(path),
      None => SYSTEM_FONTS
        .iter()
        .map(Path::new)
        .filter(|path| path.is_file())
        .find_map(load_font),
    };

    if font.is_none() {
      warn!("未找到可用字体，标注只绘制检测框");
    }

    Self { font }
  }

  /// 不带字体，只画框
  pub fn boxes_only() -> Self {
    Self { font: None }
  }

  pub fn draw_detections(&self, image: &mut RgbImage, boxes: &Boxes) {
    let lw = line_width(image.width(), image.height());
    let scale = PxScale::from(font_size(image.width(), image.height()));
    for item in boxes {
      self.draw_box(image, item, lw, scale);
    }
  }

  fn draw_box(&self, image: &mut RgbImage, item: &DetectBox, lw: u32, scale: PxScale) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let box_color = color(item.cls);

    let x_min = (item.xyxy[0].floor() as i32).clamp(0, w - 1);
    let y_min = (item.xyxy[1].floor() as i32).clamp(0, h - 1);
    let x_max = (item.xyxy[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (item.xyxy[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 由外向内画 lw 层
    for t in 0..lw as i32 {
      let width = x_max - x_min + 1 - 2 * t;
      let height = y_max - y_min + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, box_color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", item.name, item.conf);
    let (text_w, text_h) = text_size(scale, font, &label);
    let pad = lw as i32;
    let label_w = (text_w as i32 + 2 * pad).min(w - x_min);
    let label_h = text_h as i32 + 2 * pad;

    // 框上方放不下时放到框内
    let label_y = if y_min - label_h >= 0 {
      y_min - label_h
    } else {
      y_min
    };

    if label_w <= 0 {
      return;
    }
    debug!("绘制标签 '{}' 于 ({}, {})", label, x_min, label_y);

    let background = Rect::at(x_min, label_y).of_size(label_w as u32, label_h as u32);
    draw_filled_rect_mut(image, background, box_color);
    draw_text_mut(
      image,
      TEXT_COLOR,
      x_min + pad,
      label_y + pad,
      scale,
      font,
      &label,
    );
  }
}

fn load_font(path: &Path) -> Option<FontVec> {
  let bytes = match std::fs::read(path) {
    Ok(bytes) => bytes,
    Err(e) => {
      warn!("无法读取字体 {}: {}", path.display(), e);
      return None;
    }
  };

  match FontVec::try_from_vec(bytes) {
    Ok(font) => {
      debug!("使用字体 {}", path.display());
      Some(font)
    }
    Err(e) => {
      warn!("无法解析字体 {}: {}", path.display(), e);
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn racket() -> DetectBox {
    DetectBox {
      xyxy: [10.0, 20.0, 50.0, 60.0],
      conf: 0.9,
      cls: 38,
      name: "tennis racket".to_string(),
    }
  }

  #[test]
  fn palette_wraps_around() {
    assert_eq!(color(0), Rgb([0xFF, 0x38, 0x38]));
    assert_eq!(color(20), color(0));
    assert_eq!(color(38), Rgb([0xFF, 0x95, 0xC8]));
  }

  #[test]
  fn line_width_scales_with_image() {
    assert_eq!(line_width(640, 480), 2);
    assert_eq!(line_width(3840, 2160), 9);
    assert_eq!(font_size(100, 100), MIN_FONT_SIZE);
  }

  #[test]
  fn box_edges_use_the_class_color() {
    let mut image = RgbImage::new(100, 100);
    let draw = Draw::boxes_only();
    draw.draw_detections(&mut image, &Boxes::from(vec![racket()]));

    let expected = color(38);
    assert_eq!(*image.get_pixel(10, 40), expected);
    assert_eq!(*image.get_pixel(11, 40), expected);
    assert_eq!(*image.get_pixel(30, 60), expected);
    // 框内部保持原样
    assert_eq!(*image.get_pixel(30, 40), Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_boxes_are_skipped() {
    let mut image = RgbImage::new(20, 20);
    let mut item = racket();
    item.xyxy = [30.0, 30.0, 40.0, 40.0];
    Draw::boxes_only().draw_detections(&mut image, &Boxes::from(vec![item]));
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }
}
