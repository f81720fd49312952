// 该文件是 Wangqiu （网球） 项目的一部分。
// src/output/label_record.rs - txt 标签记录
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

use std::{
  fs,
  path::{Path, PathBuf},
};

use crate::{input::SourceKind, model::DetectResult};

/// 每帧一个 txt 文件，每行 `cls cx cy w h [conf]`，坐标按帧尺寸归一化
pub struct LabelRecord {
  dir: PathBuf,
  stem: String,
  kind: SourceKind,
  with_conf: bool,
}

impl LabelRecord {
  pub fn new(dir: PathBuf, source: &Path, kind: SourceKind, with_conf: bool) -> Self {
    let stem = source
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "labels".to_string());

    Self {
      dir,
      stem,
      kind,
      with_conf,
    }
  }

  /// 图片为 `<stem>.txt`，视频为 `<stem>_<帧号>.txt`（帧号从 1 开始）
  pub fn path_for(&self, result: &DetectResult) -> PathBuf {
    match self.kind {
      SourceKind::Image => self.dir.join(format!("{}.txt", self.stem)),
      SourceKind::Video => self
        .dir
        .join(format!("{}_{}.txt", self.stem, result.frame + 1)),
    }
  }

  pub fn lines(&self, result: &DetectResult) -> Vec<String> {
    let (height, width) = result.orig_shape;
    result
      .boxes
      .iter()
      .map(|item| {
        let [cx, cy, w, h] = item.xywhn(width, height);
        let mut line = format!("{} {} {} {} {}", item.cls, cx, cy, w, h);
        if self.with_conf {
          line.push_str(&format!(" {}", item.conf));
        }
        line
      })
      .collect()
  }

  /// 没有检测框的帧不写文件
  pub fn record(&self, result: &DetectResult) -> Result<(), std::io::Error> {
    let lines = self.lines(result);
    if lines.is_empty() {
      return Ok(());
    }

    fs::create_dir_all(&self.dir)?;
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(self.path_for(result), content)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Boxes, DetectBox, Speed};

  fn result(frame: u64, boxes: Vec<DetectBox>) -> DetectResult {
    DetectResult {
      path: "input_video.mp4".to_string(),
      frame,
      orig_shape: (200, 400),
      boxes: Boxes::from(boxes),
      speed: Speed::default(),
    }
  }

  fn ball() -> DetectBox {
    DetectBox {
      xyxy: [100.0, 50.0, 300.0, 150.0],
      conf: 0.5,
      cls: 32,
      name: "sports ball".to_string(),
    }
  }

  #[test]
  fn lines_are_normalised() {
    let record = LabelRecord::new(
      PathBuf::from("labels"),
      Path::new("input_video.mp4"),
      SourceKind::Video,
      false,
    );
    assert_eq!(record.lines(&result(0, vec![ball()])), ["32 0.5 0.5 0.5 0.5"]);

    let with_conf = LabelRecord::new(
      PathBuf::from("labels"),
      Path::new("input_video.mp4"),
      SourceKind::Video,
      true,
    );
    assert_eq!(
      with_conf.lines(&result(0, vec![ball()])),
      ["32 0.5 0.5 0.5 0.5 0.5"]
    );
  }

  #[test]
  fn video_frames_get_numbered_files() {
    let dir = tempfile::tempdir().unwrap();
    let record = LabelRecord::new(
      dir.path().join("labels"),
      Path::new("videos/input_video.mp4"),
      SourceKind::Video,
      false,
    );

    record.record(&result(0, vec![ball()])).unwrap();
    record.record(&result(1, vec![])).unwrap();

    let written = dir.path().join("labels/input_video_1.txt");
    assert_eq!(
      fs::read_to_string(written).unwrap(),
      "32 0.5 0.5 0.5 0.5\n"
    );
    assert!(!dir.path().join("labels/input_video_2.txt").exists());
  }
}
