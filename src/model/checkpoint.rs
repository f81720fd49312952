// 该文件是 Wangqiu （网球） 项目的一部分。
// src/model/checkpoint.rs - 检查点解析与下载
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

//! 检查点名到 ONNX 权重文件的解析。
//!
//! `yolov8x` 依次查找 `./yolov8x.onnx` 与 `<weights_dir>/yolov8x.onnx`，
//! 都不存在且配置了下载地址时，从 `<download_url>/yolov8x.onnx` 拉取到权重目录。
//! Ultralytics 官方只发布 `.pt` 权重，默认不下载，找不到时提示先导出 ONNX。

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::CheckpointConfig;

const ONNX_EXTENSION: &str = "onnx";
#[cfg(feature = "download")]
const MIN_CHECKPOINT_SIZE: u64 = 1024;

#[derive(Error, Debug)]
pub enum CheckpointError {
  #[error("无效的检查点名: {0:?}")]
  InvalidName(String),
  #[error("不支持的权重格式 '.{extension}'，请先导出为 ONNX: {name}")]
  UnsupportedFormat { name: String, extension: String },
  #[error("找不到检查点 {name}，已查找: {searched:?}；请先导出 ONNX 并放入权重目录: {hint}")]
  NotFound {
    name: String,
    searched: Vec<PathBuf>,
    hint: String,
  },
  #[error("下载检查点失败 {url}: {reason}；该地址需提供 ONNX 导出文件，或在本地执行: {hint}")]
  Download {
    url: String,
    reason: String,
    hint: String,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 检查点名对应的权重文件名
pub fn checkpoint_file_name(name: &str) -> Result<String, CheckpointError> {
  if name.trim().is_empty() || name.contains("..") {
    return Err(CheckpointError::InvalidName(name.to_string()));
  }

  match Path::new(name).extension().and_then(|ext| ext.to_str()) {
    None => Ok(format!("{}.{}", name, ONNX_EXTENSION)),
    Some(ext) if ext.eq_ignore_ascii_case(ONNX_EXTENSION) => Ok(name.to_string()),
    Some(ext) => Err(CheckpointError::UnsupportedFormat {
      name: name.to_string(),
      extension: ext.to_string(),
    }),
  }
}

/// 生成 ONNX 导出命令，例如 `yolo export model=yolov8x.pt format=onnx`
pub fn export_hint(file_name: &str) -> String {
  let stem = Path::new(file_name)
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| file_name.to_string());
  format!("yolo export model={}.pt format=onnx", stem)
}

/// 解析检查点名，必要时下载
pub fn resolve(name: &str, config: &CheckpointConfig) -> Result<PathBuf, CheckpointError> {
  let file_name = checkpoint_file_name(name)?;

  let candidates = [
    PathBuf::from(&file_name),
    config.weights_dir.join(
      Path::new(&file_name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&file_name)),
    ),
  ];

  for candidate in &candidates {
    debug!("查找检查点: {}", candidate.display());
    if candidate.is_file() {
      info!("使用检查点: {}", candidate.display());
      return Ok(candidate.clone());
    }
  }

  #[cfg(feature = "download")]
  {
    // 只有裸名字才去下载，显式路径不猜测来源
    if let Some(base) = &config.download_url
      && !file_name.contains(['/', '\\'])
    {
      let target = &candidates[1];
      download(base, &file_name, target)?;
      return Ok(target.clone());
    }
  }

  Err(CheckpointError::NotFound {
    name: name.to_string(),
    searched: candidates.to_vec(),
    hint: export_hint(&file_name),
  })
}

#[cfg(feature = "download")]
fn download(base: &url::Url, file_name: &str, target: &Path) -> Result<(), CheckpointError> {
  let url = base
    .join(file_name)
    .map_err(|e| CheckpointError::Download {
      url: base.to_string(),
      reason: e.to_string(),
      hint: export_hint(file_name),
    })?;

  info!("下载检查点 {} -> {}", url, target.display());

  let response = ureq::get(url.as_str())
    .call()
    .map_err(|e| CheckpointError::Download {
      url: url.to_string(),
      reason: e.to_string(),
      hint: export_hint(file_name),
    })?;

  store(response.into_reader(), url.as_str(), target)?;
  Ok(())
}

/// 先写 `.onnx.part`，校验大小后再改名为目标文件；失败时删除临时文件
#[cfg(feature = "download")]
fn store<R: std::io::Read>(
  mut reader: R,
  url: &str,
  target: &Path,
) -> Result<u64, CheckpointError> {
  use std::fs;

  if let Some(parent) = target.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent)?;
  }

  let partial = target.with_extension("onnx.part");
  let written = {
    let mut file = fs::File::create(&partial)?;
    std::io::copy(&mut reader, &mut file)
  };

  let written = match written {
    Ok(n) => n,
    Err(e) => {
      let _ = fs::remove_file(&partial);
      return Err(e.into());
    }
  };

  if written < MIN_CHECKPOINT_SIZE {
    let _ = fs::remove_file(&partial);
    let file_name = target
      .file_name()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();
    return Err(CheckpointError::Download {
      url: url.to_string(),
      reason: format!("文件过小 ({} 字节)，可能已损坏", written),
      hint: export_hint(&file_name),
    });
  }

  fs::rename(&partial, target)?;
  info!(
    "检查点已保存: {} ({:.2} MB)",
    target.display(),
    written as f64 / (1024.0 * 1024.0)
  );

  Ok(written)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn local_only(dir: &Path) -> CheckpointConfig {
    CheckpointConfig {
      weights_dir: dir.to_path_buf(),
      download_url: None,
    }
  }

  #[test]
  fn bare_name_gets_onnx_extension() {
    assert_eq!(checkpoint_file_name("yolov8x").unwrap(), "yolov8x.onnx");
    assert_eq!(
      checkpoint_file_name("models/yolov8x.ONNX").unwrap(),
      "models/yolov8x.ONNX"
    );
  }

  #[test]
  fn pytorch_weights_are_rejected() {
    let err = checkpoint_file_name("yolov8x.pt").unwrap_err();
    assert!(matches!(
      err,
      CheckpointError::UnsupportedFormat { ref extension, .. } if extension == "pt"
    ));
  }

  #[test]
  fn traversal_and_empty_names_are_rejected() {
    assert!(matches!(
      checkpoint_file_name("../yolov8x"),
      Err(CheckpointError::InvalidName(_))
    ));
    assert!(matches!(
      checkpoint_file_name("  "),
      Err(CheckpointError::InvalidName(_))
    ));
  }

  #[test]
  fn finds_checkpoint_in_weights_dir() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("wangqiu-test-yolov8x.onnx");
    std::fs::write(&weights, b"onnx").unwrap();

    let path = resolve("wangqiu-test-yolov8x", &local_only(dir.path())).unwrap();
    assert_eq!(path, weights);
  }

  #[test]
  fn missing_checkpoint_lists_searched_paths() {
    let dir = tempfile::tempdir().unwrap();
    let err = resolve("wangqiu-missing", &local_only(dir.path())).unwrap_err();
    match err {
      CheckpointError::NotFound {
        name,
        searched,
        hint,
      } => {
        assert_eq!(name, "wangqiu-missing");
        assert_eq!(searched.len(), 2);
        assert_eq!(searched[1], dir.path().join("wangqiu-missing.onnx"));
        assert_eq!(hint, "yolo export model=wangqiu-missing.pt format=onnx");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn default_config_never_downloads() {
    assert!(CheckpointConfig::default().download_url.is_none());

    let dir = tempfile::tempdir().unwrap();
    let config = CheckpointConfig {
      weights_dir: dir.path().to_path_buf(),
      ..CheckpointConfig::default()
    };
    let err = resolve("wangqiu-yolov8x", &config).unwrap_err();
    assert!(matches!(err, CheckpointError::NotFound { .. }));
    assert!(
      err
        .to_string()
        .contains("yolo export model=wangqiu-yolov8x.pt format=onnx")
    );
    assert!(!dir.path().join("wangqiu-yolov8x.onnx").exists());
  }

  #[test]
  fn export_hint_strips_onnx_extension() {
    assert_eq!(
      export_hint("yolov8x.onnx"),
      "yolo export model=yolov8x.pt format=onnx"
    );
  }

  #[cfg(feature = "download")]
  mod partial_file {
    use std::io::{self, Cursor, Read};

    use super::super::*;

    const URL: &str = "http://127.0.0.1/yolov8x.onnx";

    /// 先给出一部分数据，然后报错
    struct BrokenReader {
      sent: bool,
    }

    impl Read for BrokenReader {
      fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.sent {
          return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        }
        self.sent = true;
        let n = buf.len().min(512);
        buf[..n].fill(7);
        Ok(n)
      }
    }

    #[test]
    fn tiny_body_is_rejected_and_cleaned_up() {
      let dir = tempfile::tempdir().unwrap();
      let target = dir.path().join("weights/yolov8x.onnx");

      let err = store(Cursor::new(vec![0u8; 10]), URL, &target).unwrap_err();
      assert!(matches!(err, CheckpointError::Download { ref url, .. } if url == URL));
      assert!(!target.exists());
      assert!(!dir.path().join("weights/yolov8x.onnx.part").exists());
    }

    #[test]
    fn full_body_is_renamed_into_place() {
      let dir = tempfile::tempdir().unwrap();
      let target = dir.path().join("weights/yolov8x.onnx");

      let written = store(Cursor::new(vec![1u8; 2048]), URL, &target).unwrap();
      assert_eq!(written, 2048);
      assert_eq!(std::fs::read(&target).unwrap().len(), 2048);
      assert!(!dir.path().join("weights/yolov8x.onnx.part").exists());
    }

    #[test]
    fn interrupted_body_leaves_no_partial_file() {
      let dir = tempfile::tempdir().unwrap();
      let target = dir.path().join("yolov8x.onnx");

      let err = store(BrokenReader { sent: false }, URL, &target).unwrap_err();
      assert!(matches!(err, CheckpointError::IoError(_)));
      assert!(!target.exists());
      assert!(!dir.path().join("yolov8x.onnx.part").exists());
    }
  }
}
