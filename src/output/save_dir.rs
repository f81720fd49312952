// 该文件是 Wangqiu （网球） 项目的一部分。
// src/output/save_dir.rs - 保存目录
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
  fs, io,
  path::{Path, PathBuf},
};

use tracing::debug;

const MAX_INCREMENT: u32 = 9999;

/// 找到第一个不存在的目录并创建它：`predict`、`predict2`、`predict3`……
pub fn increment_path(base: &Path) -> io::Result<PathBuf> {
  if let Some(parent) = base.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent)?;
  }

  if try_create(base)? {
    return Ok(base.to_path_buf());
  }

  for n in 2..=MAX_INCREMENT {
    let mut name = base.as_os_str().to_os_string();
    name.push(n.to_string());
    let candidate = PathBuf::from(name);
    if try_create(&candidate)? {
      return Ok(candidate);
    }
  }

  Err(io::Error::new(
    io::ErrorKind::AlreadyExists,
    format!("{} 的编号已用尽", base.display()),
  ))
}

fn try_create(path: &Path) -> io::Result<bool> {
  match fs::create_dir(path) {
    Ok(()) => {
      debug!("创建保存目录 {}", path.display());
      Ok(true)
    }
    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
    Err(e) => Err(e),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_run_uses_the_bare_name() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("runs/detect/predict");
    assert_eq!(increment_path(&base).unwrap(), base);
    assert!(base.is_dir());
  }

  #[test]
  fn later_runs_get_numbered() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("predict");
    increment_path(&base).unwrap();
    assert_eq!(increment_path(&base).unwrap(), dir.path().join("predict2"));
    assert_eq!(increment_path(&base).unwrap(), dir.path().join("predict3"));
  }
}
