// 该文件是 Wangqiu （网球） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use wangqiu::{config::PredictConfig, driver, model::YoloLoader};

fn main() -> Result<()> {
  // 日志写到 stderr，stdout 只留给预测结果
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .init();

  let args = args::Args::parse();

  info!("检查点: {}", args.model);
  info!("输入来源: {}", args.source.display());
  info!("保存结果: {}", args.save);

  let loader = YoloLoader::new(PredictConfig::from(&args));
  let request = args.request();

  let stdout = std::io::stdout();
  driver::run(&loader, &request, &mut stdout.lock())
}
