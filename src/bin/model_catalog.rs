// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/model_catalog.rs - 模型目录查看
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use kanjian::{catalog::Catalog, model::classify};

/// 列出模型目录中的模型、下载状态与解码器
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型目录 JSON 文件
  #[arg(long, value_name = "FILE")]
  pub catalog: PathBuf,
  /// 模型文件所在目录
  #[arg(long, value_name = "DIR", default_value = ".")]
  pub models_dir: PathBuf,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let catalog = Catalog::load(&args.catalog)?;

  for model in catalog.iter() {
    let classification = classify(&model.metadata_hint());
    info!(
      "{} [{}] -> {:?} / {:?}, 文件 {} / {}, 已下载: {}",
      model.name,
      model.model_type,
      classification.family,
      classification.kind,
      model.file_name(),
      model.labels_file_name(),
      model.is_downloaded(&args.models_dir)
    );
  }

  Ok(())
}
