// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续帧推理
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

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use kanjian::{
  FromUrl,
  args::DetectArgs,
  input::InputWrapper,
  model::RecordedEngine,
  output::OutputWrapper,
  pipeline::Pipeline,
  task::{ContinuousTask, Task},
};

/// Kanjian 连续帧推理
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型（录制的输出张量，如 tensor:///dump.json）
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源（如 image:///a.png?repeat=100）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，可重复（如 record:///out.txt）
  #[arg(long, value_name = "OUTPUT", required = true)]
  pub output: Vec<Url>,

  /// 最多读取的帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,

  /// 输入帧间隔（毫秒），模拟相机帧率
  #[arg(long, value_name = "MILLIS")]
  pub frame_interval_ms: Option<u64>,

  #[command(flatten)]
  pub detect: DetectArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  for output in &args.output {
    info!("输出路径: {}", output);
  }

  let pipeline = Arc::new(Pipeline::new(args.detect.config()?)?);
  let engine = RecordedEngine::from_url(&args.model)?;
  let hint = args.detect.metadata_hint();
  pipeline.install_model(engine, args.detect.label_table()?, hint.as_ref());

  let input = InputWrapper::from_url(&args.input)?;
  let outputs = args
    .output
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_frame_interval(args.frame_interval_ms.map(Duration::from_millis))
    .run_task(input, pipeline, outputs)?;

  Ok(())
}
