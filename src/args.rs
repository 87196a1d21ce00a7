// 该文件是 Kanjian （看见） 项目的一部分。
// src/args.rs - 命令行检测参数
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

use std::{path::PathBuf, time::Duration};

use clap::Args;

use crate::{
  config::{ConfigError, DetectConfig},
  model::{LabelError, LabelTable, ModelMetadata},
};

/// 各个程序共用的检测参数
#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.45", value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 两次推理之间的最小间隔（毫秒）
  #[arg(long, default_value = "33", value_name = "MILLIS")]
  pub min_interval_ms: u64,

  /// 标签文件，每行一个标签
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 模型类型提示，元数据缺少类型时使用（如 ssd、grocery、yolov8）
  #[arg(long, value_name = "TYPE")]
  pub model_type: Option<String>,

  /// 模型名称提示
  #[arg(long, value_name = "NAME")]
  pub model_name: Option<String>,
}

impl DetectArgs {
  pub fn config(&self) -> Result<DetectConfig, ConfigError> {
    DetectConfig::default()
      .with_confidence_threshold(self.confidence)
      .with_nms_iou_threshold(self.nms_threshold)
      .with_min_frame_interval(Duration::from_millis(self.min_interval_ms))
      .validate()
  }

  pub fn label_table(&self) -> Result<LabelTable, LabelError> {
    match &self.labels {
      Some(path) => LabelTable::load(path),
      None => Ok(LabelTable::default()),
    }
  }

  pub fn metadata_hint(&self) -> Option<ModelMetadata> {
    if self.model_type.is_none() && self.model_name.is_none() {
      return None;
    }
    Some(ModelMetadata {
      declared_type: self.model_type.clone().unwrap_or_default(),
      declared_name: self.model_name.clone().unwrap_or_default(),
      ..ModelMetadata::default()
    })
  }
}
