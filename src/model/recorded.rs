// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/recorded.rs - 回放录制输出的推理引擎
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::InputTensor,
  model::{InferenceEngine, ModelMetadata, OutputTensor},
};

#[derive(Error, Debug)]
pub enum RecordedEngineError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("录制文件格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch { expected: &'static str, found: String },
  #[error("录制文件不含任何输出")]
  NoOutputs,
}

/// 录制文件内容
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
  #[serde(default)]
  pub metadata: ModelMetadata,
  pub outputs: Vec<OutputTensor>,
}

/// 每次推理都返回同一组录制输出，用于在没有硬件引擎时跑通整条流水线。
#[derive(Debug, Clone)]
pub struct RecordedEngine {
  metadata: ModelMetadata,
  outputs: Box<[OutputTensor]>,
}

impl RecordedEngine {
  pub fn new(recording: Recording) -> Self {
    let Recording {
      mut metadata,
      outputs,
    } = recording;

    // 元数据缺少输出形状时由录制张量补齐
    if metadata.output_shapes.is_empty() {
      metadata.output_shapes = outputs.iter().map(|o| o.shape.clone()).collect();
    }

    RecordedEngine {
      metadata,
      outputs: outputs.into_boxed_slice(),
    }
  }

  pub fn from_json(text: &str) -> Result<Self, RecordedEngineError> {
    let recording: Recording = serde_json::from_str(text)?;
    if recording.outputs.is_empty() {
      return Err(RecordedEngineError::NoOutputs);
    }
    Ok(Self::new(recording))
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, RecordedEngineError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let engine = Self::from_json(&text)?;
    info!(
      "加载录制模型 {}: 类型 '{}', 名称 '{}', 输出 {} 个",
      path.display(),
      engine.metadata.declared_type,
      engine.metadata.declared_name,
      engine.outputs.len()
    );
    Ok(engine)
  }
}

impl FromUrlWithScheme for RecordedEngine {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for RecordedEngine {
  type Error = RecordedEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RecordedEngineError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }
    Self::load(url.path())
  }
}

impl InferenceEngine for RecordedEngine {
  type Error = RecordedEngineError;

  fn metadata(&self) -> &ModelMetadata {
    &self.metadata
  }

  fn run(&self, input: &InputTensor) -> Result<Box<[OutputTensor]>, Self::Error> {
    if !self.metadata.input_shape.is_empty() && input.shape() != self.metadata.input_shape.as_slice() {
      warn!(
        "输入张量形状 {:?} 与模型声明 {:?} 不一致",
        input.shape(),
        self.metadata.input_shape
      );
    }
    if input.dtype() != self.metadata.input_dtype {
      warn!(
        "输入张量类型 {:?} 与模型声明 {:?} 不一致",
        input.dtype(),
        self.metadata.input_dtype
      );
    }
    Ok(self.outputs.clone())
  }
}
