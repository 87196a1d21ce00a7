// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型、检测结果与推理引擎边界
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

use serde::{Deserialize, Serialize};

use crate::{
  frame::{InputTensor, TensorType},
  geometry::BBox,
  mapper::SourceSpace,
};

/// 推理引擎：输入一个预处理后的张量，按索引输出一个或多个张量。
pub trait InferenceEngine: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn metadata(&self) -> &ModelMetadata;
  fn run(&self, input: &InputTensor) -> Result<Box<[OutputTensor]>, Self::Error>;
}

/// 模型元数据，由模型加载方提供
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
  #[serde(default, rename = "type")]
  pub declared_type: String,
  #[serde(default, rename = "name")]
  pub declared_name: String,
  #[serde(default)]
  pub input_shape: Vec<usize>,
  /// 输入张量元素类型，缺省为 `uint8`
  #[serde(default)]
  pub input_dtype: TensorType,
  #[serde(default)]
  pub output_shapes: Vec<Vec<usize>>,
}

impl ModelMetadata {
  pub fn output_count(&self) -> usize {
    self.output_shapes.len()
  }

  pub fn output_shape(&self, index: usize) -> Option<&[usize]> {
    self.output_shapes.get(index).map(Vec::as_slice)
  }
}

/// 推理输出张量（浮点）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTensor {
  pub shape: Vec<usize>,
  pub data: Vec<f32>,
}

impl OutputTensor {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
    OutputTensor { shape, data }
  }
}

/// 单个检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_id: usize,
  pub label: String,
  pub confidence: f32,
  pub bbox: BBox, // [x_min, y_min, x_max, y_max]
}

/// 一帧的检测结果，以及这些坐标所在的空间
#[derive(Debug, Clone)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
  pub space: SourceSpace,
}

impl DetectResult {
  pub fn new(items: Vec<Detection>, space: SourceSpace) -> Self {
    DetectResult {
      items: items.into_boxed_slice(),
      space,
    }
  }

  pub fn empty(space: SourceSpace) -> Self {
    Self::new(Vec::new(), space)
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }
}

pub mod anchor;
pub mod classifier;
pub mod decoder;
pub mod fixed5;
pub mod fixed_slot;
pub mod labels;
pub mod layout;
pub mod nms;
mod recorded;

pub use self::classifier::{Classification, DecoderKind, ModelFamily, classify};
pub use self::decoder::{DecodeContext, decode};
pub use self::labels::{LabelError, LabelTable};
pub use self::layout::{AxisOrder, OutputLayout};
pub use self::nms::nms;
pub use self::recorded::{RecordedEngine, RecordedEngineError, Recording};
