// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - 帧、模型输入规格与预处理
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

use image::{RgbImage, imageops::FilterType};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::ModelMetadata;

const RGB_CHANNELS: usize = 3;
const FALLBACK_INPUT_SIZE: usize = 300;

/// 输入张量内存布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
  Nhwc,
  Nchw,
}

/// 输入张量元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorType {
  /// 量化模型，原始像素值
  #[default]
  UInt8,
  /// 浮点模型，像素值归一化到 [0, 1]
  Float32,
}

/// 模型输入规格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSpec {
  pub width: usize,
  pub height: usize,
  pub channels: usize,
  pub layout: TensorLayout,
  pub dtype: TensorType,
}

impl Default for InputSpec {
  fn default() -> Self {
    InputSpec {
      width: FALLBACK_INPUT_SIZE,
      height: FALLBACK_INPUT_SIZE,
      channels: RGB_CHANNELS,
      layout: TensorLayout::Nhwc,
      dtype: TensorType::UInt8,
    }
  }
}

impl InputSpec {
  /// 从模型输入形状推断规格。
  ///
  /// 末维为 1 或 3 视为 NHWC，第 1 维为 1 或 3 视为 NCHW，其余情况按 NHWC 处理。
  /// 非 4 维或含 0 的形状回退到 300x300。
  pub fn from_shape(shape: &[usize]) -> Self {
    let &[_, d1, d2, d3] = shape else {
      warn!("无法解析输入形状 {:?}，使用默认 {}x{}", shape, FALLBACK_INPUT_SIZE, FALLBACK_INPUT_SIZE);
      return Self::default();
    };
    if d1 == 0 || d2 == 0 || d3 == 0 {
      warn!("输入形状 {:?} 含 0 维，使用默认 {}x{}", shape, FALLBACK_INPUT_SIZE, FALLBACK_INPUT_SIZE);
      return Self::default();
    }

    let (height, width, channels, layout) = if d3 == 1 || d3 == 3 {
      (d1, d2, d3, TensorLayout::Nhwc)
    } else if d1 == 1 || d1 == 3 {
      (d2, d3, d1, TensorLayout::Nchw)
    } else {
      warn!("无法判断输入形状 {:?} 的布局，按 NHWC 处理", shape);
      (d1, d2, d3, TensorLayout::Nhwc)
    };

    InputSpec {
      width,
      height,
      channels,
      layout,
      dtype: TensorType::UInt8,
    }
  }

  /// 按模型元数据的输入形状与元素类型确定规格
  pub fn from_metadata(metadata: &ModelMetadata) -> Self {
    Self::from_shape(&metadata.input_shape).with_dtype(metadata.input_dtype)
  }

  pub fn with_dtype(mut self, dtype: TensorType) -> Self {
    self.dtype = dtype;
    self
  }

  /// 正方形输入边长（取高度）
  pub fn square_size(&self) -> usize {
    self.height
  }

  pub fn is_square(&self) -> bool {
    self.width == self.height
  }

  pub fn shape(&self) -> Vec<usize> {
    match self.layout {
      TensorLayout::Nhwc => vec![1, self.height, self.width, self.channels],
      TensorLayout::Nchw => vec![1, self.channels, self.height, self.width],
    }
  }

  pub fn element_count(&self) -> usize {
    self.width * self.height * self.channels
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
  UInt8(Box<[u8]>),
  Float32(Box<[f32]>),
}

/// 预处理后交给推理引擎的输入张量
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
  shape: Vec<usize>,
  data: TensorData,
}

impl InputTensor {
  pub fn new(shape: Vec<usize>, data: TensorData) -> Self {
    InputTensor { shape, data }
  }

  pub fn zeros_u8(shape: Vec<usize>) -> Self {
    let len = shape.iter().product();
    InputTensor {
      shape,
      data: TensorData::UInt8(vec![0u8; len].into_boxed_slice()),
    }
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &TensorData {
    &self.data
  }

  pub fn dtype(&self) -> TensorType {
    match self.data {
      TensorData::UInt8(_) => TensorType::UInt8,
      TensorData::Float32(_) => TensorType::Float32,
    }
  }

  pub fn len(&self) -> usize {
    match &self.data {
      TensorData::UInt8(d) => d.len(),
      TensorData::Float32(d) => d.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// 一帧原始图像
#[derive(Debug, Clone)]
pub struct Frame {
  pub index: usize,
  pub image: RgbImage,
}

impl Frame {
  pub fn new(index: usize, image: RgbImage) -> Self {
    Frame { index, image }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 图像尺寸（宽，高）
  pub fn size(&self) -> (f32, f32) {
    (self.image.width() as f32, self.image.height() as f32)
  }
}

/// 双线性缩放到模型输入尺寸，并按规格排布
pub fn preprocess(image: &RgbImage, spec: &InputSpec) -> InputTensor {
  let resized = if image.dimensions() == (spec.width as u32, spec.height as u32) {
    image.clone()
  } else {
    image::imageops::resize(image, spec.width as u32, spec.height as u32, FilterType::Triangle)
  };

  let pixels = match spec.layout {
    TensorLayout::Nhwc => collect_nhwc(&resized, spec),
    TensorLayout::Nchw => collect_nchw(&resized, spec),
  };

  let data = match spec.dtype {
    TensorType::UInt8 => TensorData::UInt8(pixels.into_boxed_slice()),
    TensorType::Float32 => TensorData::Float32(pixels.into_iter().map(|v| v as f32 / 255.0).collect()),
  };

  InputTensor::new(spec.shape(), data)
}

// 单通道模型取 RGB 平均值作为灰度
fn channel_value(pixel: &image::Rgb<u8>, channel: usize, channels: usize) -> u8 {
  if channels == 1 {
    let [r, g, b] = pixel.0;
    ((r as u16 + g as u16 + b as u16) / 3) as u8
  } else {
    pixel.0[channel.min(RGB_CHANNELS - 1)]
  }
}

fn collect_nhwc(image: &RgbImage, spec: &InputSpec) -> Vec<u8> {
  let channels = spec.channels;
  let mut out = Vec::with_capacity(spec.element_count());
  for pixel in image.pixels() {
    for c in 0..channels {
      out.push(channel_value(pixel, c, channels));
    }
  }
  out
}

// 图像已缩放到规格尺寸
fn collect_nchw(image: &RgbImage, spec: &InputSpec) -> Vec<u8> {
  let channels = spec.channels;
  let plane = spec.width * spec.height;
  let mut out = vec![0u8; spec.element_count()];
  for (x, y, pixel) in image.enumerate_pixels() {
    let offset = y as usize * spec.width + x as usize;
    for c in 0..channels {
      out[c * plane + offset] = channel_value(pixel, c, channels);
    }
  }
  out
}
