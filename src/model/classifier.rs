// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/classifier.rs - 推理类型判定
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

use tracing::{debug, warn};

use crate::model::{ModelMetadata, OutputLayout, fixed5::SPECIALIZED_ANCHOR_GRIDS, layout::MIN_FEATURES};

/// 姿态模型特征数: 4 框 + 1 置信度 + 17x3 关键点
const POSE_FEATURES: usize = 56;
/// 第二个输出的通道数须大于该值才视为分割掩码
const SEGMENTATION_MASK_CHANNELS_OVER: usize = 10;

/// 解码器种类，模型加载时解析一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderKind {
  /// 单张量锚点解码（YOLO）
  AnchorBased,
  /// 单张量单类别锚点解码，只读前 5 个特征（姿态）
  SingleClassAnchor,
  /// 四张量定槽解码（SSD）
  FixedSlot,
  /// 固定 5 特征锚点网格
  SpecializedFixed5,
}

/// 模型系列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
  LicensePlate,
  Pose,
  Segmentation,
  BlinkDrowse,
  Dent,
  Face,
  FireSmoke,
  Grocery,
  Helmet,
  Yolo,
  Ssd,
}

impl ModelFamily {
  pub fn decoder_kind(self) -> DecoderKind {
    match self {
      ModelFamily::LicensePlate | ModelFamily::Grocery => DecoderKind::SpecializedFixed5,
      ModelFamily::Ssd => DecoderKind::FixedSlot,
      ModelFamily::Pose => DecoderKind::SingleClassAnchor,
      _ => DecoderKind::AnchorBased,
    }
  }
}

/// 判定来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evidence {
  DeclaredType,
  DeclaredName,
  OutputShape,
  Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
  pub family: ModelFamily,
  pub kind: DecoderKind,
  pub evidence: Evidence,
}

impl Classification {
  fn new(family: ModelFamily, evidence: Evidence) -> Self {
    Classification {
      family,
      kind: family.decoder_kind(),
      evidence,
    }
  }
}

const TYPE_KEYWORDS: &[(&[&str], ModelFamily)] = &[
  (&["license", "lpd"], ModelFamily::LicensePlate),
  (&["pose"], ModelFamily::Pose),
  (&["segmentation"], ModelFamily::Segmentation),
  (&["blink", "drowse"], ModelFamily::BlinkDrowse),
  (&["dent", "vehicle_damage"], ModelFamily::Dent),
  (&["face"], ModelFamily::Face),
  (&["fire", "smoke"], ModelFamily::FireSmoke),
  (&["grocery"], ModelFamily::Grocery),
  (&["helmet", "safety"], ModelFamily::Helmet),
];

// 类型字段对通用系列要求精确匹配
const TYPE_EXACT: &[(&[&str], ModelFamily)] = &[
  (&["yolox", "yolo", "yolov5", "yolov8", "yolov11"], ModelFamily::Yolo),
  (&["ssd", "ssd_mobilenet"], ModelFamily::Ssd),
];

const NAME_KEYWORDS: &[(&[&str], ModelFamily)] = &[
  (&["license", "plate", "lpd"], ModelFamily::LicensePlate),
  (&["pose", "keypoint"], ModelFamily::Pose),
  (&["segment", "mask"], ModelFamily::Segmentation),
  (&["blink", "drowse"], ModelFamily::BlinkDrowse),
  (&["dent"], ModelFamily::Dent),
  (&["face"], ModelFamily::Face),
  (&["fire", "smoke"], ModelFamily::FireSmoke),
  (&["grocery"], ModelFamily::Grocery),
  (&["helmet"], ModelFamily::Helmet),
  (&["yolo"], ModelFamily::Yolo),
  (&["ssd", "mobilenet"], ModelFamily::Ssd),
];

fn match_contains(text: &str, table: &[(&[&str], ModelFamily)]) -> Option<ModelFamily> {
  table
    .iter()
    .find(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
    .map(|&(_, family)| family)
}

fn match_exact(text: &str, table: &[(&[&str], ModelFamily)]) -> Option<ModelFamily> {
  table
    .iter()
    .find(|(keywords, _)| keywords.contains(&text))
    .map(|&(_, family)| family)
}

/// 仅根据输出张量结构判定
pub fn classify_by_outputs(metadata: &ModelMetadata) -> Option<ModelFamily> {
  let count = metadata.output_count();
  match count {
    4 => Some(ModelFamily::Ssd),
    2 => {
      let is_mask = metadata
        .output_shape(1)
        .is_some_and(|s| s.len() == 4 && s[3] > SEGMENTATION_MASK_CHANNELS_OVER);
      Some(if is_mask {
        ModelFamily::Segmentation
      } else {
        ModelFamily::Yolo
      })
    }
    1 => {
      let shape = metadata.output_shape(0)?;
      if shape.len() != 3 {
        return None;
      }
      let layout = OutputLayout::resolve(shape)?;
      if layout.features == MIN_FEATURES && SPECIALIZED_ANCHOR_GRIDS.contains(&layout.anchors) {
        Some(ModelFamily::LicensePlate)
      } else if layout.features == POSE_FEATURES {
        Some(ModelFamily::Pose)
      } else {
        Some(ModelFamily::Yolo)
      }
    }
    _ => None,
  }
}

/// 选择解码器：类型字段 → 模型名称 → 输出结构 → 默认锚点解码。从不失败。
pub fn classify(metadata: &ModelMetadata) -> Classification {
  let declared_type = metadata.declared_type.trim().to_lowercase();
  let declared_name = metadata.declared_name.trim().to_lowercase();

  if !declared_type.is_empty()
    && let Some(family) = match_contains(&declared_type, TYPE_KEYWORDS)
      .or_else(|| match_exact(&declared_type, TYPE_EXACT))
  {
    debug!("按类型 '{}' 判定为 {:?}", declared_type, family);
    return Classification::new(family, Evidence::DeclaredType);
  }

  if !declared_name.is_empty()
    && let Some(family) = match_contains(&declared_name, NAME_KEYWORDS)
  {
    debug!("按名称 '{}' 判定为 {:?}", declared_name, family);
    return Classification::new(family, Evidence::DeclaredName);
  }

  if let Some(family) = classify_by_outputs(metadata) {
    debug!(
      "按输出结构判定为 {:?}: 输出数 {}, 形状 {:?}",
      family,
      metadata.output_count(),
      metadata.output_shapes
    );
    return Classification::new(family, Evidence::OutputShape);
  }

  warn!("无法判定模型 '{}' 的推理类型，默认使用 YOLO 解码", metadata.declared_name);
  Classification::new(ModelFamily::Yolo, Evidence::Default)
}
