// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/anchor.rs - 基于锚点的单张量解码（YOLO 系列）
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

use crate::{
  config::DetectConfig,
  geometry::BBox,
  model::{Detection, LabelTable, OutputLayout, layout::MIN_FEATURES, nms},
};

/// 解码 YOLO 风格输出并做 NMS。
///
/// 特征布局: [cx, cy, w, h, objectness, class_0 .. class_n]，坐标为模型输入像素。
/// 形状无法解析时退化为按标签数切分的定长记录解码。
pub fn decode_anchor_based(
  data: &[f32],
  shape: &[usize],
  labels: &LabelTable,
  config: &DetectConfig,
) -> Vec<Detection> {
  let candidates = match OutputLayout::resolve(shape) {
    Some(layout) => {
      debug!(
        "输出布局: 锚点 {}, 特征 {}（类别 {}）, {:?}",
        layout.anchors,
        layout.features,
        layout.class_slots(),
        layout.axis_order
      );
      decode_with_layout(data, &layout, labels, config)
    }
    None => {
      warn!("无法解析输出形状 {:?}，使用定长记录解码", shape);
      decode_legacy(data, labels, config)
    }
  };

  debug!("NMS 前候选数: {}", candidates.len());
  nms(candidates, config.nms_iou_threshold)
}

/// 单类别锚点解码（姿态等模型）并做 NMS。
///
/// 只读取前 5 个特征，置信度即 `values[4]`，类别固定为 0；其后的关键点等特征被忽略。
pub fn decode_single_class(
  data: &[f32],
  shape: &[usize],
  labels: &LabelTable,
  config: &DetectConfig,
) -> Vec<Detection> {
  let Some(layout) = OutputLayout::resolve(shape) else {
    warn!("无法解析单类别输出形状 {:?}，跳过本帧", shape);
    return Vec::new();
  };

  let candidates = decode_records(data, &layout, MIN_FEATURES, labels, config);
  debug!("单类别 NMS 前候选数: {}", candidates.len());
  nms(candidates, config.nms_iou_threshold)
}

/// 按解析出的布局逐锚点解码，不做 NMS
pub fn decode_with_layout(
  data: &[f32],
  layout: &OutputLayout,
  labels: &LabelTable,
  config: &DetectConfig,
) -> Vec<Detection> {
  decode_records(data, layout, layout.features, labels, config)
}

// 每个锚点只取前 `used` 个特征
fn decode_records(
  data: &[f32],
  layout: &OutputLayout,
  used: usize,
  labels: &LabelTable,
  config: &DetectConfig,
) -> Vec<Detection> {
  let mut detections = Vec::new();
  let mut values = vec![0.0f32; layout.features];

  for anchor in 0..layout.anchors {
    if !layout.gather(data, anchor, &mut values) {
      continue;
    }
    if let Some(det) = decode_record(&values[..used], labels, config) {
      detections.push(det);
    }
  }

  detections
}

/// 定长记录解码：每条记录 `labels.len() + 5` 个值，锚点连续存放
pub fn decode_legacy(data: &[f32], labels: &LabelTable, config: &DetectConfig) -> Vec<Detection> {
  let record_len = labels.len() + MIN_FEATURES;
  let num_predictions = data.len() / record_len;
  let mut detections = Vec::new();

  for i in 0..num_predictions {
    let offset = i * record_len;
    if offset + 4 >= data.len() {
      break;
    }
    let end = (offset + record_len).min(data.len());
    if let Some(det) = decode_record(&data[offset..end], labels, config) {
      detections.push(det);
    }
  }

  detections
}

fn decode_record(values: &[f32], labels: &LabelTable, config: &DetectConfig) -> Option<Detection> {
  let threshold = config.confidence_threshold;
  let objectness = values[4];
  // NaN 也在这里被拒绝
  if !(objectness >= threshold) {
    return None;
  }

  let class_scores = &values[MIN_FEATURES..];
  let (class_id, confidence) = if class_scores.is_empty() {
    // 没有类别槽位：单类别模型
    (0, objectness)
  } else {
    let mut best_score = 0.0f32;
    let mut best_id = 0usize;
    for (id, &score) in class_scores.iter().enumerate() {
      if score > best_score {
        best_score = score;
        best_id = id;
      }
    }
    (best_id, objectness * best_score)
  };

  if confidence < threshold {
    return None;
  }

  let bbox = BBox::from_center(values[0], values[1], values[2], values[3]);
  if bbox.is_degenerate() {
    return None;
  }

  Some(Detection {
    class_id,
    label: labels.name_or_class(class_id),
    confidence,
    bbox,
  })
}
