// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/fixed5.rs - 固定 5 特征锚点网格解码（商品、车牌等单类别模型）
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

use tracing::debug;

use crate::{
  config::DetectConfig,
  geometry::BBox,
  model::{AxisOrder, Detection, LabelTable, OutputLayout, layout::MIN_FEATURES, nms},
};

/// 已知的专用网格锚点数（640x640 输入，三个检测头）
pub const SPECIALIZED_ANCHOR_GRIDS: [usize; 1] = [8400];

/// 中心点不超过该值时认为坐标已归一化
const NORMALIZED_COORD_LIMIT: f32 = 1.5;

const FALLBACK_LABEL: &str = "item";

/// 尺寸（宽，高）
pub type Size = (f32, f32);

/// 解码 [1, 5, N] 输出，结果位于原始图像像素空间，并做 NMS。
///
/// 每个锚点: [cx, cy, w, h, confidence]，单类别。坐标既可能是归一化的，
/// 也可能是模型输入像素，逐锚点判断。
pub fn decode_fixed5(
  data: &[f32],
  shape: &[usize],
  model_input: Size,
  bitmap: Size,
  labels: &LabelTable,
  config: &DetectConfig,
) -> Vec<Detection> {
  let layout = OutputLayout::resolve(shape)
    .filter(|layout| layout.features == MIN_FEATURES)
    .unwrap_or(OutputLayout {
      anchors: data.len() / MIN_FEATURES,
      features: MIN_FEATURES,
      axis_order: AxisOrder::FeaturesFirst,
    });

  let (bitmap_w, bitmap_h) = bitmap;
  let (scale_x, scale_y) = (bitmap_w / model_input.0, bitmap_h / model_input.1);
  let label = labels.name_or(0, FALLBACK_LABEL);

  let mut values = [0.0f32; MIN_FEATURES];
  let mut detections = Vec::new();

  for anchor in 0..layout.anchors {
    if !layout.gather(data, anchor, &mut values) {
      continue;
    }

    let [mut cx, mut cy, mut w, mut h, confidence] = values;
    if !(confidence >= config.confidence_threshold) {
      continue;
    }

    if cx <= NORMALIZED_COORD_LIMIT && cy <= NORMALIZED_COORD_LIMIT {
      cx *= bitmap_w;
      cy *= bitmap_h;
      w *= bitmap_w;
      h *= bitmap_h;
    } else {
      cx *= scale_x;
      cy *= scale_y;
      w *= scale_x;
      h *= scale_y;
    }

    let bbox = BBox::from_center(cx, cy, w, h).clamp_to(bitmap_w, bitmap_h);
    if bbox.is_degenerate() {
      continue;
    }

    detections.push(Detection {
      class_id: 0,
      label: label.clone(),
      confidence,
      bbox,
    });
  }

  debug!("NMS 前候选数: {}", detections.len());
  let detections = nms(detections, config.nms_iou_threshold);
  for det in &detections {
    debug!("  {}: conf={:.3}", det.label, det.confidence);
  }
  detections
}
