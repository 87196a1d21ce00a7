// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use std::cmp::Ordering;

use crate::model::Detection;

/// 按类别的贪心非极大值抑制。
///
/// 先按置信度降序稳定排序（相同置信度保持原顺序），
/// 然后保留每个未被抑制的检测，并抑制其后同类别且 IoU 大于阈值的检测。
/// 不同类别之间互不抑制。
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  if detections.len() < 2 {
    return detections;
  }

  // sort_by 是稳定排序
  detections.sort_by(|a, b| {
    b.confidence
      .partial_cmp(&a.confidence)
      .unwrap_or(Ordering::Equal)
  });

  let mut suppressed = vec![false; detections.len()];
  let mut keep = Vec::with_capacity(detections.len());

  for i in 0..detections.len() {
    if suppressed[i] {
      continue;
    }
    let best = &detections[i];
    for j in (i + 1)..detections.len() {
      if suppressed[j] || detections[j].class_id != best.class_id {
        continue;
      }
      if best.bbox.iou(&detections[j].bbox) > iou_threshold {
        suppressed[j] = true;
      }
    }
    keep.push(i);
  }

  let mut kept = Vec::with_capacity(keep.len());
  let mut keep = keep.into_iter().peekable();
  for (idx, det) in detections.into_iter().enumerate() {
    if keep.peek() == Some(&idx) {
      keep.next();
      kept.push(det);
    }
  }
  kept
}
