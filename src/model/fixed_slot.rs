// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/fixed_slot.rs - 四张量定槽解码（SSD 系列）
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
  model::{Detection, LabelTable, OutputTensor},
};

pub const FIXED_SLOT_NUM_OUTPUTS: usize = 4;

/// SSD 输出的四个并行张量
#[derive(Debug, Clone, Copy)]
pub struct FixedSlotOutputs<'a> {
  /// [N, 4]，每个槽位为归一化的 [ymin, xmin, ymax, xmax]
  pub locations: &'a [f32],
  /// [N]，浮点编码的类别下标
  pub classes: &'a [f32],
  /// [N]，置信度
  pub scores: &'a [f32],
  /// [1]，有效槽位数
  pub num_detections: &'a [f32],
}

impl<'a> FixedSlotOutputs<'a> {
  /// 按 locations, classes, scores, num_detections 的顺序取前四个输出；不足四个时返回 `None`
  pub fn from_outputs(outputs: &'a [OutputTensor]) -> Option<Self> {
    match outputs {
      [locations, classes, scores, num_detections, ..] => Some(FixedSlotOutputs {
        locations: &locations.data,
        classes: &classes.data,
        scores: &scores.data,
        num_detections: &num_detections.data,
      }),
      _ => None,
    }
  }

  pub fn valid_slots(&self) -> usize {
    // as 转换对负数与 NaN 饱和为 0
    let declared = self.num_detections.first().copied().unwrap_or(0.0) as usize;
    declared.min(self.scores.len())
  }
}

/// 解码 SSD 输出。模型内部已做过抑制，这里不再做 NMS。
///
/// `input_size` 是模型的正方形输入边长，两个轴使用同一个缩放因子。
pub fn decode_fixed_slot(
  outputs: &FixedSlotOutputs<'_>,
  input_size: f32,
  labels: &LabelTable,
  config: &DetectConfig,
) -> Vec<Detection> {
  let count = outputs.valid_slots();
  debug!("有效检测槽位: {}", count);

  let mut detections = Vec::new();
  for i in 0..count {
    let score = outputs.scores[i];
    if !(score >= config.confidence_threshold) {
      continue;
    }

    let Some(loc) = outputs.locations.get(i * 4..i * 4 + 4) else {
      continue;
    };
    let Some(&class_value) = outputs.classes.get(i) else {
      continue;
    };
    if !class_value.is_finite() || class_value < 0.0 {
      continue;
    }
    let class_id = class_value as usize;

    let (ymin, xmin, ymax, xmax) = (
      loc[0] * input_size,
      loc[1] * input_size,
      loc[2] * input_size,
      loc[3] * input_size,
    );
    let bbox = BBox::new(xmin, ymin, xmax, ymax);
    if bbox.is_degenerate() {
      continue;
    }

    let label = labels.name_or(class_id, "Unknown");
    debug!(
      "检测: {} ({}) 置信度 {:.2}% [{:.0}, {:.0}, {:.0}, {:.0}]",
      label,
      class_id,
      score * 100.0,
      xmin,
      ymin,
      xmax,
      ymax
    );
    detections.push(Detection {
      class_id,
      label,
      confidence: score,
      bbox,
    });
  }

  detections
}
