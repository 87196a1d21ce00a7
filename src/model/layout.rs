// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/layout.rs - 输出张量布局解析
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

/// 最少特征数：4 个框坐标 + 1 个目标置信度
pub const MIN_FEATURES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrder {
  /// [1, features, anchors]，同一特征在内存中连续
  FeaturesFirst,
  /// [1, anchors, features]，同一锚点在内存中连续
  AnchorsFirst,
}

/// 由输出形状推导出的锚点/特征布局，每次推理重新计算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
  pub anchors: usize,
  pub features: usize,
  pub axis_order: AxisOrder,
}

impl OutputLayout {
  /// 从声明的输出形状解析布局。
  ///
  /// 忽略批次维与所有大小为 1 的维度，取剩余的前两个维度，
  /// 较小者（相等时取前者）视为特征维。无法解析时返回 `None`。
  pub fn resolve(shape: &[usize]) -> Option<Self> {
    let dims: Vec<usize> = shape.iter().skip(1).copied().filter(|&d| d > 1).collect();
    if dims.len() < 2 {
      return None;
    }

    let (a, b) = (dims[0], dims[1]);
    let features_first = a <= b;
    let (features, anchors) = if features_first { (a, b) } else { (b, a) };

    if features < MIN_FEATURES || anchors == 0 {
      return None;
    }

    Some(OutputLayout {
      anchors,
      features,
      axis_order: if features_first {
        AxisOrder::FeaturesFirst
      } else {
        AxisOrder::AnchorsFirst
      },
    })
  }

  /// 类别分数槽位数
  pub fn class_slots(&self) -> usize {
    self.features - MIN_FEATURES
  }

  /// 将第 `anchor` 个锚点的全部特征读入 `out`，越界时返回 `false`
  pub fn gather(&self, data: &[f32], anchor: usize, out: &mut [f32]) -> bool {
    debug_assert_eq!(out.len(), self.features);
    match self.axis_order {
      AxisOrder::FeaturesFirst => {
        let last = (self.features - 1) * self.anchors + anchor;
        if anchor >= self.anchors || last >= data.len() {
          return false;
        }
        for (i, slot) in out.iter_mut().enumerate() {
          *slot = data[i * self.anchors + anchor];
        }
        true
      }
      AxisOrder::AnchorsFirst => {
        let base = anchor * self.features;
        match data.get(base..base + self.features) {
          Some(values) => {
            out.copy_from_slice(values);
            true
          }
          None => false,
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolves_features_first() {
    let layout = OutputLayout::resolve(&[1, 84, 8400]).unwrap();
    assert_eq!(layout.features, 84);
    assert_eq!(layout.anchors, 8400);
    assert_eq!(layout.axis_order, AxisOrder::FeaturesFirst);
    assert_eq!(layout.class_slots(), 79);
  }

  #[test]
  fn resolves_anchors_first() {
    let layout = OutputLayout::resolve(&[1, 8400, 84]).unwrap();
    assert_eq!(layout.features, 84);
    assert_eq!(layout.anchors, 8400);
    assert_eq!(layout.axis_order, AxisOrder::AnchorsFirst);
  }

  #[test]
  fn ignores_unit_axes() {
    let layout = OutputLayout::resolve(&[1, 1, 6, 2100]).unwrap();
    assert_eq!(layout.features, 6);
    assert_eq!(layout.anchors, 2100);
  }

  #[test]
  fn tie_prefers_features_first() {
    let layout = OutputLayout::resolve(&[1, 10, 10]).unwrap();
    assert_eq!(layout.axis_order, AxisOrder::FeaturesFirst);
  }

  #[test]
  fn rejects_unusable_shapes() {
    assert!(OutputLayout::resolve(&[]).is_none());
    assert!(OutputLayout::resolve(&[1, 8400]).is_none());
    assert!(OutputLayout::resolve(&[1, 4, 8400]).is_none());
    assert!(OutputLayout::resolve(&[1, 8400, 1, 4]).is_none());
  }

  #[test]
  fn gather_respects_axis_order() {
    // 6 个锚点，5 个特征，值为 特征 * 10 + 锚点
    let (features, anchors) = (5, 6);
    let mut features_first = vec![0.0f32; features * anchors];
    let mut anchors_first = vec![0.0f32; features * anchors];
    for f in 0..features {
      for a in 0..anchors {
        let value = (f * 10 + a) as f32;
        features_first[f * anchors + a] = value;
        anchors_first[a * features + f] = value;
      }
    }

    let mut out = [0.0; 5];
    let layout = OutputLayout::resolve(&[1, 5, 6]).unwrap();
    assert_eq!(layout.axis_order, AxisOrder::FeaturesFirst);
    assert!(layout.gather(&features_first, 1, &mut out));
    assert_eq!(out, [1., 11., 21., 31., 41.]);

    let layout = OutputLayout::resolve(&[1, 6, 5]).unwrap();
    assert_eq!(layout.axis_order, AxisOrder::AnchorsFirst);
    assert!(layout.gather(&anchors_first, 1, &mut out));
    assert_eq!(out, [1., 11., 21., 31., 41.]);
  }

  #[test]
  fn gather_reports_out_of_bounds() {
    let short = vec![0.0; 10];
    let mut out = [0.0; 5];

    let layout = OutputLayout::resolve(&[1, 5, 8]).unwrap();
    assert!(!layout.gather(&short, 3, &mut out));
    assert!(!layout.gather(&short, 8, &mut out));

    let layout = OutputLayout::resolve(&[1, 8, 5]).unwrap();
    assert!(!layout.gather(&short, 2, &mut out));
    assert!(layout.gather(&short, 1, &mut out));
  }
}
