// 该文件是 Kanjian （看见） 项目的一部分。
// src/geometry.rs - 边界框与 IoU
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

/// 轴对齐边界框，角点表示 [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox(pub [f32; 4]);

impl BBox {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    BBox([x1, y1, x2, y2])
  }

  /// 由中心点和宽高构造
  pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    BBox([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0])
  }

  pub fn x1(&self) -> f32 {
    self.0[0]
  }

  pub fn y1(&self) -> f32 {
    self.0[1]
  }

  pub fn x2(&self) -> f32 {
    self.0[2]
  }

  pub fn y2(&self) -> f32 {
    self.0[3]
  }

  pub fn width(&self) -> f32 {
    self.x2() - self.x1()
  }

  pub fn height(&self) -> f32 {
    self.y2() - self.y1()
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  /// 退化框：宽或高不为正（含 NaN）
  pub fn is_degenerate(&self) -> bool {
    !(self.x2() > self.x1() && self.y2() > self.y1())
  }

  /// 将每个角点限制在 [0, w] x [0, h] 内
  pub fn clamp_to(&self, w: f32, h: f32) -> Self {
    BBox([
      self.x1().clamp(0.0, w),
      self.y1().clamp(0.0, h),
      self.x2().clamp(0.0, w),
      self.y2().clamp(0.0, h),
    ])
  }

  /// 交并比；并集面积不为正时返回 0
  pub fn iou(&self, other: &BBox) -> f32 {
    let x1 = self.x1().max(other.x1());
    let y1 = self.y1().max(other.y1());
    let x2 = self.x2().min(other.x2());
    let y2 = self.y2().min(other.y2());

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

impl From<[f32; 4]> for BBox {
  fn from(corners: [f32; 4]) -> Self {
    BBox(corners)
  }
}
