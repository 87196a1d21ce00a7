// 该文件是 Kanjian （看见） 项目的一部分。
// src/mapper.rs - 检测坐标到显示空间的映射
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

use crate::{
  geometry::BBox,
  model::{DetectResult, Detection},
};

/// 检测坐标所在的源空间，由解码器决定
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceSpace {
  /// 模型的正方形输入空间，两个轴缩放一致
  ModelInput { size: f32 },
  /// 原始图像像素空间
  Bitmap { width: f32, height: f32 },
}

impl SourceSpace {
  pub fn size(&self) -> (f32, f32) {
    match *self {
      SourceSpace::ModelInput { size } => (size, size),
      SourceSpace::Bitmap { width, height } => (width, height),
    }
  }
}

/// 显示区域：画布中实际显示图像的部分（可能带黑边）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
  pub display_width: f32,
  pub display_height: f32,
  pub offset_x: f32,
  pub offset_y: f32,
}

impl Viewport {
  /// 铺满整个画布（实时预览模式）
  pub fn full(canvas_width: f32, canvas_height: f32) -> Self {
    Viewport {
      display_width: canvas_width,
      display_height: canvas_height,
      offset_x: 0.0,
      offset_y: 0.0,
    }
  }

  /// 保持宽高比将图像放入画布并居中
  pub fn fit_inside(image_width: f32, image_height: f32, canvas_width: f32, canvas_height: f32) -> Self {
    if !(image_width > 0.0 && image_height > 0.0 && canvas_height > 0.0) {
      return Self::full(canvas_width, canvas_height);
    }

    let image_aspect = image_width / image_height;
    let canvas_aspect = canvas_width / canvas_height;

    if image_aspect > canvas_aspect {
      // 图像更宽：按宽度适配，上下留边
      let display_height = canvas_width / image_aspect;
      Viewport {
        display_width: canvas_width,
        display_height,
        offset_x: 0.0,
        offset_y: (canvas_height - display_height) / 2.0,
      }
    } else {
      // 图像更高：按高度适配，左右留边
      let display_width = canvas_height * image_aspect;
      Viewport {
        display_width,
        display_height: canvas_height,
        offset_x: (canvas_width - display_width) / 2.0,
        offset_y: 0.0,
      }
    }
  }

  pub fn map_bbox(&self, bbox: &BBox, space: SourceSpace) -> BBox {
    let (source_w, source_h) = space.size();
    let scale_x = self.display_width / source_w;
    let scale_y = self.display_height / source_h;
    BBox([
      bbox.x1() * scale_x + self.offset_x,
      bbox.y1() * scale_y + self.offset_y,
      bbox.x2() * scale_x + self.offset_x,
      bbox.y2() * scale_y + self.offset_y,
    ])
  }

  pub fn map_detection(&self, detection: &Detection, space: SourceSpace) -> Detection {
    Detection {
      bbox: self.map_bbox(&detection.bbox, space),
      ..detection.clone()
    }
  }

  /// 映射整帧结果到显示空间
  pub fn map_result(&self, result: &DetectResult) -> Vec<Detection> {
    result
      .iter()
      .map(|det| self.map_detection(det, result.space))
      .collect()
  }
}
