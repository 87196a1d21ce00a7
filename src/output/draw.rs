// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};

use crate::{
  geometry::BBox,
  mapper::Viewport,
  model::{DetectResult, Detection},
};

const BOX_THICKNESS: i32 = 2;
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_STRIP_HEIGHT: i32 = 20;
const LABEL_CHAR_WIDTH: f32 = 8.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

// 按类别轮换的边框颜色
const PALETTE: [[u8; 3]; 6] = [
  [0, 0, 255],
  [255, 0, 0],
  [0, 200, 0],
  [255, 160, 0],
  [160, 0, 255],
  [0, 200, 200],
];

/// 边框 + 标签条。没有字体时只画标签条背景。
pub struct Draw {
  thickness: i32,
  palette: &'static [[u8; 3]],
  font: Option<FontArc>,
}

impl Default for Draw {
  fn default() -> Self {
    Draw {
      thickness: BOX_THICKNESS,
      palette: &PALETTE,
      font: None,
    }
  }
}

impl Draw {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  fn color(&self, class_id: usize) -> Rgb<u8> {
    Rgb(self.palette[class_id % self.palette.len()])
  }

  /// 在边框上方画 `标签 置信度` 标签条；上方没有空间时画在框内顶部
  fn draw_label(&self, image: &mut RgbImage, det: &Detection, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let text = format!("{} {:.2}", det.label, det.confidence);
    let x = (det.bbox.x1().floor() as i32).clamp(0, w - 1);
    let top = (det.bbox.y1().floor() as i32).clamp(0, h - 1);
    let y = if top >= LABEL_STRIP_HEIGHT {
      top - LABEL_STRIP_HEIGHT
    } else {
      top
    };

    let width = ((text.chars().count() as f32 * LABEL_CHAR_WIDTH) as i32).min(w - x);
    let height = LABEL_STRIP_HEIGHT.min(h - y);
    if width <= 0 || height <= 0 {
      return;
    }
    draw_filled_rect_mut(image, Rect::at(x, y).of_size(width as u32, height as u32), color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        LABEL_TEXT_COLOR,
        x + LABEL_TEXT_PADDING,
        y + LABEL_TEXT_PADDING,
        PxScale::from(LABEL_FONT_SIZE),
        font,
        &text,
      );
    }
  }

  /// 在图像上画一个像素坐标的边框，向内加粗
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &BBox, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox.x1().floor() as i32).clamp(0, w - 1);
    let y_min = (bbox.y1().floor() as i32).clamp(0, h - 1);
    let x_max = (bbox.x2().ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox.y2().ceil() as i32).clamp(0, h - 1);

    for t in 0..self.thickness {
      let (width, height) = (x_max - x_min - 2 * t, y_max - y_min - 2 * t);
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
      draw_hollow_rect_mut(image, rect, color);
    }
  }

  /// 把检测结果映射到整张图像并绘制
  pub fn draw_detections(&self, image: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut canvas = image.clone();
    let viewport = Viewport::full(image.width() as f32, image.height() as f32);
    for det in viewport.map_result(result) {
      let color = self.color(det.class_id);
      self.draw_bbox(&mut canvas, &det.bbox, color);
      self.draw_label(&mut canvas, &det, color);
    }
    canvas
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{mapper::SourceSpace, model::Detection};

  #[test]
  fn draws_mapped_box_edges() {
    let image = RgbImage::new(200, 100);
    let result = DetectResult::new(
      vec![Detection {
        class_id: 0,
        label: "person".to_string(),
        confidence: 0.9,
        bbox: BBox::new(50.0, 50.0, 150.0, 150.0),
      }],
      SourceSpace::ModelInput { size: 200.0 },
    );
    let drawn = Draw::default().draw_detections(&image, &result);
    // 模型输入 (50, 50) 映射到图像 (50, 25)
    assert_eq!(*drawn.get_pixel(50, 25), Rgb(PALETTE[0]));
    assert_eq!(*drawn.get_pixel(100, 50), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(50, 25), Rgb([0, 0, 0]));
  }

  #[test]
  fn label_strip_sits_above_box() {
    let image = RgbImage::new(100, 100);
    let bitmap = SourceSpace::Bitmap {
      width: 100.0,
      height: 100.0,
    };
    let result = DetectResult::new(
      vec![Detection {
        class_id: 2,
        label: "cat".to_string(),
        confidence: 0.9,
        bbox: BBox::new(20.0, 40.0, 80.0, 90.0),
      }],
      bitmap,
    );
    let drawn = Draw::default().draw_detections(&image, &result);
    // "cat 0.90" 约 64 像素宽，位于 y 20..40
    assert_eq!(*drawn.get_pixel(30, 30), Rgb(PALETTE[2]));
    assert_eq!(*drawn.get_pixel(30, 10), Rgb([0, 0, 0]));
    assert_eq!(*drawn.get_pixel(90, 30), Rgb([0, 0, 0]));

    // 贴近顶部的框，标签条画在框内
    let result = DetectResult::new(
      vec![Detection {
        class_id: 2,
        label: "cat".to_string(),
        confidence: 0.9,
        bbox: BBox::new(20.0, 5.0, 80.0, 90.0),
      }],
      bitmap,
    );
    let drawn = Draw::default().draw_detections(&image, &result);
    assert_eq!(*drawn.get_pixel(30, 15), Rgb(PALETTE[2]));
    assert_eq!(*drawn.get_pixel(30, 2), Rgb([0, 0, 0]));
  }

  #[test]
  fn out_of_frame_box_does_not_panic() {
    let image = RgbImage::new(10, 10);
    let result = DetectResult::new(
      vec![Detection {
        class_id: 7,
        label: "x".to_string(),
        confidence: 0.9,
        bbox: BBox::new(-50.0, -50.0, 500.0, 500.0),
      }],
      SourceSpace::Bitmap {
        width: 10.0,
        height: 10.0,
      },
    );
    let drawn = Draw::default().draw_detections(&image, &result);
    assert_eq!(*drawn.get_pixel(0, 0), Rgb(PALETTE[1]));
  }
}
