// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/record.rs - 文本记录输出
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

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::Path,
  sync::{Mutex, PoisonError},
};

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  mapper::Viewport,
  model::DetectResult,
  output::Render,
};

#[derive(Error, Debug)]
pub enum RecordOutputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch { expected: &'static str, found: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把每帧检测结果按 `标签, 置信度, x1, y1, x2, y2` 写入文本文件，坐标为原图像素。
///
/// `record:///out.txt?record=id` 记录类别 ID 而不是标签名。
pub struct RecordOutput {
  writer: Mutex<BufWriter<File>>,
  label_with_name: bool,
}

impl FromUrlWithScheme for RecordOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordOutput {
  type Error = RecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(RecordOutputError::SchemeMismatch {
        expected: Self::SCHEME,
        found: uri.scheme().to_string(),
      });
    }

    let label_with_name = !uri.query_pairs().any(|(k, v)| k == "record" && v == "id");
    Self::create(uri.path(), label_with_name)
  }
}

impl RecordOutput {
  pub fn create(path: impl AsRef<Path>, label_with_name: bool) -> Result<Self, RecordOutputError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    debug!("记录检测结果到 {}", path.display());
    Ok(RecordOutput {
      writer: Mutex::new(BufWriter::new(file)),
      label_with_name,
    })
  }

  fn format_frame(&self, frame: &Frame, result: &DetectResult) -> String {
    let (width, height) = frame.size();
    let viewport = Viewport::full(width, height);

    let mut text = format!("# frame {}\n", frame.index);
    for det in viewport.map_result(result) {
      let name = if self.label_with_name {
        det.label
      } else {
        det.class_id.to_string()
      };
      text.push_str(&format!(
        "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}\n",
        name,
        det.confidence,
        det.bbox.x1(),
        det.bbox.y1(),
        det.bbox.x2(),
        det.bbox.y2()
      ));
    }
    text
  }
}

impl Render<Frame, DetectResult> for RecordOutput {
  type Error = RecordOutputError;

  fn render_result(&self, frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    let text = self.format_frame(frame, result);
    let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{geometry::BBox, mapper::SourceSpace, model::Detection};
  use image::RgbImage;

  #[test]
  fn writes_mapped_records() {
    let path = std::env::temp_dir().join("kanjian_record_output_test.txt");
    let output = RecordOutput::create(&path, true).unwrap();
    let frame = Frame::new(1, RgbImage::new(600, 300));
    let result = DetectResult::new(
      vec![Detection {
        class_id: 1,
        label: "bicycle".to_string(),
        confidence: 0.9,
        bbox: BBox::new(30.0, 60.0, 150.0, 180.0),
      }],
      SourceSpace::ModelInput { size: 300.0 },
    );
    output.render_result(&frame, &result).unwrap();
    drop(output);

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
      text,
      "# frame 1\nbicycle, 0.9000, 60.0000, 60.0000, 300.0000, 180.0000\n"
    );
    let _ = std::fs::remove_file(&path);
  }

  #[test]
  fn records_class_ids_when_requested() {
    let path = std::env::temp_dir().join("kanjian_record_output_id_test.txt");
    let url = Url::parse(&format!("record://{}?record=id", path.display())).unwrap();
    let output = RecordOutput::from_url(&url).unwrap();
    let frame = Frame::new(2, RgbImage::new(10, 10));
    let result = DetectResult::new(
      vec![Detection {
        class_id: 4,
        label: "bus".to_string(),
        confidence: 0.5,
        bbox: BBox::new(1.0, 1.0, 2.0, 2.0),
      }],
      SourceSpace::Bitmap {
        width: 10.0,
        height: 10.0,
      },
    );
    output.render_result(&frame, &result).unwrap();
    drop(output);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\n4, 0.5000, 1.0000"));
    let _ = std::fs::remove_file(&path);
  }
}
