// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use ab_glyph::FontArc;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::DetectResult,
  output::{Render, draw::Draw},
};

/// 带该查询参数时每帧单独保存为 `<名称>-<帧序号>.<扩展名>`
const PER_FRAME_QUERY: &str = "per_frame";
/// 标签文字所用的 TrueType 字体路径
const FONT_QUERY: &str = "font";

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: 期望保存方式 '{expected}', 实际保存方式 '{found}'")]
  SchemeMismatch { expected: &'static str, found: String },
  #[error("字体加载错误: {0}")]
  FontLoadError(String),
}

pub struct SaveImageFileOutput {
  path: PathBuf,
  per_frame: bool,
  draw: Draw,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch {
        expected: Self::SCHEME,
        found: uri.scheme().to_string(),
      });
    }

    let mut draw = Draw::default();
    if let Some((_, font_path)) = uri.query_pairs().find(|(k, _)| k == FONT_QUERY) {
      draw = draw.with_font(load_font(Path::new(&*font_path))?);
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(uri.path()),
      per_frame: uri.query_pairs().any(|(k, _)| k == PER_FRAME_QUERY),
      draw,
    })
  }
}

fn load_font(path: &Path) -> Result<FontArc, SaveImageFileError> {
  let data = std::fs::read(path)?;
  let font = FontArc::try_from_vec(data)
    .map_err(|e| SaveImageFileError::FontLoadError(format!("{}: {}", path.display(), e)))?;
  info!("加载标签字体: {}", path.display());
  Ok(font)
}

impl SaveImageFileOutput {
  fn frame_path(&self, index: usize) -> PathBuf {
    if !self.per_frame {
      return self.path.clone();
    }
    let stem = self
      .path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();
    let mut path = self.path.with_file_name(format!("{}-{}", stem, index));
    if let Some(ext) = self.path.extension() {
      path.set_extension(ext);
    }
    path
  }

  fn save_image(&self, path: &Path, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(path)?;
    info!("保存图像到文件: {}", path.display());
    Ok(())
  }
}

impl Render<Frame, DetectResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    let image = self.draw.draw_detections(&frame.image, result);
    self.save_image(&self.frame_path(frame.index), image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mapper::SourceSpace;
  use image::RgbImage;

  #[test]
  fn saves_per_frame_files() {
    let dir = std::env::temp_dir().join("kanjian_save_image_test");
    let _ = std::fs::remove_dir_all(&dir);
    let url = Url::parse(&format!("image://{}/out.png?per_frame", dir.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();

    let frame = Frame::new(3, RgbImage::new(8, 8));
    let result = DetectResult::empty(SourceSpace::Bitmap {
      width: 8.0,
      height: 8.0,
    });
    output.render_result(&frame, &result).unwrap();
    assert!(dir.join("out-3.png").is_file());
    let _ = std::fs::remove_dir_all(&dir);
  }

  #[test]
  fn invalid_font_is_rejected() {
    let font = std::env::temp_dir().join("kanjian_not_a_font.ttf");
    std::fs::write(&font, b"not a font").unwrap();
    let url = Url::parse(&format!("image:///tmp/out.png?font={}", font.display())).unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::FontLoadError(_))
    ));
    let _ = std::fs::remove_file(&font);
  }
}
