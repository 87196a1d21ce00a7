// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch { expected: &'static str, found: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("无效的重复次数: {0}")]
  InvalidRepeat(String),
}

/// 从单个图像文件读取帧。`image:///a.png?repeat=N` 会将同一张图重复 N 次。
pub struct ImageFileInput {
  image: RgbImage,
  repeat: usize,
  next_index: usize,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!("URI 方案不匹配: 期望 '{}', 实际 '{}'", Self::SCHEME, url.scheme());
      return Err(ImageFileInputError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    let repeat = match url.query_pairs().find(|(k, _)| k == "repeat") {
      Some((_, v)) => v
        .parse::<usize>()
        .map_err(|_| ImageFileInputError::InvalidRepeat(v.to_string()))?,
      None => 1,
    };

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    info!(
      "读取图像 {}: {}x{}，重复 {} 次",
      path,
      image.width(),
      image.height(),
      repeat
    );

    Ok(ImageFileInput::new(image, repeat))
  }
}

impl ImageFileInput {
  pub fn new(image: RgbImage, repeat: usize) -> Self {
    ImageFileInput {
      image,
      repeat,
      next_index: 0,
    }
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.next_index >= self.repeat {
      return None;
    }
    self.next_index += 1;
    Some(Frame::new(self.next_index, self.image.clone()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn repeats_frames_with_increasing_index() {
    let input = ImageFileInput::new(RgbImage::new(4, 4), 3);
    let indices: Vec<usize> = input.map(|f| f.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
  }

  #[test]
  fn reads_image_from_url() {
    let path = std::env::temp_dir().join("kanjian_image_input_test.png");
    RgbImage::from_pixel(6, 4, image::Rgb([1, 2, 3])).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}?repeat=2", path.display())).unwrap();
    let frames: Vec<Frame> = ImageFileInput::from_url(&url).unwrap().collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].size(), (6.0, 4.0));
    let _ = std::fs::remove_file(&path);
  }

  #[test]
  fn rejects_wrong_scheme_and_bad_repeat() {
    let url = Url::parse("tensor:///tmp/a.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemeMismatch { .. })
    ));
    let url = Url::parse("image:///tmp/a.png?repeat=many").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::InvalidRepeat(_))
    ));
  }
}
