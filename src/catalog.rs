// 该文件是 Kanjian （看见） 项目的一部分。
// src/catalog.rs - 模型目录
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::ModelMetadata;

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("读取模型目录失败 {0}: {1}")]
  IoError(String, std::io::Error),
  #[error("模型目录格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("模型 '{name}' 的地址无法得到文件名: {url}")]
  MissingFileName { name: String, url: String },
}

/// 目录中的一个模型条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
  pub name: String,
  pub model_url: String,
  pub labels_url: String,
  #[serde(rename = "type", default)]
  pub model_type: String,
}

fn last_segment(url: &str) -> &str {
  url.rsplit('/').next().unwrap_or(url)
}

impl ModelInfo {
  /// 模型文件名：模型地址的最后一段
  pub fn file_name(&self) -> &str {
    last_segment(&self.model_url)
  }

  pub fn labels_file_name(&self) -> &str {
    last_segment(&self.labels_url)
  }

  pub fn model_path(&self, dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(self.file_name())
  }

  pub fn labels_path(&self, dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(self.labels_file_name())
  }

  /// 模型与标签文件都已存在于目录中
  pub fn is_downloaded(&self, dir: impl AsRef<Path>) -> bool {
    let dir = dir.as_ref();
    self.model_path(dir).is_file() && self.labels_path(dir).is_file()
  }

  /// 供分类器预先判定解码器的元数据提示
  pub fn metadata_hint(&self) -> ModelMetadata {
    ModelMetadata {
      declared_type: self.model_type.clone(),
      declared_name: self.name.clone(),
      ..ModelMetadata::default()
    }
  }

  fn check(&self) -> Result<(), CatalogError> {
    for url in [&self.model_url, &self.labels_url] {
      if last_segment(url).is_empty() {
        return Err(CatalogError::MissingFileName {
          name: self.name.clone(),
          url: url.clone(),
        });
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
  models: Vec<ModelInfo>,
}

impl Catalog {
  pub fn from_json(text: &str) -> Result<Self, CatalogError> {
    let models: Vec<ModelInfo> = serde_json::from_str(text)?;
    for model in &models {
      model.check()?;
      debug!("模型 '{}' 类型 '{}' -> {}", model.name, model.model_type, model.file_name());
    }
    Ok(Catalog { models })
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
    let path = path.as_ref();
    let text =
      std::fs::read_to_string(path).map_err(|e| CatalogError::IoError(path.display().to_string(), e))?;
    let catalog = Self::from_json(&text)?;
    info!("模型目录 {} 中共 {} 个模型", path.display(), catalog.len());
    Ok(catalog)
  }

  pub fn len(&self) -> usize {
    self.models.len()
  }

  pub fn is_empty(&self) -> bool {
    self.models.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, ModelInfo> {
    self.models.iter()
  }

  /// 按名称查找，不区分大小写
  pub fn find(&self, name: &str) -> Option<&ModelInfo> {
    self.models.iter().find(|m| m.name.eq_ignore_ascii_case(name))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const CATALOG: &str = r#"[
    {
      "name": "Grocery Detector",
      "model_url": "https://example.org/models/grocery_int8.tflite",
      "labels_url": "https://example.org/models/grocery_labels.txt",
      "type": "grocery"
    },
    {
      "name": "MobileNet SSD",
      "model_url": "https://example.org/ssd/detect.tflite",
      "labels_url": "https://example.org/ssd/labelmap.txt",
      "type": "ssd"
    }
  ]"#;

  #[test]
  fn parses_entries_and_file_names() {
    let catalog = Catalog::from_json(CATALOG).unwrap();
    assert_eq!(catalog.len(), 2);
    let grocery = catalog.find("grocery detector").unwrap();
    assert_eq!(grocery.file_name(), "grocery_int8.tflite");
    assert_eq!(grocery.labels_file_name(), "grocery_labels.txt");
    assert_eq!(grocery.model_type, "grocery");
  }

  #[test]
  fn metadata_hint_drives_classifier() {
    let catalog = Catalog::from_json(CATALOG).unwrap();
    let hint = catalog.find("MobileNet SSD").unwrap().metadata_hint();
    let classification = crate::model::classify(&hint);
    assert_eq!(classification.kind, crate::model::DecoderKind::FixedSlot);
  }

  #[test]
  fn download_state_requires_both_files() {
    let catalog = Catalog::from_json(CATALOG).unwrap();
    let ssd = catalog.find("MobileNet SSD").unwrap();
    let dir = std::env::temp_dir().join("kanjian_catalog_test");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    assert!(!ssd.is_downloaded(&dir));
    std::fs::write(ssd.model_path(&dir), b"model").unwrap();
    assert!(!ssd.is_downloaded(&dir));
    std::fs::write(ssd.labels_path(&dir), b"person\n").unwrap();
    assert!(ssd.is_downloaded(&dir));

    let _ = std::fs::remove_dir_all(&dir);
  }

  #[test]
  fn rejects_urls_without_file_name() {
    let text = r#"[{"name": "x", "model_url": "https://example.org/", "labels_url": "a.txt", "type": ""}]"#;
    assert!(matches!(
      Catalog::from_json(text),
      Err(CatalogError::MissingFileName { .. })
    ));
    assert!(matches!(Catalog::from_json("{}"), Err(CatalogError::JsonError(_))));
  }
}
