// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/labels.rs - 标签表
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

use std::{path::Path, sync::Arc};

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("读取标签文件失败 {0}: {1}")]
  IoError(String, std::io::Error),
}

/// 有序标签表，下标即类别 ID。克隆开销很小，可在帧之间共享。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTable {
  labels: Arc<[String]>,
}

impl LabelTable {
  /// 每行一个标签，忽略空行
  pub fn from_text(text: &str) -> Self {
    text
      .lines()
      .map(str::trim_end)
      .filter(|line| !line.trim().is_empty())
      .map(str::to_string)
      .collect()
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
      .map_err(|e| LabelError::IoError(path.display().to_string(), e))?;
    let labels = Self::from_text(&text);

    if labels.len() <= 10 {
      debug!("加载 {} 个标签: {}", labels.len(), labels.labels.join(", "));
    } else {
      debug!(
        "加载 {} 个标签，前 10 个: {}",
        labels.len(),
        labels.labels[..10].join(", ")
      );
    }
    Ok(labels)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.labels.get(class_id).map(String::as_str)
  }

  /// 标签名；超出表长时使用 "Class {id}"
  pub fn name_or_class(&self, class_id: usize) -> String {
    self
      .get(class_id)
      .map(str::to_string)
      .unwrap_or_else(|| format!("Class {}", class_id))
  }

  /// 标签名；超出表长时使用给定的占位名
  pub fn name_or(&self, class_id: usize, fallback: &str) -> String {
    self.get(class_id).unwrap_or(fallback).to_string()
  }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    LabelTable {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}
