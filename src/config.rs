// 该文件是 Kanjian （看见） 项目的一部分。
// src/config.rs - 检测配置
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

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_MIN_FRAME_INTERVAL: Duration = Duration::from_millis(33); // ~30 FPS

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("置信度阈值必须在 [0, 1] 之间, 实际为 {0}")]
  ConfidenceOutOfRange(f32),
  #[error("NMS IOU 阈值必须在 [0, 1] 之间, 实际为 {0}")]
  IouOutOfRange(f32),
}

/// 检测配置，解码时只读
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectConfig {
  /// 置信度阈值
  pub confidence_threshold: f32,
  /// NMS IOU 阈值
  pub nms_iou_threshold: f32,
  /// 两次解码之间的最小间隔（与相机帧率无关）
  pub min_frame_interval: Duration,
}

impl Default for DetectConfig {
  fn default() -> Self {
    DetectConfig {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      nms_iou_threshold: DEFAULT_NMS_IOU_THRESHOLD,
      min_frame_interval: DEFAULT_MIN_FRAME_INTERVAL,
    }
  }
}

impl DetectConfig {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_nms_iou_threshold(mut self, threshold: f32) -> Self {
    self.nms_iou_threshold = threshold;
    self
  }

  pub fn with_min_frame_interval(mut self, interval: Duration) -> Self {
    self.min_frame_interval = interval;
    self
  }

  pub fn validate(self) -> Result<Self, ConfigError> {
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(ConfigError::ConfidenceOutOfRange(self.confidence_threshold));
    }
    if !(0.0..=1.0).contains(&self.nms_iou_threshold) {
      return Err(ConfigError::IouOutOfRange(self.nms_iou_threshold));
    }
    Ok(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let config = DetectConfig::default();
    assert_eq!(config.confidence_threshold, 0.5);
    assert_eq!(config.nms_iou_threshold, 0.45);
    assert_eq!(config.min_frame_interval, Duration::from_millis(33));
  }

  #[test]
  fn validate_rejects_out_of_range() {
    let err = DetectConfig::default()
      .with_confidence_threshold(1.5)
      .validate()
      .unwrap_err();
    assert_eq!(err, ConfigError::ConfidenceOutOfRange(1.5));

    let err = DetectConfig::default()
      .with_nms_iou_threshold(f32::NAN)
      .validate();
    assert!(matches!(err, Err(ConfigError::IouOutOfRange(_))));

    assert!(DetectConfig::default().validate().is_ok());
  }
}
