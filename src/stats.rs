// 该文件是 Kanjian （看见） 项目的一部分。
// src/stats.rs - 检测计数与帧率统计
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
  collections::HashMap,
  time::{Duration, Instant},
};

use crate::model::Detection;

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// 当前帧各标签的检测数量。标签只作为不透明的键使用。
#[derive(Debug, Clone, Default)]
pub struct LabelCounter {
  counts: HashMap<String, usize>,
}

impl LabelCounter {
  /// 用一帧的检测结果替换计数
  pub fn update<'a>(&mut self, detections: impl IntoIterator<Item = &'a Detection>) {
    self.counts.clear();
    for det in detections {
      *self.counts.entry(det.label.clone()).or_default() += 1;
    }
  }

  pub fn get(&self, label: &str) -> usize {
    self.counts.get(label).copied().unwrap_or(0)
  }

  pub fn total(&self) -> usize {
    self.counts.values().sum()
  }

  pub fn is_empty(&self) -> bool {
    self.counts.is_empty()
  }

  /// 数量最多的前 `n` 个标签，数量相同按标签排序
  pub fn top(&self, n: usize) -> Vec<(&str, usize)> {
    let mut entries: Vec<(&str, usize)> = self
      .counts
      .iter()
      .map(|(label, &count)| (label.as_str(), count))
      .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries.truncate(n);
    entries
  }
}

#[derive(Debug, Clone)]
pub struct FpsMeter {
  window_start: Instant,
  frames: usize,
  fps: f64,
  last_inference: Duration,
}

impl Default for FpsMeter {
  fn default() -> Self {
    Self::new(Instant::now())
  }
}

impl FpsMeter {
  pub fn new(now: Instant) -> Self {
    FpsMeter {
      window_start: now,
      frames: 0,
      fps: 0.0,
      last_inference: Duration::ZERO,
    }
  }

  /// 记录一帧。距窗口开始满一秒时重新计算帧率。
  pub fn tick(&mut self, now: Instant, inference_time: Duration) {
    self.frames += 1;
    self.last_inference = inference_time;

    let elapsed = now.saturating_duration_since(self.window_start);
    if elapsed >= FPS_WINDOW {
      self.fps = self.frames as f64 / elapsed.as_secs_f64();
      self.frames = 0;
      self.window_start = now;
    }
  }

  pub fn fps(&self) -> f64 {
    self.fps
  }

  pub fn last_inference(&self) -> Duration {
    self.last_inference
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::BBox;

  fn det(label: &str) -> Detection {
    Detection {
      class_id: 0,
      label: label.to_string(),
      confidence: 0.9,
      bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
    }
  }

  #[test]
  fn counts_per_frame() {
    let mut counter = LabelCounter::default();
    let frame = [det("car"), det("person"), det("car"), det("bus"), det("person"), det("car")];
    counter.update(&frame);
    assert_eq!(counter.get("car"), 3);
    assert_eq!(counter.total(), 6);
    assert_eq!(counter.top(2), vec![("car", 3), ("person", 2)]);

    counter.update(&[det("bus"), det("apple")]);
    assert_eq!(counter.get("car"), 0);
    assert_eq!(counter.top(5), vec![("apple", 1), ("bus", 1)]);

    counter.update(std::iter::empty());
    assert!(counter.is_empty());
  }

  #[test]
  fn fps_recomputed_after_one_second() {
    let start = Instant::now();
    let mut meter = FpsMeter::new(start);
    for i in 1..10 {
      meter.tick(start + Duration::from_millis(100 * i), Duration::from_millis(12));
    }
    assert_eq!(meter.fps(), 0.0);

    meter.tick(start + Duration::from_millis(1000), Duration::from_millis(15));
    assert!((meter.fps() - 10.0).abs() < 1e-9);
    assert_eq!(meter.last_inference(), Duration::from_millis(15));
  }
}
