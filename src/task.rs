// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 推理任务
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
  sync::{Arc, mpsc},
  thread,
  time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{
  frame::Frame,
  model::{DetectResult, InferenceEngine},
  output::Render,
  pipeline::{FrameOutcome, FrameReport, Pipeline},
  stats::{FpsMeter, LabelCounter},
};

/// 概要中显示的标签数
const SUMMARY_TOP_LABELS: usize = 2;

pub trait Task<I, P, O>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: P, output: O) -> Result<(), Self::Error>;
}

fn summarize(counter: &LabelCounter) -> String {
  counter
    .top(SUMMARY_TOP_LABELS)
    .into_iter()
    .map(|(label, count)| format!("{} x{}", label, count))
    .collect::<Vec<_>>()
    .join(", ")
}

pub struct OneShotTask;

impl<E, RE, I, O> Task<I, Arc<Pipeline<E>>, O> for OneShotTask
where
  E: InferenceEngine,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Frame>,
  O: Render<Frame, DetectResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, pipeline: Arc<Pipeline<E>>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");

    let report = match pipeline.process_frame(&frame) {
      FrameOutcome::Processed(report) => report,
      FrameOutcome::Dropped(reason) => anyhow::bail!("第 {} 帧被丢弃: {:?}", frame.index, reason),
    };
    if report.degraded {
      warn!("推理引擎处于降级状态");
    }
    info!(
      "推理完成，耗时: {:.2?}，检测到 {} 个目标",
      report.inference_time,
      report.result.len()
    );

    let mut counter = LabelCounter::default();
    counter.update(report.result.iter());
    if !counter.is_empty() {
      info!("检测统计: {}", summarize(&counter));
    }

    let now = Instant::now();
    output.render_result(&frame, &report.result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 连续处理输入帧。帧交给后台线程推理，线程忙碌时直接丢弃。
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  frame_interval: Option<Duration>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 两次读取输入之间的间隔，用于模拟相机帧率
  pub fn with_frame_interval(mut self, frame_interval: Option<Duration>) -> Self {
    self.frame_interval = frame_interval;
    self
  }
}

struct Progress {
  counter: LabelCounter,
  fps: FpsMeter,
  processed: usize,
  dropped: usize,
}

impl Progress {
  fn new() -> Self {
    Progress {
      counter: LabelCounter::default(),
      fps: FpsMeter::default(),
      processed: 0,
      dropped: 0,
    }
  }

  fn handle<O, RE>(&mut self, frame: &Frame, outcome: FrameOutcome, output: &O) -> Result<(), RE>
  where
    O: Render<Frame, DetectResult, Error = RE>,
  {
    let FrameReport {
      result,
      inference_time,
      degraded,
      ..
    } = match outcome {
      FrameOutcome::Processed(report) => report,
      FrameOutcome::Dropped(_) => {
        self.dropped += 1;
        return Ok(());
      }
    };

    self.processed += 1;
    self.fps.tick(Instant::now(), inference_time);
    self.counter.update(result.iter());
    info!(
      "第 {} 帧: {} 个目标 [{}] | FPS: {:.1} | 推理: {} ms{}",
      frame.index,
      result.len(),
      summarize(&self.counter),
      self.fps.fps(),
      self.fps.last_inference().as_millis(),
      if degraded { " | 降级" } else { "" }
    );
    output.render_result(frame, &result)
  }
}

impl<E, RE, I, O> Task<I, Arc<Pipeline<E>>, O> for ContinuousTask
where
  E: InferenceEngine + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Frame>,
  O: Render<Frame, DetectResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, pipeline: Arc<Pipeline<E>>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (stop_tx, stop_rx) = mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = stop_tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    // 后台线程把结果交回当前线程渲染
    let (result_tx, result_rx) = mpsc::channel::<(Frame, FrameOutcome)>();
    let worker = pipeline.spawn_worker(move |frame, outcome| {
      let _ = result_tx.send((frame.clone(), outcome));
    })?;

    let mut progress = Progress::new();
    let mut submitted = 0;
    for frame in input {
      submitted += 1;
      if !worker.submit(frame) {
        progress.dropped += 1;
      }

      while let Ok((frame, outcome)) = result_rx.try_recv() {
        progress.handle(&frame, outcome, &output)?;
      }

      if self.frame_number.is_some_and(|n| submitted >= n) {
        info!("达到指定帧数 {}, 退出任务循环", submitted);
        break;
      }
      if stop_rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if let Some(interval) = self.frame_interval {
        thread::sleep(interval);
      }
    }

    worker.shutdown()?;
    for (frame, outcome) in result_rx.try_iter() {
      progress.handle(&frame, outcome, &output)?;
    }

    info!(
      "任务完成，处理 {} 帧，丢弃 {} 帧，降级: {}",
      progress.processed,
      progress.dropped,
      pipeline.is_degraded()
    );
    Ok(())
  }
}
