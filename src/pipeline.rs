// 该文件是 Kanjian （看见） 项目的一部分。
// src/pipeline.rs - 模型快照与帧处理流水线
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
  sync::{
    Arc, Mutex, PoisonError, RwLock,
    atomic::{AtomicBool, AtomicUsize, Ordering},
    mpsc::{self, SyncSender, TrySendError},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  config::{ConfigError, DetectConfig},
  frame::{Frame, InputSpec, preprocess},
  mapper::SourceSpace,
  model::{
    Classification, DecodeContext, DecoderKind, DetectResult, InferenceEngine, LabelTable,
    ModelMetadata, classify, decode,
  },
};

/// 连续失败达到该次数后进入降级状态
pub const DEGRADED_FAILURE_COUNT: usize = 3;

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("配置无效: {0}")]
  InvalidConfig(#[from] ConfigError),
  #[error("无法启动后台推理线程: {0}")]
  WorkerSpawn(std::io::Error),
  #[error("后台推理线程异常退出")]
  WorkerPanicked,
}

/// 已加载的模型，安装后只读
#[derive(Debug)]
pub struct LoadedModel<E> {
  pub engine: E,
  pub metadata: ModelMetadata,
  pub labels: LabelTable,
  pub classification: Classification,
  pub input_spec: InputSpec,
}

/// 一帧开始时捕获的只读快照；模型或阈值变化时整体替换
#[derive(Debug)]
pub struct Snapshot<E> {
  pub version: u64,
  pub config: DetectConfig,
  pub model: Option<Arc<LoadedModel<E>>>,
}

/// 保存当前快照。读取方拿到 `Arc` 后不受后续替换影响。
#[derive(Debug)]
pub struct SnapshotStore<E> {
  current: RwLock<Arc<Snapshot<E>>>,
  load_lock: Mutex<()>,
}

impl<E: InferenceEngine> SnapshotStore<E> {
  pub fn new(config: DetectConfig) -> Self {
    SnapshotStore {
      current: RwLock::new(Arc::new(Snapshot {
        version: 0,
        config,
        model: None,
      })),
      load_lock: Mutex::new(()),
    }
  }

  pub fn snapshot(&self) -> Arc<Snapshot<E>> {
    self
      .current
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  fn publish(&self, build: impl FnOnce(&Snapshot<E>) -> Snapshot<E>) -> u64 {
    let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
    let next = build(&current);
    let version = next.version;
    *current = Arc::new(next);
    version
  }

  /// 安装模型并发布新快照，返回新版本号。
  ///
  /// `hint` 用于补齐引擎元数据中缺失的类型与名称（如来自模型目录）。
  pub fn install_model(&self, engine: E, labels: LabelTable, hint: Option<&ModelMetadata>) -> u64 {
    let _loading = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);

    let mut metadata = engine.metadata().clone();
    if let Some(hint) = hint {
      if metadata.declared_type.trim().is_empty() {
        metadata.declared_type = hint.declared_type.clone();
      }
      if metadata.declared_name.trim().is_empty() {
        metadata.declared_name = hint.declared_name.clone();
      }
    }

    let classification = classify(&metadata);
    let input_spec = InputSpec::from_metadata(&metadata);
    if classification.kind == DecoderKind::FixedSlot && !input_spec.is_square() {
      warn!(
        "定槽解码假定正方形输入，当前输入为 {}x{}，将按边长 {} 还原坐标",
        input_spec.width,
        input_spec.height,
        input_spec.square_size()
      );
    }

    info!(
      "安装模型 '{}': {:?} / {:?}（依据 {:?}），输入 {}x{} {:?} {:?}，标签 {} 个",
      metadata.declared_name,
      classification.family,
      classification.kind,
      classification.evidence,
      input_spec.width,
      input_spec.height,
      input_spec.layout,
      input_spec.dtype,
      labels.len()
    );

    let model = Arc::new(LoadedModel {
      engine,
      metadata,
      labels,
      classification,
      input_spec,
    });

    self.publish(|old| Snapshot {
      version: old.version + 1,
      config: old.config,
      model: Some(model),
    })
  }

  pub fn update_config(&self, config: DetectConfig) -> Result<u64, ConfigError> {
    let config = config.validate()?;
    let version = self.publish(|old| Snapshot {
      version: old.version + 1,
      config,
      model: old.model.clone(),
    });
    debug!("更新检测配置 (版本 {}): {:?}", version, config);
    Ok(version)
  }
}

/// 帧被丢弃的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
  /// 上一帧仍在处理
  InFlight,
  /// 距上一帧开始不足最小间隔
  Throttled,
}

/// 同一时间只允许一帧在处理，并限制处理频率。多余的帧直接丢弃，不排队。
#[derive(Debug, Default)]
pub struct FrameGate {
  busy: AtomicBool,
  last_start: Mutex<Option<Instant>>,
}

/// 离开作用域时释放处理权
#[derive(Debug)]
pub struct FrameGuard<'a> {
  gate: &'a FrameGate,
}

impl Drop for FrameGuard<'_> {
  fn drop(&mut self) {
    self.gate.busy.store(false, Ordering::Release);
  }
}

impl FrameGate {
  pub fn try_enter(&self, min_interval: Duration) -> Result<FrameGuard<'_>, DropReason> {
    if self
      .busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return Err(DropReason::InFlight);
    }
    let guard = FrameGuard { gate: self };

    let now = Instant::now();
    let mut last_start = self.last_start.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(previous) = *last_start
      && now.duration_since(previous) < min_interval
    {
      return Err(DropReason::Throttled);
    }
    *last_start = Some(now);
    Ok(guard)
  }

  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::Acquire)
  }
}

/// 一帧处理完成后的报告
#[derive(Debug, Clone)]
pub struct FrameReport {
  pub frame_index: usize,
  /// 处理时使用的快照版本
  pub version: u64,
  pub result: DetectResult,
  pub inference_time: Duration,
  /// 推理引擎连续失败，结果不可信
  pub degraded: bool,
}

#[derive(Debug, Clone)]
pub enum FrameOutcome {
  Dropped(DropReason),
  Processed(FrameReport),
}

impl FrameOutcome {
  pub fn report(&self) -> Option<&FrameReport> {
    match self {
      FrameOutcome::Processed(report) => Some(report),
      FrameOutcome::Dropped(_) => None,
    }
  }

  pub fn is_dropped(&self) -> bool {
    matches!(self, FrameOutcome::Dropped(_))
  }
}

pub struct Pipeline<E> {
  store: SnapshotStore<E>,
  gate: FrameGate,
  failures: AtomicUsize,
}

impl<E: InferenceEngine> Pipeline<E> {
  pub fn new(config: DetectConfig) -> Result<Self, PipelineError> {
    Ok(Pipeline {
      store: SnapshotStore::new(config.validate()?),
      gate: FrameGate::default(),
      failures: AtomicUsize::new(0),
    })
  }

  pub fn store(&self) -> &SnapshotStore<E> {
    &self.store
  }

  pub fn gate(&self) -> &FrameGate {
    &self.gate
  }

  pub fn snapshot(&self) -> Arc<Snapshot<E>> {
    self.store.snapshot()
  }

  pub fn install_model(&self, engine: E, labels: LabelTable, hint: Option<&ModelMetadata>) -> u64 {
    let version = self.store.install_model(engine, labels, hint);
    self.failures.store(0, Ordering::Release);
    version
  }

  pub fn update_config(&self, config: DetectConfig) -> Result<u64, PipelineError> {
    Ok(self.store.update_config(config)?)
  }

  pub fn is_degraded(&self) -> bool {
    self.failures.load(Ordering::Acquire) >= DEGRADED_FAILURE_COUNT
  }

  /// 同步处理一帧。忙碌或过早到达的帧被丢弃；引擎出错时返回空结果。
  pub fn process_frame(&self, frame: &Frame) -> FrameOutcome {
    let snapshot = self.store.snapshot();
    let _guard = match self.gate.try_enter(snapshot.config.min_frame_interval) {
      Ok(guard) => guard,
      Err(reason) => {
        debug!("丢弃第 {} 帧: {:?}", frame.index, reason);
        return FrameOutcome::Dropped(reason);
      }
    };

    let (bitmap_w, bitmap_h) = frame.size();
    let Some(model) = snapshot.model.as_ref() else {
      debug!("尚未安装模型，第 {} 帧无检测结果", frame.index);
      return FrameOutcome::Processed(FrameReport {
        frame_index: frame.index,
        version: snapshot.version,
        result: DetectResult::empty(SourceSpace::Bitmap {
          width: bitmap_w,
          height: bitmap_h,
        }),
        inference_time: Duration::ZERO,
        degraded: self.is_degraded(),
      });
    };

    let spec = &model.input_spec;
    let ctx = DecodeContext {
      labels: &model.labels,
      config: &snapshot.config,
      model_input: (spec.width as f32, spec.height as f32),
      bitmap: (bitmap_w, bitmap_h),
    };

    let tensor = preprocess(&frame.image, spec);
    let start = Instant::now();
    let outputs = model.engine.run(&tensor);
    let inference_time = start.elapsed();

    let result = match outputs {
      Ok(outputs) => {
        self.failures.store(0, Ordering::Release);
        decode(model.classification.kind, &outputs, &ctx)
      }
      Err(e) => {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        error!("第 {} 帧推理失败 (连续 {} 次): {}", frame.index, failures, e);
        if failures == DEGRADED_FAILURE_COUNT {
          warn!("推理引擎连续失败 {} 次，进入降级状态", failures);
        }
        DetectResult::empty(SourceSpace::ModelInput {
          size: ctx.input_size(),
        })
      }
    };

    debug!(
      "第 {} 帧: {} 个检测，推理耗时 {:.2?}",
      frame.index,
      result.len(),
      inference_time
    );

    FrameOutcome::Processed(FrameReport {
      frame_index: frame.index,
      version: snapshot.version,
      result,
      inference_time,
      degraded: self.is_degraded(),
    })
  }
}

/// 后台推理线程句柄
pub struct WorkerHandle {
  sender: SyncSender<Frame>,
  join: JoinHandle<()>,
}

impl WorkerHandle {
  /// 提交一帧；线程未在等待（忙碌或尚未就绪）时直接丢弃并返回 `false`
  pub fn submit(&self, frame: Frame) -> bool {
    match self.sender.try_send(frame) {
      Ok(()) => true,
      Err(TrySendError::Full(frame)) => {
        debug!("后台线程忙碌，丢弃第 {} 帧", frame.index);
        false
      }
      Err(TrySendError::Disconnected(frame)) => {
        warn!("后台线程已退出，丢弃第 {} 帧", frame.index);
        false
      }
    }
  }

  /// 关闭通道并等待线程处理完已提交的帧
  pub fn shutdown(self) -> Result<(), PipelineError> {
    drop(self.sender);
    self.join.join().map_err(|_| PipelineError::WorkerPanicked)
  }
}

impl<E: InferenceEngine + 'static> Pipeline<E> {
  /// 启动后台推理线程。通道容量为 0：只有线程空闲等待时提交才会成功，
  /// 推理进行中到达的帧直接丢弃，不排队。
  pub fn spawn_worker<F>(self: &Arc<Self>, mut on_outcome: F) -> Result<WorkerHandle, PipelineError>
  where
    F: FnMut(&Frame, FrameOutcome) + Send + 'static,
  {
    let (sender, receiver) = mpsc::sync_channel::<Frame>(0);
    let pipeline = Arc::clone(self);
    let join = thread::Builder::new()
      .name("kanjian-infer".to_string())
      .spawn(move || {
        info!("后台推理线程启动");
        for frame in receiver {
          let outcome = pipeline.process_frame(&frame);
          on_outcome(&frame, outcome);
        }
        info!("后台推理线程退出");
      })
      .map_err(PipelineError::WorkerSpawn)?;

    Ok(WorkerHandle { sender, join })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::{InputTensor, TensorType},
    model::{OutputTensor, RecordedEngine, RecordedEngineError, Recording},
  };
  use image::RgbImage;

  #[derive(Debug, Error)]
  #[error("mock engine failure")]
  struct MockError;

  struct FailingEngine {
    metadata: ModelMetadata,
  }

  impl InferenceEngine for FailingEngine {
    type Error = MockError;

    fn metadata(&self) -> &ModelMetadata {
      &self.metadata
    }

    fn run(&self, _input: &InputTensor) -> Result<Box<[OutputTensor]>, Self::Error> {
      Err(MockError)
    }
  }

  /// 推理耗时固定，并记录收到的输入类型
  struct SlowEngine {
    inner: RecordedEngine,
    delay: Duration,
    seen: Mutex<Vec<TensorType>>,
  }

  impl SlowEngine {
    fn new(inner: RecordedEngine, delay: Duration) -> Self {
      SlowEngine {
        inner,
        delay,
        seen: Mutex::new(Vec::new()),
      }
    }
  }

  impl InferenceEngine for SlowEngine {
    type Error = RecordedEngineError;

    fn metadata(&self) -> &ModelMetadata {
      self.inner.metadata()
    }

    fn run(&self, input: &InputTensor) -> Result<Box<[OutputTensor]>, Self::Error> {
      self.seen.lock().unwrap().push(input.dtype());
      thread::sleep(self.delay);
      self.inner.run(input)
    }
  }

  // 通道容量为 0，线程刚处理完一帧时可能尚未回到等待状态
  fn submit_when_idle(worker: &WorkerHandle, index: usize) {
    for _ in 0..500 {
      if worker.submit(frame(index)) {
        return;
      }
      thread::sleep(Duration::from_millis(10));
    }
    panic!("worker never became idle");
  }

  fn ssd_engine(name: &str, score: f32) -> RecordedEngine {
    RecordedEngine::new(Recording {
      metadata: ModelMetadata {
        declared_type: "ssd".to_string(),
        declared_name: name.to_string(),
        input_shape: vec![1, 300, 300, 3],
        ..ModelMetadata::default()
      },
      outputs: vec![
        OutputTensor::new(vec![1, 1, 4], vec![0.0, 0.0, 0.5, 0.5]),
        OutputTensor::new(vec![1, 1], vec![0.0]),
        OutputTensor::new(vec![1, 1], vec![score]),
        OutputTensor::new(vec![1], vec![1.0]),
      ],
    })
  }

  fn frame(index: usize) -> Frame {
    Frame::new(index, RgbImage::new(64, 48))
  }

  fn unthrottled() -> DetectConfig {
    DetectConfig::default().with_min_frame_interval(Duration::ZERO)
  }

  #[test]
  fn no_model_yields_empty_result() {
    let pipeline: Pipeline<RecordedEngine> = Pipeline::new(unthrottled()).unwrap();
    let outcome = pipeline.process_frame(&frame(1));
    let report = outcome.report().unwrap();
    assert!(report.result.is_empty());
    assert_eq!(report.version, 0);
  }

  #[test]
  fn decodes_with_installed_model() {
    let pipeline = Pipeline::new(unthrottled()).unwrap();
    let labels: LabelTable = ["person"].into_iter().collect();
    let version = pipeline.install_model(ssd_engine("a", 0.9), labels, None);
    assert_eq!(version, 1);

    let outcome = pipeline.process_frame(&frame(1));
    let report = outcome.report().unwrap();
    assert_eq!(report.result.len(), 1);
    assert_eq!(report.result.items[0].label, "person");
    assert_eq!(report.result.space, SourceSpace::ModelInput { size: 300.0 });
    assert!(!report.degraded);
  }

  #[test]
  fn frame_is_dropped_while_another_is_in_flight() {
    let pipeline: Pipeline<RecordedEngine> = Pipeline::new(unthrottled()).unwrap();
    let guard = pipeline.gate().try_enter(Duration::ZERO).unwrap();
    assert!(pipeline.gate().is_busy());
    let outcome = pipeline.process_frame(&frame(1));
    assert!(matches!(outcome, FrameOutcome::Dropped(DropReason::InFlight)));
    drop(guard);
    assert!(!pipeline.process_frame(&frame(2)).is_dropped());
  }

  #[test]
  fn frames_inside_min_interval_are_throttled() {
    let config = DetectConfig::default().with_min_frame_interval(Duration::from_secs(3600));
    let pipeline: Pipeline<RecordedEngine> = Pipeline::new(config).unwrap();
    assert!(!pipeline.process_frame(&frame(1)).is_dropped());
    assert!(matches!(
      pipeline.process_frame(&frame(2)),
      FrameOutcome::Dropped(DropReason::Throttled)
    ));
    // 被节流的帧不占用处理权
    assert!(!pipeline.gate().is_busy());
  }

  #[test]
  fn degraded_after_three_consecutive_failures() {
    let pipeline = Pipeline::new(unthrottled()).unwrap();
    let engine = FailingEngine {
      metadata: ModelMetadata {
        output_shapes: vec![vec![1, 84, 8400]],
        ..ModelMetadata::default()
      },
    };
    pipeline.install_model(engine, LabelTable::default(), None);

    for i in 1..DEGRADED_FAILURE_COUNT {
      let outcome = pipeline.process_frame(&frame(i));
      let report = outcome.report().unwrap();
      assert!(report.result.is_empty());
      assert!(!report.degraded);
    }
    let outcome = pipeline.process_frame(&frame(DEGRADED_FAILURE_COUNT));
    assert!(outcome.report().unwrap().degraded);
    assert!(pipeline.is_degraded());
  }

  #[test]
  fn in_flight_snapshot_survives_model_swap() {
    let pipeline = Pipeline::new(unthrottled()).unwrap();
    pipeline.install_model(ssd_engine("first", 0.9), LabelTable::default(), None);
    let held = pipeline.snapshot();

    let version = pipeline.install_model(ssd_engine("second", 0.6), LabelTable::default(), None);
    assert_eq!(version, 2);
    assert_eq!(held.version, 1);
    assert_eq!(held.model.as_ref().unwrap().metadata.declared_name, "first");

    let report = pipeline.process_frame(&frame(1));
    let report = report.report().unwrap();
    assert_eq!(report.version, 2);
    assert!((report.result.items[0].confidence - 0.6).abs() < 1e-6);
  }

  #[test]
  fn config_update_publishes_new_version() {
    let pipeline = Pipeline::new(unthrottled()).unwrap();
    pipeline.install_model(ssd_engine("a", 0.6), LabelTable::default(), None);
    let version = pipeline
      .update_config(unthrottled().with_confidence_threshold(0.7))
      .unwrap();
    assert_eq!(version, 2);
    let outcome = pipeline.process_frame(&frame(1));
    assert!(outcome.report().unwrap().result.is_empty());

    assert!(pipeline
      .update_config(DetectConfig::default().with_confidence_threshold(1.5))
      .is_err());
    assert_eq!(pipeline.snapshot().version, 2);
  }

  #[test]
  fn hint_fills_missing_metadata() {
    let pipeline = Pipeline::new(unthrottled()).unwrap();
    let engine = RecordedEngine::new(Recording {
      metadata: ModelMetadata::default(),
      outputs: vec![OutputTensor::new(vec![1, 5, 8400], vec![0.0; 5 * 8400])],
    });
    let hint = ModelMetadata {
      declared_type: "grocery".to_string(),
      declared_name: "Grocery".to_string(),
      ..ModelMetadata::default()
    };
    pipeline.install_model(engine, LabelTable::default(), Some(&hint));
    let snapshot = pipeline.snapshot();
    let model = snapshot.model.as_ref().unwrap();
    assert_eq!(model.classification.kind, DecoderKind::SpecializedFixed5);
    assert_eq!(model.metadata.declared_name, "Grocery");
  }

  #[test]
  fn worker_processes_submitted_frames() {
    let pipeline = Arc::new(Pipeline::new(unthrottled()).unwrap());
    pipeline.install_model(ssd_engine("a", 0.9), LabelTable::default(), None);

    let (tx, rx) = mpsc::channel();
    let worker = pipeline
      .spawn_worker(move |frame, outcome| {
        let _ = tx.send((frame.index, outcome.report().map(|r| r.result.len())));
      })
      .unwrap();

    // 逐帧等待结果，保证线程空闲
    for i in 0..3 {
      submit_when_idle(&worker, i);
      let (index, count) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
      assert_eq!(index, i);
      assert_eq!(count, Some(1));
    }
    worker.shutdown().unwrap();
  }

  #[test]
  fn worker_drops_frames_arriving_during_inference() {
    let pipeline = Arc::new(Pipeline::new(unthrottled()).unwrap());
    pipeline.install_model(
      SlowEngine::new(ssd_engine("slow", 0.9), Duration::from_millis(300)),
      LabelTable::default(),
      None,
    );

    let (tx, rx) = mpsc::channel();
    let worker = pipeline
      .spawn_worker(move |frame, _| {
        let _ = tx.send(frame.index);
      })
      .unwrap();

    submit_when_idle(&worker, 0);
    thread::sleep(Duration::from_millis(100));
    assert!(!worker.submit(frame(1)));
    worker.shutdown().unwrap();

    let processed: Vec<usize> = rx.try_iter().collect();
    assert_eq!(processed, vec![0]);
  }

  #[test]
  fn float_model_receives_float_tensor() {
    let recording: Recording = serde_json::from_str(
      r#"{
        "metadata": { "type": "ssd", "input_shape": [1, 300, 300, 3], "input_dtype": "float32" },
        "outputs": [
          { "shape": [1, 1, 4], "data": [0.0, 0.0, 0.5, 0.5] },
          { "shape": [1, 1], "data": [0.0] },
          { "shape": [1, 1], "data": [0.9] },
          { "shape": [1], "data": [1.0] }
        ]
      }"#,
    )
    .unwrap();
    let engine = SlowEngine::new(RecordedEngine::new(recording), Duration::ZERO);

    let pipeline = Pipeline::new(unthrottled()).unwrap();
    pipeline.install_model(engine, LabelTable::default(), None);
    let snapshot = pipeline.snapshot();
    let model = snapshot.model.as_ref().unwrap();
    assert_eq!(model.input_spec.dtype, TensorType::Float32);

    let outcome = pipeline.process_frame(&frame(1));
    assert_eq!(outcome.report().unwrap().result.len(), 1);
    assert_eq!(*model.engine.seen.lock().unwrap(), vec![TensorType::Float32]);
  }
}
