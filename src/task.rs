// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/task.rs - 精修与粗检测任务
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
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::Duration,
};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  crop::{Crop, extract},
  input::{ImageFileError, ImageJob, LabelJob, LabelRecordError, load_image, read_label_record_where},
  model::{DEFAULT_CLASSES, DetectParams, Detection, Detector},
  observer::{ImageOutcome, Observer, RunSummary, TracingObserver},
  output::Render,
  reproject::reproject,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum RefineError {
  #[error("文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("图像加载错误: {0}")]
  Image(ImageFileError),
  #[error("标注记录错误: {0}")]
  LabelRecord(LabelRecordError),
  #[error("检测器错误: {0}")]
  Detector(#[source] BoxError),
  #[error("检测结果数量不匹配: 期望 {expected}, 实际 {actual}")]
  BatchMismatch { expected: usize, actual: usize },
  #[error("结果写入错误: {0}")]
  Output(#[source] BoxError),
}

impl RefineError {
  /// 只影响当前图像的错误，批处理继续
  pub fn is_image_local(&self) -> bool {
    matches!(
      self,
      RefineError::NotFound(_) | RefineError::Image(_) | RefineError::LabelRecord(_)
    )
  }

  pub fn is_detector(&self) -> bool {
    matches!(
      self,
      RefineError::Detector(_) | RefineError::BatchMismatch { .. }
    )
  }

  fn image(path: &Path, err: ImageFileError) -> Self {
    match err {
      ImageFileError::NotFound(_) => RefineError::NotFound(path.to_path_buf()),
      other => RefineError::Image(other),
    }
  }

  fn label(path: &Path, err: LabelRecordError) -> Self {
    match err {
      LabelRecordError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
        RefineError::NotFound(path.to_path_buf())
      }
      other => RefineError::LabelRecord(other),
    }
  }
}

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 精修检测结果映射回原图时使用的参考框
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReprojectFrame {
  /// 实际裁切的像素区域，已计入取整与边界裁剪
  #[default]
  Window,
  /// 原始粗检测框
  Source,
}

impl ReprojectFrame {
  fn of(self, crop: &Crop) -> Detection {
    match self {
      ReprojectFrame::Window => crop.frame(),
      ReprojectFrame::Source => crop.source,
    }
  }
}

/// 检测器调用的重试策略，每次重试前的等待时间翻倍
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub attempts: u32,
  pub backoff: Duration,
}

impl RetryPolicy {
  pub fn none() -> Self {
    Self {
      attempts: 1,
      backoff: Duration::ZERO,
    }
  }

  pub fn new(attempts: u32, backoff: Duration) -> Self {
    Self {
      attempts: attempts.max(1),
      backoff,
    }
  }

  /// 第 `failures` 次失败后的等待时间，溢出时取 `Duration::MAX`
  pub fn backoff_after(&self, failures: u32) -> Duration {
    if self.backoff.is_zero() {
      return Duration::ZERO;
    }
    2u32
      .checked_pow(failures.saturating_sub(1))
      .map_or(Duration::MAX, |factor| self.backoff.saturating_mul(factor))
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::none()
  }
}

#[derive(Debug, Clone)]
pub struct RefineConfig {
  /// 参与精修的粗检测类别
  pub allowed_classes: Vec<u32>,
  pub params: DetectParams,
  pub frame: ReprojectFrame,
  /// 检测器失败时只记录当前图像失败，不中断批处理
  pub isolate_failures: bool,
  pub retry: RetryPolicy,
}

impl Default for RefineConfig {
  fn default() -> Self {
    Self {
      allowed_classes: DEFAULT_CLASSES.to_vec(),
      params: DetectParams::refine(),
      frame: ReprojectFrame::default(),
      isolate_failures: true,
      retry: RetryPolicy::none(),
    }
  }
}

impl RefineConfig {
  pub fn with_allowed_classes(mut self, classes: Vec<u32>) -> Self {
    self.allowed_classes = classes;
    self
  }

  pub fn with_params(mut self, params: DetectParams) -> Self {
    self.params = params;
    self
  }

  pub fn with_frame(mut self, frame: ReprojectFrame) -> Self {
    self.frame = frame;
    self
  }

  pub fn with_isolate_failures(mut self, isolate: bool) -> Self {
    self.isolate_failures = isolate;
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }
}

/// 注册 Ctrl-C 处理：第一次置位停止标志，30 秒后仍未退出则强制结束进程
pub fn stop_on_ctrlc() -> Result<Arc<AtomicBool>, ctrlc::Error> {
  let stop = Arc::new(AtomicBool::new(false));
  let flag = stop.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，处理完当前图像后退出...");
    flag.store(true, Ordering::SeqCst);
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(stop)
}

/// 调用检测器，失败时按策略重试
fn detect_with_retry<M: Detector, B: Observer>(
  model: &M,
  images: &[RgbImage],
  params: &DetectParams,
  retry: RetryPolicy,
  observer: &B,
) -> Result<Vec<Vec<Detection>>, RefineError> {
  let mut attempt = 1;
  loop {
    match model.detect(images, params) {
      Ok(result) if result.len() == images.len() => return Ok(result),
      Ok(result) => {
        return Err(RefineError::BatchMismatch {
          expected: images.len(),
          actual: result.len(),
        });
      }
      Err(e) if attempt < retry.attempts => {
        let backoff = retry.backoff_after(attempt);
        observer.on_warning(&format!(
          "检测器调用失败 (第 {}/{} 次): {}, {:.2?} 后重试",
          attempt, retry.attempts, e, backoff
        ));
        thread::sleep(backoff);
        attempt += 1;
      }
      Err(e) => return Err(RefineError::Detector(Box::new(e))),
    }
  }
}

/// 逐个处理任务并汇总，图像级错误记为失败后继续
fn run_jobs<J, B, F>(
  jobs: Vec<J>,
  name: impl Fn(&J) -> &str,
  observer: &B,
  stop: Option<&AtomicBool>,
  isolate_failures: bool,
  mut process: F,
) -> Result<RunSummary, RefineError>
where
  B: Observer,
  F: FnMut(&J) -> Result<ImageOutcome, RefineError>,
{
  let total = jobs.len();
  let mut summary = RunSummary::start(total);
  observer.on_start(total);

  for (idx, job) in jobs.iter().enumerate() {
    if stop.is_some_and(|s| s.load(Ordering::SeqCst)) {
      observer.on_warning("收到停止信号, 退出任务循环");
      summary.interrupted = true;
      break;
    }

    let outcome = match process(job) {
      Ok(outcome) => outcome,
      Err(e) if e.is_image_local() || (isolate_failures && e.is_detector()) => {
        ImageOutcome::Failed {
          reason: e.to_string(),
        }
      }
      Err(e) => return Err(e),
    };
    summary.record(&outcome);
    observer.on_image(idx + 1, total, name(job), &outcome);
  }

  summary.finish();
  observer.on_finish(&summary);
  Ok(summary)
}

/// 裁切精修任务
///
/// 对每张图像：已有输出则跳过；读取粗检测记录并按类别过滤；按检测框裁切；
/// 整批送入检测器；把每个裁切内的检测结果映射回原图；写出合并后的记录。
pub struct RefineTask<B = TracingObserver> {
  config: RefineConfig,
  observer: B,
  stop: Option<Arc<AtomicBool>>,
}

impl Default for RefineTask {
  fn default() -> Self {
    Self::new(RefineConfig::default())
  }
}

impl RefineTask {
  pub fn new(config: RefineConfig) -> Self {
    Self {
      config,
      observer: TracingObserver,
      stop: None,
    }
  }
}

impl<B: Observer> RefineTask<B> {
  pub fn with_observer<B2: Observer>(self, observer: B2) -> RefineTask<B2> {
    RefineTask {
      config: self.config,
      observer,
      stop: self.stop,
    }
  }

  /// 每张图像开始前检查该标志，置位后结束任务
  pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  /// 处理单张图像
  pub fn refine_image<M, O>(
    &self,
    job: &LabelJob,
    model: &M,
    output: &O,
  ) -> Result<ImageOutcome, RefineError>
  where
    M: Detector,
    O: Render,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    if output.is_rendered(&job.output_path) {
      return Ok(ImageOutcome::Skipped);
    }

    let allowed = &self.config.allowed_classes;
    let retained = read_label_record_where(&job.label_path, |class_id| allowed.contains(&class_id))
      .map_err(|e| RefineError::label(&job.label_path, e))?;
    if retained.is_empty() {
      self.observer.on_warning(&format!(
        "{} 中没有可用的裁切区域",
        job.label_path.display()
      ));
      return Ok(ImageOutcome::NoOp);
    }

    let image = load_image(&job.image_path).map_err(|e| RefineError::image(&job.image_path, e))?;

    let (frames, crops): (Vec<Detection>, Vec<RgbImage>) = retained
      .iter()
      .filter_map(|det| {
        let crop = extract(&image, det);
        if crop.is_none() {
          debug!("{}: 检测框 {:?} 裁切面积为 0, 已忽略", job.stem, det);
        }
        crop
      })
      .map(|crop| (self.config.frame.of(&crop), crop.image))
      .unzip();
    if crops.is_empty() {
      self.observer.on_warning(&format!(
        "{} 中没有可用的裁切区域",
        job.label_path.display()
      ));
      return Ok(ImageOutcome::NoOp);
    }

    let results = detect_with_retry(
      model,
      &crops,
      &self.config.params,
      self.config.retry,
      &self.observer,
    )?;

    let merged: Vec<Detection> = results
      .iter()
      .zip(&frames)
      .flat_map(|(dets, frame)| dets.iter().map(move |det| reproject(det, frame)))
      .collect();

    output
      .render_result(&job.output_path, &image, &merged)
      .map_err(|e| RefineError::Output(Box::new(e)))?;

    Ok(ImageOutcome::Done {
      regions: crops.len(),
      detections: merged.len(),
    })
  }
}

impl<B, I, M, O> Task<I, M, O> for RefineTask<B>
where
  B: Observer,
  I: IntoIterator<Item = LabelJob>,
  M: Detector,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = RunSummary;
  type Error = RefineError;

  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    run_jobs(
      input.into_iter().collect(),
      |job: &LabelJob| job.stem.as_str(),
      &self.observer,
      self.stop.as_deref(),
      self.config.isolate_failures,
      |job| self.refine_image(job, &model, &output),
    )
  }
}

/// 整图粗检测任务，输出保留检测器给出的类别
pub struct CoarseTask<B = TracingObserver> {
  params: DetectParams,
  isolate_failures: bool,
  retry: RetryPolicy,
  observer: B,
  stop: Option<Arc<AtomicBool>>,
}

impl Default for CoarseTask {
  fn default() -> Self {
    Self::new(DetectParams::coarse())
  }
}

impl CoarseTask {
  pub fn new(params: DetectParams) -> Self {
    Self {
      params,
      isolate_failures: true,
      retry: RetryPolicy::none(),
      observer: TracingObserver,
      stop: None,
    }
  }
}

impl<B: Observer> CoarseTask<B> {
  pub fn with_observer<B2: Observer>(self, observer: B2) -> CoarseTask<B2> {
    CoarseTask {
      params: self.params,
      isolate_failures: self.isolate_failures,
      retry: self.retry,
      observer,
      stop: self.stop,
    }
  }

  pub fn with_isolate_failures(mut self, isolate: bool) -> Self {
    self.isolate_failures = isolate;
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  pub fn detect_image<M, O>(
    &self,
    job: &ImageJob,
    model: &M,
    output: &O,
  ) -> Result<ImageOutcome, RefineError>
  where
    M: Detector,
    O: Render,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    if output.is_rendered(&job.output_path) {
      return Ok(ImageOutcome::Skipped);
    }

    let image = load_image(&job.image_path).map_err(|e| RefineError::image(&job.image_path, e))?;
    let batch = [image];
    let mut results = detect_with_retry(model, &batch, &self.params, self.retry, &self.observer)?;
    let detections = results.pop().unwrap_or_default();
    let [image] = batch;

    output
      .render_result(&job.output_path, &image, &detections)
      .map_err(|e| RefineError::Output(Box::new(e)))?;

    Ok(ImageOutcome::Done {
      regions: 1,
      detections: detections.len(),
    })
  }
}

impl<B, I, M, O> Task<I, M, O> for CoarseTask<B>
where
  B: Observer,
  I: IntoIterator<Item = ImageJob>,
  M: Detector,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = RunSummary;
  type Error = RefineError;

  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    run_jobs(
      input.into_iter().collect(),
      |job: &ImageJob| job.stem.as_str(),
      &self.observer,
      self.stop.as_deref(),
      self.isolate_failures,
      |job| self.detect_image(job, &model, &output),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backoff_doubles_and_saturates() {
    let retry = RetryPolicy::new(5, Duration::from_millis(500));
    assert_eq!(retry.backoff_after(1), Duration::from_millis(500));
    assert_eq!(retry.backoff_after(2), Duration::from_secs(1));
    assert_eq!(retry.backoff_after(3), Duration::from_secs(2));

    let huge = RetryPolicy::new(3, Duration::from_millis(u64::MAX));
    assert_eq!(huge.backoff_after(2), Duration::MAX);
    assert_eq!(huge.backoff_after(40), Duration::MAX);
    assert_eq!(RetryPolicy::none().backoff_after(64), Duration::ZERO);
  }

  #[test]
  fn attempts_are_at_least_one() {
    assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
  }
}
