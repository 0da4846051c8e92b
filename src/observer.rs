// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/observer.rs - 任务进度上报
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

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

/// 单张图像的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
  /// 输出已存在
  Skipped,
  /// 没有可处理的区域，不写输出
  NoOp,
  Done { regions: usize, detections: usize },
  Failed { reason: String },
}

/// 一次批处理的统计
#[derive(Debug, Clone)]
pub struct RunSummary {
  pub total: usize,
  pub done: usize,
  pub skipped: usize,
  pub noop: usize,
  pub failed: usize,
  pub detections: usize,
  /// 因停止信号提前结束
  pub interrupted: bool,
  pub started_at: DateTime<Local>,
  pub finished_at: Option<DateTime<Local>>,
  pub elapsed: Duration,
  clock: Instant,
}

impl RunSummary {
  pub fn start(total: usize) -> Self {
    Self {
      total,
      done: 0,
      skipped: 0,
      noop: 0,
      failed: 0,
      detections: 0,
      interrupted: false,
      started_at: Local::now(),
      finished_at: None,
      elapsed: Duration::ZERO,
      clock: Instant::now(),
    }
  }

  pub fn record(&mut self, outcome: &ImageOutcome) {
    match outcome {
      ImageOutcome::Skipped => self.skipped += 1,
      ImageOutcome::NoOp => self.noop += 1,
      ImageOutcome::Done { detections, .. } => {
        self.done += 1;
        self.detections += detections;
      }
      ImageOutcome::Failed { .. } => self.failed += 1,
    }
  }

  pub fn processed(&self) -> usize {
    self.done + self.skipped + self.noop + self.failed
  }

  pub fn finish(&mut self) {
    self.finished_at = Some(Local::now());
    self.elapsed = self.clock.elapsed();
  }

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::json!({
      "total": self.total,
      "done": self.done,
      "skipped": self.skipped,
      "noop": self.noop,
      "failed": self.failed,
      "detections": self.detections,
      "interrupted": self.interrupted,
      "started_at": self.started_at.to_rfc3339(),
      "finished_at": self.finished_at.map(|t| t.to_rfc3339()),
      "elapsed_secs": self.elapsed.as_secs_f64(),
    })
  }
}

/// 任务进度的接收方
///
/// 编排逻辑只通过它报告进度与警告，不直接依赖全局日志配置。
pub trait Observer {
  fn on_start(&self, _total: usize) {}
  fn on_image(&self, index: usize, total: usize, name: &str, outcome: &ImageOutcome);
  fn on_warning(&self, message: &str);
  fn on_finish(&self, _summary: &RunSummary) {}
}

impl<T: Observer + ?Sized> Observer for &T {
  fn on_start(&self, total: usize) {
    (**self).on_start(total)
  }

  fn on_image(&self, index: usize, total: usize, name: &str, outcome: &ImageOutcome) {
    (**self).on_image(index, total, name, outcome)
  }

  fn on_warning(&self, message: &str) {
    (**self).on_warning(message)
  }

  fn on_finish(&self, summary: &RunSummary) {
    (**self).on_finish(summary)
  }
}

/// 输出到 `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
  fn on_start(&self, total: usize) {
    info!("开始处理, 共 {} 个文件", total);
  }

  fn on_image(&self, index: usize, total: usize, name: &str, outcome: &ImageOutcome) {
    match outcome {
      ImageOutcome::Skipped => debug!("跳过 {}: 输出已存在", name),
      ImageOutcome::NoOp => {}
      ImageOutcome::Done {
        regions,
        detections,
      } => info!("处理完成 {}: {} 个区域, {} 个检测结果", name, regions, detections),
      ImageOutcome::Failed { reason } => error!("处理失败 {}: {}", name, reason),
    }
    info!("已处理 {}/{} 个文件", index, total);
  }

  fn on_warning(&self, message: &str) {
    warn!("{}", message);
  }

  fn on_finish(&self, summary: &RunSummary) {
    if summary.interrupted {
      warn!("任务被中断, 已处理 {}/{}", summary.processed(), summary.total);
    }
    info!(
      "完成 {}, 跳过 {}, 无目标 {}, 失败 {}, 共 {} 个检测结果",
      summary.done, summary.skipped, summary.noop, summary.failed, summary.detections
    );
    info!("开始时间: {}", summary.started_at.format("%H:%M:%S"));
    if let Some(finished_at) = summary.finished_at {
      info!("结束时间: {}", finished_at.format("%H:%M:%S"));
    }
    info!("推理耗时: {:.2?}", summary.elapsed);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn summary_counts_outcomes() {
    let mut summary = RunSummary::start(5);
    for outcome in [
      ImageOutcome::Skipped,
      ImageOutcome::NoOp,
      ImageOutcome::Done {
        regions: 2,
        detections: 3,
      },
      ImageOutcome::Done {
        regions: 1,
        detections: 0,
      },
      ImageOutcome::Failed {
        reason: "boom".into(),
      },
    ] {
      summary.record(&outcome);
    }
    summary.finish();

    assert_eq!(summary.done, 2);
    assert_eq!(summary.detections, 3);
    assert_eq!(summary.processed(), 5);
    let json = summary.to_json();
    assert_eq!(json["failed"], 1);
    assert!(json["finished_at"].is_string());
  }
}
