// 该文件是 Recrop （裁切精修） 项目的一部分。
// tests/common/mod.rs - 集成测试辅助工具
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

#![allow(dead_code)]

use std::{
  cell::{Cell, RefCell},
  path::{Path, PathBuf},
};

use image::RgbImage;
use recrop::{
  model::{DetectParams, Detection, Detector},
  observer::{ImageOutcome, Observer},
};

pub fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
  let path = dir.join(name);
  RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 128]))
    .save(&path)
    .unwrap();
  path
}

pub fn write_label(dir: &Path, name: &str, text: &str) -> PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, text).unwrap();
  path
}

/// 返回预设结果的检测器，记录每次调用的批大小与图像尺寸
pub struct ScriptedDetector {
  per_crop: Vec<Detection>,
  failures_left: Cell<usize>,
  short_by: usize,
  pub calls: Cell<usize>,
  pub batches: RefCell<Vec<Vec<(u32, u32)>>>,
}

impl ScriptedDetector {
  pub fn returning(per_crop: Vec<Detection>) -> Self {
    Self {
      per_crop,
      failures_left: Cell::new(0),
      short_by: 0,
      calls: Cell::new(0),
      batches: RefCell::new(Vec::new()),
    }
  }

  /// 前 `n` 次调用失败
  pub fn failing_first(mut self, n: usize) -> Self {
    self.failures_left = Cell::new(n);
    self
  }

  /// 返回的结果组数比输入图像少 `n` 个
  pub fn short_by(mut self, n: usize) -> Self {
    self.short_by = n;
    self
  }
}

impl Detector for ScriptedDetector {
  type Error = std::io::Error;

  fn detect(
    &self,
    images: &[RgbImage],
    _params: &DetectParams,
  ) -> Result<Vec<Vec<Detection>>, Self::Error> {
    self.calls.set(self.calls.get() + 1);
    self
      .batches
      .borrow_mut()
      .push(images.iter().map(|i| i.dimensions()).collect());

    if self.failures_left.get() > 0 {
      self.failures_left.set(self.failures_left.get() - 1);
      return Err(std::io::Error::other("detector offline"));
    }
    let count = images.len().saturating_sub(self.short_by);
    Ok((0..count).map(|_| self.per_crop.clone()).collect())
  }
}

#[derive(Default)]
pub struct RecordingObserver {
  pub warnings: RefCell<Vec<String>>,
  pub outcomes: RefCell<Vec<(String, ImageOutcome)>>,
}

impl Observer for RecordingObserver {
  fn on_image(&self, _index: usize, _total: usize, name: &str, outcome: &ImageOutcome) {
    self
      .outcomes
      .borrow_mut()
      .push((name.to_string(), outcome.clone()));
  }

  fn on_warning(&self, message: &str) {
    self.warnings.borrow_mut().push(message.to_string());
  }
}
