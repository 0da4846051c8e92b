// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/model.rs - 检测结果与检测器定义
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

use image::RgbImage;

pub mod coco;

#[cfg(feature = "model_ultralytics")]
mod ultralytics;
#[cfg(feature = "model_ultralytics")]
pub use self::ultralytics::{Ultralytics, UltralyticsBuilder, UltralyticsError};

/// 默认参与精修的类别：person, car, motorcycle, bus, truck
pub const DEFAULT_CLASSES: [u32; 5] = [0, 2, 3, 5, 7];

/// 归一化的中心点-宽高检测框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub class_id: u32,
  pub x_center: f32,
  pub y_center: f32,
  pub width: f32,
  pub height: f32,
  pub score: Option<f32>,
}

impl Detection {
  pub fn new(class_id: u32, x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
    Self {
      class_id,
      x_center,
      y_center,
      width,
      height,
      score: None,
    }
  }

  pub fn with_score(mut self, score: f32) -> Self {
    self.score = Some(score);
    self
  }

  /// 坐标均在 [0, 1] 内且宽高为正
  pub fn is_normalized(&self) -> bool {
    let unit = 0.0..=1.0;
    unit.contains(&self.x_center)
      && unit.contains(&self.y_center)
      && unit.contains(&self.width)
      && unit.contains(&self.height)
      && self.width > 0.0
      && self.height > 0.0
  }

  /// [x_min, y_min, x_max, y_max]
  pub fn corners(&self) -> [f32; 4] {
    let (hw, hh) = (self.width / 2.0, self.height / 2.0);
    [
      self.x_center - hw,
      self.y_center - hh,
      self.x_center + hw,
      self.y_center + hh,
    ]
  }
}

/// 检测器推理参数
#[derive(Debug, Clone, PartialEq)]
pub struct DetectParams {
  /// 置信度阈值
  pub confidence: f32,
  /// NMS IoU 阈值
  pub iou: f32,
  /// 仅保留这些类别，`None` 表示不限制
  pub classes: Option<Vec<u32>>,
  /// 推理输入尺寸
  pub target_size: u32,
}

impl DetectParams {
  /// 精修阶段参数：目标已被粗定位，阈值取低以保证召回
  pub fn refine() -> Self {
    Self {
      confidence: 0.01,
      iou: 0.05,
      classes: None,
      target_size: 640,
    }
  }

  /// 整图粗检测参数
  pub fn coarse() -> Self {
    Self {
      confidence: 0.5,
      iou: 0.3,
      classes: Some(DEFAULT_CLASSES.to_vec()),
      target_size: 6400,
    }
  }

  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn with_iou(mut self, iou: f32) -> Self {
    self.iou = iou;
    self
  }

  pub fn with_classes(mut self, classes: Option<Vec<u32>>) -> Self {
    self.classes = classes;
    self
  }

  pub fn with_target_size(mut self, target_size: u32) -> Self {
    self.target_size = target_size;
    self
  }
}

impl Default for DetectParams {
  fn default() -> Self {
    Self::refine()
  }
}

/// 外部检测器
///
/// 对一批图像推理，按输入顺序为每张图像返回一组检测结果，
/// 坐标归一化到该图像自身的尺寸。
pub trait Detector {
  type Error: std::error::Error + Send + Sync + 'static;

  fn detect(
    &self,
    images: &[RgbImage],
    params: &DetectParams,
  ) -> Result<Vec<Vec<Detection>>, Self::Error>;
}

impl<D: Detector + ?Sized> Detector for &D {
  type Error = D::Error;

  fn detect(
    &self,
    images: &[RgbImage],
    params: &DetectParams,
  ) -> Result<Vec<Vec<Detection>>, Self::Error> {
    (**self).detect(images, params)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;

  #[test]
  fn normalized_invariant() {
    assert!(Detection::new(0, 0.5, 0.5, 0.2, 0.2).is_normalized());
    assert!(!Detection::new(0, 1.2, 0.5, 0.2, 0.2).is_normalized());
    assert!(!Detection::new(0, 0.5, 0.5, 0.0, 0.2).is_normalized());
    assert!(!Detection::new(0, 0.5, -0.1, 0.2, 0.2).is_normalized());
  }

  #[test]
  fn corners_from_center() {
    let [x0, y0, x1, y1] = Detection::new(0, 0.5, 0.4, 0.2, 0.4).corners();
    assert_abs_diff_eq!(x0, 0.4, epsilon = 1e-6);
    assert_abs_diff_eq!(y0, 0.2, epsilon = 1e-6);
    assert_abs_diff_eq!(x1, 0.6, epsilon = 1e-6);
    assert_abs_diff_eq!(y1, 0.6, epsilon = 1e-6);
  }
}
