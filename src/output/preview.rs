// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/output/preview.rs - 精修结果预览图
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use thiserror::Error;
use tracing::debug;

use crate::{model::Detection, output::Render};

const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const BOX_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum PreviewOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 将检测框画在原图副本上，保存为 `<directory>/<stem>.png`
pub struct PreviewOutput {
  directory: PathBuf,
  color: [u8; 3],
}

impl PreviewOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      color: BOX_COLOR,
    }
  }

  fn preview_path(&self, target: &Path) -> PathBuf {
    let stem = target.file_stem().unwrap_or_default().to_string_lossy();
    self.directory.join(format!("{}.png", stem))
  }

  // bbox 为归一化中心点坐标，超出图像的部分被裁掉
  fn draw_bbox(&self, image: &mut RgbImage, det: &Detection) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let [x0, y0, x1, y1] = det.corners();

    let x_min = (x0 * w).floor().clamp(0.0, w - 1.0) as i32;
    let y_min = (y0 * h).floor().clamp(0.0, h - 1.0) as i32;
    let x_max = (x1 * w).ceil().clamp(0.0, w - 1.0) as i32;
    let y_max = (y1 * h).ceil().clamp(0.0, h - 1.0) as i32;

    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.color));
    }
  }

  pub fn draw(&self, frame: &RgbImage, result: &[Detection]) -> RgbImage {
    let mut image = frame.clone();
    for det in result {
      self.draw_bbox(&mut image, det);
    }
    image
  }
}

impl Render for PreviewOutput {
  type Error = PreviewOutputError;

  fn is_rendered(&self, target: &Path) -> bool {
    self.preview_path(target).exists()
  }

  fn render_result(
    &self,
    target: &Path,
    frame: &RgbImage,
    result: &[Detection],
  ) -> Result<(), Self::Error> {
    std::fs::create_dir_all(&self.directory)?;
    let path = self.preview_path(target);
    self.draw(frame, result).save(&path)?;
    debug!("保存预览图到文件: {}", path.display());
    Ok(())
  }
}
