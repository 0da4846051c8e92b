// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/crop.rs - 按检测框裁切图像
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

use image::{RgbImage, imageops};

use crate::model::Detection;

/// 原图中的像素区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

/// 由一个检测框裁出的子图
#[derive(Debug, Clone)]
pub struct Crop {
  pub image: RgbImage,
  /// 产生该裁切的原始检测框
  pub source: Detection,
  pub origin_height: u32,
  pub origin_width: u32,
  /// 实际裁切区域（已裁剪到图像边界内）
  pub window: PixelWindow,
}

impl Crop {
  /// 实际裁切区域在原图中的归一化框
  pub fn frame(&self) -> Detection {
    let (w, h) = (self.origin_width as f32, self.origin_height as f32);
    let win = &self.window;
    Detection {
      class_id: self.source.class_id,
      x_center: (win.x as f32 + win.width as f32 / 2.0) / w,
      y_center: (win.y as f32 + win.height as f32 / 2.0) / h,
      width: win.width as f32 / w,
      height: win.height as f32 / h,
      score: self.source.score,
    }
  }
}

/// 计算检测框对应的像素区域
///
/// 中心与半宽高分别四舍五入到整数像素，区域为
/// `[y - half_h, y + half_h) x [x - half_w, x + half_w)`，并裁剪到 `[0, H) x [0, W)`。
/// 裁剪后面积为 0 时返回 `None`。
pub fn window(width: u32, height: u32, source: &Detection) -> Option<PixelWindow> {
  let (w, h) = (width as f32, height as f32);
  let x = (source.x_center * w).round() as i64;
  let y = (source.y_center * h).round() as i64;
  let half_w = (source.width / 2.0 * w).round() as i64;
  let half_h = (source.height / 2.0 * h).round() as i64;

  let x0 = (x - half_w).clamp(0, width as i64);
  let x1 = (x + half_w).clamp(0, width as i64);
  let y0 = (y - half_h).clamp(0, height as i64);
  let y1 = (y + half_h).clamp(0, height as i64);

  if x1 <= x0 || y1 <= y0 {
    return None;
  }

  Some(PixelWindow {
    x: x0 as u32,
    y: y0 as u32,
    width: (x1 - x0) as u32,
    height: (y1 - y0) as u32,
  })
}

/// 从原图中裁出检测框对应的子图
pub fn extract(image: &RgbImage, source: &Detection) -> Option<Crop> {
  let (width, height) = image.dimensions();
  let window = window(width, height, source)?;
  let sub = imageops::crop_imm(image, window.x, window.y, window.width, window.height).to_image();

  Some(Crop {
    image: sub,
    source: *source,
    origin_height: height,
    origin_width: width,
    window,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;
  use image::Rgb;

  fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 0]))
  }

  #[test]
  fn centered_box_crop() {
    let image = gradient(200, 100);
    let crop = extract(&image, &Detection::new(0, 0.5, 0.5, 0.2, 0.2)).unwrap();
    assert_eq!(
      crop.window,
      PixelWindow {
        x: 80,
        y: 40,
        width: 40,
        height: 20
      }
    );
    assert_eq!(crop.image.dimensions(), (40, 20));
    assert_eq!((crop.origin_width, crop.origin_height), (200, 100));
    assert_eq!(crop.image.get_pixel(0, 0), &Rgb([80, 40, 0]));
  }

  #[test]
  fn border_box_is_clamped() {
    let image = gradient(100, 100);
    let crop = extract(&image, &Detection::new(0, 0.02, 0.97, 0.1, 0.1)).unwrap();
    assert_eq!(
      crop.window,
      PixelWindow {
        x: 0,
        y: 92,
        width: 7,
        height: 8
      }
    );
    assert_eq!(crop.image.get_pixel(0, 0), &Rgb([0, 92, 0]));
  }

  #[test]
  fn zero_area_gives_no_crop() {
    let image = gradient(100, 100);
    // 半宽四舍五入为 0
    assert!(extract(&image, &Detection::new(0, 0.5, 0.5, 0.004, 0.3)).is_none());
    // 完全位于图像之外
    assert!(window(100, 100, &Detection::new(0, 1.5, 0.5, 0.2, 0.2)).is_none());
  }

  #[test]
  fn frame_matches_source_when_pixel_aligned() {
    let image = gradient(200, 100);
    let source = Detection::new(3, 0.5, 0.5, 0.2, 0.2);
    let frame = extract(&image, &source).unwrap().frame();
    assert_abs_diff_eq!(frame.x_center, 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(frame.y_center, 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(frame.width, 0.2, epsilon = 1e-6);
    assert_abs_diff_eq!(frame.height, 0.2, epsilon = 1e-6);
    assert_eq!(frame.class_id, 3);
  }
}
