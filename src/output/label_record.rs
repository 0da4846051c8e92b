// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/output/label_record.rs - 标注记录输出
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

use std::path::Path;

use image::RgbImage;
use tracing::debug;

use crate::{model::Detection, output::Render};

/// 记录中类别列的写法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassColumn {
  /// 所有行写同一个类别
  Fixed(u32),
  /// 写检测器给出的类别
  Detected,
}

impl Default for ClassColumn {
  fn default() -> Self {
    ClassColumn::Fixed(0)
  }
}

/// 每行 `class x y w h`，空格分隔
pub fn format_label_record(detections: &[Detection], column: ClassColumn) -> String {
  let mut text = String::new();
  for det in detections {
    let class_id = match column {
      ClassColumn::Fixed(id) => id,
      ClassColumn::Detected => det.class_id,
    };
    text.push_str(&format!(
      "{} {:.6} {:.6} {:.6} {:.6}\n",
      class_id, det.x_center, det.y_center, det.width, det.height
    ));
  }
  text
}

/// 先写临时文件再重命名，目标文件要么不存在要么完整
pub fn write_label_record(
  path: &Path,
  detections: &[Detection],
  column: ClassColumn,
) -> Result<(), std::io::Error> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  let partial = path.with_extension("txt.part");
  std::fs::write(&partial, format_label_record(detections, column))?;
  std::fs::rename(&partial, path)?;

  debug!("写入 {} 条记录到 {}", detections.len(), path.display());
  Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LabelRecordOutput {
  pub class_column: ClassColumn,
}

impl LabelRecordOutput {
  pub fn new(class_column: ClassColumn) -> Self {
    Self { class_column }
  }
}

impl Render for LabelRecordOutput {
  type Error = std::io::Error;

  fn is_rendered(&self, target: &Path) -> bool {
    target.exists()
  }

  fn render_result(
    &self,
    target: &Path,
    _frame: &RgbImage,
    result: &[Detection],
  ) -> Result<(), Self::Error> {
    write_label_record(target, result, self.class_column)
  }
}
