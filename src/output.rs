// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/output.rs - 输出定义
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
use thiserror::Error;

use crate::model::Detection;

pub trait Render: Sized {
  type Error;

  /// 目标位置是否已有结果，作为重复运行时跳过的依据
  fn is_rendered(&self, target: &Path) -> bool;

  fn render_result(
    &self,
    target: &Path,
    frame: &RgbImage,
    result: &[Detection],
  ) -> Result<(), Self::Error>;
}

mod label_record;
pub use self::label_record::{ClassColumn, LabelRecordOutput, format_label_record, write_label_record};

#[cfg(feature = "preview")]
mod preview;
#[cfg(feature = "preview")]
pub use self::preview::{PreviewOutput, PreviewOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("标注记录写入错误: {0}")]
  LabelRecordError(#[from] std::io::Error),
  #[cfg(feature = "preview")]
  #[error("预览图输出错误: {0}")]
  PreviewOutputError(#[from] PreviewOutputError),
}

/// 标注记录加可选的预览图
pub struct OutputSet {
  record: LabelRecordOutput,
  #[cfg(feature = "preview")]
  preview: Option<PreviewOutput>,
}

impl OutputSet {
  pub fn new(record: LabelRecordOutput) -> Self {
    Self {
      record,
      #[cfg(feature = "preview")]
      preview: None,
    }
  }

  #[cfg(feature = "preview")]
  pub fn with_preview(mut self, preview: Option<PreviewOutput>) -> Self {
    self.preview = preview;
    self
  }
}

impl Render for OutputSet {
  type Error = OutputError;

  fn is_rendered(&self, target: &Path) -> bool {
    self.record.is_rendered(target)
  }

  fn render_result(
    &self,
    target: &Path,
    frame: &RgbImage,
    result: &[Detection],
  ) -> Result<(), Self::Error> {
    #[cfg(feature = "preview")]
    {
      if let Some(preview) = &self.preview {
        preview.render_result(target, frame, result)?;
      }
    }

    self.record.render_result(target, frame, result)?;
    Ok(())
  }
}
