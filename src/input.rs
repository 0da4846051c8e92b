// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/input.rs - 标注文件与图像输入
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

use thiserror::Error;
use tracing::debug;

use crate::segment::{SegmentError, segment};

mod image_file;
pub use self::image_file::{ImageFileError, load_image};

pub mod label_record;
pub use self::label_record::{
  LabelRecordError, parse_label_record, parse_label_record_where, read_label_record,
  read_label_record_where,
};

/// 可识别的图像扩展名，按查找优先级排列
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

const LABEL_EXTENSION: &str = "txt";

#[derive(Error, Debug)]
pub enum InputError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("分片错误: {0}")]
  Segment(#[from] SegmentError),
  #[error("不是目录: {0}")]
  NotADirectory(PathBuf),
}

/// 精修任务：一个粗检测标注文件及其对应的图像和输出路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelJob {
  pub stem: String,
  pub label_path: PathBuf,
  pub image_path: PathBuf,
  pub output_path: PathBuf,
}

/// 粗检测任务：一张图像及其输出标注路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
  pub stem: String,
  pub image_path: PathBuf,
  pub output_path: PathBuf,
}

/// 列出目录下指定扩展名的文件，按文件名排序
fn list_files(dir: &Path, accept: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>, InputError> {
  if !dir.is_dir() {
    return Err(InputError::NotADirectory(dir.to_path_buf()));
  }

  let mut files = Vec::new();
  for entry in std::fs::read_dir(dir)? {
    let path = entry?.path();
    let ext = path
      .extension()
      .and_then(|e| e.to_str())
      .map(|e| e.to_ascii_lowercase());
    if path.is_file() && ext.as_deref().is_some_and(&accept) {
      files.push(path);
    }
  }
  files.sort();
  debug!("目录 {} 中找到 {} 个文件", dir.display(), files.len());
  Ok(files)
}

fn file_stem(path: &Path) -> String {
  path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default()
}

/// 查找与标注同名的图像；都不存在时返回 `.jpg` 路径，留给加载阶段报告缺失
pub fn find_image(images_dir: &Path, stem: &str) -> PathBuf {
  IMAGE_EXTENSIONS
    .iter()
    .map(|ext| images_dir.join(format!("{}.{}", stem, ext)))
    .find(|p| p.is_file())
    .unwrap_or_else(|| images_dir.join(format!("{}.{}", stem, IMAGE_EXTENSIONS[0])))
}

fn output_path(output_dir: &Path, stem: &str) -> PathBuf {
  output_dir.join(format!("{}.{}", stem, LABEL_EXTENSION))
}

/// 粗检测标注目录输入
///
/// 默认输出写在图像目录下，与图像同名。
#[derive(Debug, Clone)]
pub struct LabelDirInput {
  jobs: Vec<LabelJob>,
}

impl LabelDirInput {
  pub fn open(images_dir: impl AsRef<Path>, labels_dir: impl AsRef<Path>) -> Result<Self, InputError> {
    let images_dir = images_dir.as_ref();
    let labels = list_files(labels_dir.as_ref(), |ext| ext == LABEL_EXTENSION)?;

    let jobs = labels
      .into_iter()
      .map(|label_path| {
        let stem = file_stem(&label_path);
        LabelJob {
          image_path: find_image(images_dir, &stem),
          output_path: output_path(images_dir, &stem),
          label_path,
          stem,
        }
      })
      .collect();

    Ok(Self { jobs })
  }

  pub fn with_output_dir(mut self, output_dir: impl AsRef<Path>) -> Self {
    let output_dir = output_dir.as_ref();
    for job in self.jobs.iter_mut() {
      job.output_path = output_path(output_dir, &job.stem);
    }
    self
  }

  /// 只保留第 `shard_index` 个分片
  pub fn shard(self, shard_size: usize, shard_index: usize) -> Result<Self, InputError> {
    let jobs = segment(&self.jobs, shard_size, shard_index)?.to_vec();
    Ok(Self { jobs })
  }

  pub fn jobs(&self) -> &[LabelJob] {
    &self.jobs
  }

  pub fn len(&self) -> usize {
    self.jobs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.jobs.is_empty()
  }
}

impl IntoIterator for LabelDirInput {
  type Item = LabelJob;
  type IntoIter = std::vec::IntoIter<LabelJob>;

  fn into_iter(self) -> Self::IntoIter {
    self.jobs.into_iter()
  }
}

/// 图像目录输入，用于整图粗检测
#[derive(Debug, Clone)]
pub struct ImageDirInput {
  jobs: Vec<ImageJob>,
}

impl ImageDirInput {
  pub fn open(images_dir: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Result<Self, InputError> {
    let output_dir = output_dir.as_ref();
    let images = list_files(images_dir.as_ref(), |ext| IMAGE_EXTENSIONS.contains(&ext))?;

    let jobs = images
      .into_iter()
      .map(|image_path| {
        let stem = file_stem(&image_path);
        ImageJob {
          output_path: output_path(output_dir, &stem),
          image_path,
          stem,
        }
      })
      .collect();

    Ok(Self { jobs })
  }

  pub fn shard(self, shard_size: usize, shard_index: usize) -> Result<Self, InputError> {
    let jobs = segment(&self.jobs, shard_size, shard_index)?.to_vec();
    Ok(Self { jobs })
  }

  pub fn jobs(&self) -> &[ImageJob] {
    &self.jobs
  }

  pub fn len(&self) -> usize {
    self.jobs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.jobs.is_empty()
  }
}

impl IntoIterator for ImageDirInput {
  type Item = ImageJob;
  type IntoIter = std::vec::IntoIter<ImageJob>;

  fn into_iter(self) -> Self::IntoIter {
    self.jobs.into_iter()
  }
}
