// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/input/image_file.rs - 图像文件读取
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ImageFileError {
  #[error("图像文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(image::ImageError),
}

impl From<image::ImageError> for ImageFileError {
  fn from(err: image::ImageError) -> Self {
    ImageFileError::ImageLoadError(err)
  }
}

/// 读取图像并转为 RGB
pub fn load_image(path: impl AsRef<Path>) -> Result<RgbImage, ImageFileError> {
  let path = path.as_ref();
  let reader = ImageReader::open(path).map_err(|e| match e.kind() {
    std::io::ErrorKind::NotFound => ImageFileError::NotFound(path.to_path_buf()),
    _ => ImageFileError::IoError(e),
  })?;
  let image = reader
    .with_guessed_format()
    .map_err(ImageFileError::IoError)?
    .decode()?
    .to_rgb8();
  debug!(
    "读取图像 {}: {}x{}",
    path.display(),
    image.width(),
    image.height()
  );
  Ok(image)
}
