// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/utils.rs - 路径工具
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

/// 生成 `parent` 下未被占用的运行名称：`run_<源目录名>`，已存在时依次追加 `_1`、`_2`……
pub fn unique_run_title(parent: &Path, source: &Path) -> String {
  let base = format!("run_{}", source_name(source));

  let mut title = base.clone();
  let mut counter = 1;
  while parent.join(&title).exists() {
    title = format!("{}_{}", base, counter);
    counter += 1;
  }
  title
}

/// 粗检测的默认标注目录名 `labels_<源目录名>`，不随运行变化，重复运行可跳过已有结果
pub fn label_dir_title(source: &Path) -> String {
  format!("labels_{}", source_name(source))
}

fn source_name(source: &Path) -> String {
  source
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "source".to_string())
}

/// 相对路径按 `base` 解析，路径不存在时报错
pub fn resolve_path(base: &Path, path: &Path) -> std::io::Result<PathBuf> {
  let resolved = if path.is_absolute() {
    path.to_path_buf()
  } else {
    base.join(path)
  };

  if !resolved.exists() {
    return Err(std::io::Error::new(
      std::io::ErrorKind::NotFound,
      format!("路径不存在: {}", resolved.display()),
    ));
  }
  Ok(resolved)
}
