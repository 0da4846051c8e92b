// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/reproject.rs - 裁切坐标系到原图坐标系的映射
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

use crate::model::Detection;

/// 将裁切图内的归一化检测框映射回原图的归一化坐标
///
/// `source` 是裁切区域在原图中的框 (x1, y1, w1, h1)，`local` 是相对裁切图尺寸
/// 归一化的检测框 (x2, y2, w2, h2)。先按裁切区域的尺寸缩放，再平移到裁切区域左上角：
///
/// ```text
/// x = x2 * w1 + (x1 - w1 / 2)
/// y = y2 * h1 + (y1 - h1 / 2)
/// w = w1 * w2
/// h = h1 * h2
/// ```
///
/// 类别与置信度沿用 `local`。
pub fn reproject(local: &Detection, source: &Detection) -> Detection {
  let left = source.x_center - source.width / 2.0;
  let top = source.y_center - source.height / 2.0;

  Detection {
    class_id: local.class_id,
    x_center: local.x_center * source.width + left,
    y_center: local.y_center * source.height + top,
    width: source.width * local.width,
    height: source.height * local.height,
    score: local.score,
  }
}
