// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/model/coco.rs - COCO 类别表
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

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("未知类别: {0}")]
pub struct UnknownClass(pub String);

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 类别名称，超出 COCO 范围时返回 `None`
pub fn class_name(class_id: u32) -> Option<&'static str> {
  COCO_CLASSES.get(class_id as usize).copied()
}

/// 日志用的类别列表，如 `0(person), 2(car)`
pub fn describe_classes(classes: &[u32]) -> String {
  classes
    .iter()
    .map(|&id| format!("{}({})", id, class_name(id).unwrap_or("?")))
    .collect::<Vec<_>>()
    .join(", ")
}

/// 解析类别：既可以是数字 ID，也可以是 COCO 类别名称
pub fn parse_class(s: &str) -> Result<u32, UnknownClass> {
  let s = s.trim();
  if let Ok(id) = s.parse::<u32>() {
    return Ok(id);
  }
  COCO_CLASSES
    .iter()
    .position(|name| name.eq_ignore_ascii_case(s))
    .map(|idx| idx as u32)
    .ok_or_else(|| UnknownClass(s.to_string()))
}
