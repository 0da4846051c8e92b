// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/input/label_record.rs - 读取标注记录
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

use thiserror::Error;

use crate::model::Detection;

#[derive(Error, Debug)]
pub enum LabelRecordError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("第 {line} 行格式错误: {reason}")]
  Malformed { line: usize, reason: String },
  #[error("第 {line} 行坐标超出归一化范围")]
  OutOfRange { line: usize },
}

fn malformed(line: usize, reason: impl Into<String>) -> LabelRecordError {
  LabelRecordError::Malformed {
    line,
    reason: reason.into(),
  }
}

/// 解析一行 `class x y w h [score]`，行号从 1 开始
///
/// 先读类别，`keep` 拒绝的行直接跳过，不再校验其余字段。
fn parse_line(
  line_no: usize,
  line: &str,
  keep: &impl Fn(u32) -> bool,
) -> Result<Option<Detection>, LabelRecordError> {
  let fields: Vec<&str> = line.split_whitespace().collect();
  let class_field = fields.first().copied().unwrap_or_default();
  let class_id = class_field
    .parse::<u32>()
    .map_err(|e| malformed(line_no, format!("类别 '{}': {}", class_field, e)))?;
  if !keep(class_id) {
    return Ok(None);
  }

  if fields.len() != 5 && fields.len() != 6 {
    return Err(malformed(
      line_no,
      format!("期望 5 或 6 个字段, 实际 {} 个", fields.len()),
    ));
  }

  let mut values = [0f32; 5];
  for (value, field) in values.iter_mut().zip(&fields[1..]) {
    *value = field
      .parse::<f32>()
      .map_err(|e| malformed(line_no, format!("数值 '{}': {}", field, e)))?;
  }

  let mut detection = Detection::new(class_id, values[0], values[1], values[2], values[3]);
  if fields.len() == 6 {
    detection = detection.with_score(values[4]);
  }

  if !detection.is_normalized() {
    return Err(LabelRecordError::OutOfRange { line: line_no });
  }
  Ok(Some(detection))
}

/// 解析标注文本，只保留 `keep` 接受的类别，空行忽略
pub fn parse_label_record_where(
  text: &str,
  keep: impl Fn(u32) -> bool,
) -> Result<Vec<Detection>, LabelRecordError> {
  text
    .lines()
    .enumerate()
    .filter(|(_, line)| !line.trim().is_empty())
    .filter_map(|(idx, line)| parse_line(idx + 1, line, &keep).transpose())
    .collect()
}

/// 解析标注文本，空行忽略
pub fn parse_label_record(text: &str) -> Result<Vec<Detection>, LabelRecordError> {
  parse_label_record_where(text, |_| true)
}

pub fn read_label_record(path: impl AsRef<Path>) -> Result<Vec<Detection>, LabelRecordError> {
  read_label_record_where(path, |_| true)
}

pub fn read_label_record_where(
  path: impl AsRef<Path>,
  keep: impl Fn(u32) -> bool,
) -> Result<Vec<Detection>, LabelRecordError> {
  let text = std::fs::read_to_string(path)?;
  parse_label_record_where(&text, keep)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_five_and_six_field_lines() {
    let text = "2 0.5 0.5 0.2 0.1\n\n7 0.25 0.75 0.1 0.3 0.92\n";
    let dets = parse_label_record(text).unwrap();
    assert_eq!(dets.len(), 2);
    assert_eq!(dets[0], Detection::new(2, 0.5, 0.5, 0.2, 0.1));
    assert_eq!(dets[1].class_id, 7);
    assert_eq!(dets[1].score, Some(0.92));
  }

  #[test]
  fn reports_line_of_malformed_entry() {
    let text = "0 0.5 0.5 0.2 0.2\n0 0.5 abc 0.2 0.2\n";
    match parse_label_record(text) {
      Err(LabelRecordError::Malformed { line, .. }) => assert_eq!(line, 2),
      other => panic!("unexpected: {:?}", other),
    }
    assert!(matches!(
      parse_label_record("0 0.5 0.5"),
      Err(LabelRecordError::Malformed { line: 1, .. })
    ));
  }

  #[test]
  fn rejects_out_of_range_coordinates() {
    assert!(matches!(
      parse_label_record("0 1.5 0.5 0.2 0.2"),
      Err(LabelRecordError::OutOfRange { line: 1 })
    ));
    assert!(matches!(
      parse_label_record("0 0.5 0.5 0 0.2"),
      Err(LabelRecordError::OutOfRange { line: 1 })
    ));
  }

  #[test]
  fn rejected_classes_are_not_validated() {
    let text = "0 0.5 0.5 0.5 0.5\n9 1.02 0.5 0.1 0.1\n9 garbage\n2 0.2 0.2 0.1 0.1\n";
    let dets = parse_label_record_where(text, |c| c != 9).unwrap();
    assert_eq!(dets.len(), 2);
    assert_eq!(dets[1].class_id, 2);
    assert!(matches!(
      parse_label_record_where("0 0.5 0.5 0.5 0.5\n2 1.5 0.5 0.1 0.1\n", |c| c != 9),
      Err(LabelRecordError::OutOfRange { line: 2 })
    ));
  }

  #[test]
  fn empty_text_is_empty_record() {
    assert!(parse_label_record("").unwrap().is_empty());
    assert!(parse_label_record("\n  \n").unwrap().is_empty());
  }
}
