// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/model/ultralytics.rs - 基于 Ultralytics 命令行的检测器
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

use std::{
  path::{Path, PathBuf},
  process::{Command, ExitStatus},
  time::Instant,
};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{LabelRecordError, parse_label_record},
  model::{DetectParams, Detection, Detector},
};

const ULTRALYTICS_PROGRAM: &str = "yolo";
const ULTRALYTICS_RUN_NAME: &str = "predict";

#[derive(Error, Debug)]
pub enum UltralyticsError {
  #[error("模型路径必须使用 {0} 方案")]
  SchemeMismatch(&'static str),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("预测命令执行失败 ({status}): {stderr}")]
  Command { status: ExitStatus, stderr: String },
  #[error("预测结果解析错误: {0}")]
  RecordError(#[from] LabelRecordError),
}

/// 从 `ultralytics:///path/to/model.pt?device=0&program=yolo` 构建
pub struct UltralyticsBuilder {
  model_path: PathBuf,
  program: String,
  device: Option<String>,
  staging_dir: Option<PathBuf>,
}

impl FromUrlWithScheme for UltralyticsBuilder {
  const SCHEME: &'static str = "ultralytics";
}

impl FromUrl for UltralyticsBuilder {
  type Error = UltralyticsError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(UltralyticsError::SchemeMismatch(Self::SCHEME));
    }

    let model_path = urlencoding::decode(url.path())
      .map_err(|e| UltralyticsError::ModelPathError(e.to_string()))?
      .into_owned();

    let mut builder = UltralyticsBuilder::new(model_path);
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "device" => builder.device = Some(v.into_owned()),
        "program" => builder.program = v.into_owned(),
        _ => debug!("忽略未知参数: {}={}", k, v),
      }
    }
    Ok(builder)
  }
}

impl UltralyticsBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      program: ULTRALYTICS_PROGRAM.to_string(),
      device: None,
      staging_dir: None,
    }
  }

  pub fn program(mut self, program: impl Into<String>) -> Self {
    self.program = program.into();
    self
  }

  pub fn device(mut self, device: Option<String>) -> Self {
    self.device = device;
    self
  }

  /// 暂存裁切图与预测结果的父目录，默认使用系统临时目录
  pub fn staging_dir(mut self, dir: Option<PathBuf>) -> Self {
    self.staging_dir = dir;
    self
  }

  pub fn build(self) -> Result<Ultralytics, UltralyticsError> {
    info!("加载模型文件: {}", self.model_path.display());
    let meta = std::fs::metadata(&self.model_path)
      .map_err(|_| UltralyticsError::ModelNotFound(self.model_path.clone()))?;
    debug!(
      "模型文件大小: {:.2} MB",
      meta.len() as f64 / (1024.0 * 1024.0)
    );
    if let Some(dir) = &self.staging_dir {
      std::fs::create_dir_all(dir)?;
    }

    Ok(Ultralytics {
      model_path: self.model_path,
      program: self.program,
      device: self.device,
      staging_dir: self.staging_dir,
    })
  }
}

/// 把一批图像写入临时目录，调用 `yolo predict` 并读回每张图像的标注文件
pub struct Ultralytics {
  model_path: PathBuf,
  program: String,
  device: Option<String>,
  staging_dir: Option<PathBuf>,
}

fn staged_name(idx: usize) -> String {
  format!("{:06}", idx)
}

impl Ultralytics {
  fn arguments(&self, source: &Path, project: &Path, params: &DetectParams) -> Vec<String> {
    let mut args = vec![
      "predict".to_string(),
      format!("model={}", self.model_path.display()),
      format!("source={}", source.display()),
      format!("imgsz={}", params.target_size),
      format!("conf={}", params.confidence),
      format!("iou={}", params.iou),
      "save=False".to_string(),
      "save_txt=True".to_string(),
      "save_conf=True".to_string(),
      format!("project={}", project.display()),
      format!("name={}", ULTRALYTICS_RUN_NAME),
      "exist_ok=True".to_string(),
      "verbose=False".to_string(),
    ];
    if let Some(classes) = &params.classes {
      let list: Vec<String> = classes.iter().map(|c| c.to_string()).collect();
      args.push(format!("classes=[{}]", list.join(",")));
    }
    if let Some(device) = &self.device {
      args.push(format!("device={}", device));
    }
    args
  }

  fn staging(&self) -> std::io::Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("recrop-");
    match &self.staging_dir {
      Some(dir) => builder.tempdir_in(dir),
      None => builder.tempdir(),
    }
  }

  fn read_result(labels: &Path, idx: usize) -> Result<Vec<Detection>, UltralyticsError> {
    let path = labels.join(format!("{}.txt", staged_name(idx)));
    if !path.exists() {
      return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(&path)?;
    let mut detections = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
      match parse_label_record(line) {
        Ok(mut dets) => detections.append(&mut dets),
        Err(LabelRecordError::OutOfRange { .. }) => debug!("忽略退化检测框: {}", line),
        Err(e) => return Err(e.into()),
      }
    }
    Ok(detections)
  }
}

impl Detector for Ultralytics {
  type Error = UltralyticsError;

  fn detect(
    &self,
    images: &[RgbImage],
    params: &DetectParams,
  ) -> Result<Vec<Vec<Detection>>, Self::Error> {
    if images.is_empty() {
      return Ok(Vec::new());
    }

    let staging = self.staging()?;
    let source = staging.path().join("source");
    let project = staging.path().join("project");
    std::fs::create_dir_all(&source)?;
    for (idx, image) in images.iter().enumerate() {
      image.save(source.join(format!("{}.png", staged_name(idx))))?;
    }

    debug!("执行模型推理: {} 张图像", images.len());
    let now = Instant::now();
    let output = Command::new(&self.program)
      .args(self.arguments(&source, &project, params))
      .output()?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    if !output.status.success() {
      return Err(UltralyticsError::Command {
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    let labels = project.join(ULTRALYTICS_RUN_NAME).join("labels");
    (0..images.len())
      .map(|idx| Self::read_result(&labels, idx))
      .collect()
  }
}
