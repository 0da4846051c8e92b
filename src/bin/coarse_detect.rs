// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/bin/coarse_detect.rs - 整图粗检测
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

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use recrop::{
  FromUrl,
  input::ImageDirInput,
  model::{
    DetectParams, UltralyticsBuilder,
    coco::{describe_classes, parse_class},
  },
  output::{ClassColumn, LabelRecordOutput, OutputSet},
  task::{CoarseTask, RetryPolicy, Task, stop_on_ctrlc},
  utils::{label_dir_title, resolve_path, unique_run_title},
};

/// 在整张图像上运行检测，生成供精修使用的粗检测标注
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 图像目录
  #[arg(long, value_name = "DIR", default_value = "images")]
  pub images: PathBuf,

  /// 模型地址，例如 ultralytics:///path/to/model.pt
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 标注输出目录（默认为当前目录下的 labels_<图像目录名>，重复运行时跳过已有结果）
  #[arg(long, value_name = "DIR")]
  pub output: Option<PathBuf>,

  /// 保留的类别，ID 或 COCO 名称，逗号分隔
  #[arg(long, value_delimiter = ',', value_parser = parse_class, default_value = "0,2,3,5,7")]
  pub classes: Vec<u32>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.3", value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 推理输入尺寸
  #[arg(long, default_value = "6400", value_name = "PIXELS")]
  pub imgsz: u32,

  /// 推理设备
  #[arg(long, value_name = "DEVICE")]
  pub device: Option<String>,

  /// 每个分片的文件数
  #[arg(long, value_name = "COUNT", requires = "shard_index")]
  pub shard_size: Option<usize>,

  /// 本进程处理的分片索引（从 0 开始）
  #[arg(long, value_name = "INDEX", requires = "shard_size")]
  pub shard_index: Option<usize>,

  /// 检测器调用的最大尝试次数
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub attempts: u32,

  /// 检测器出错时终止整个批处理
  #[arg(long)]
  pub fail_fast: bool,

  /// 预览图输出目录
  #[cfg(feature = "preview")]
  #[arg(long, value_name = "DIR")]
  pub preview: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let cwd = std::env::current_dir()?;
  let images = resolve_path(&cwd, &args.images)?;

  let run_dir = cwd.join(unique_run_title(&cwd, &images));
  std::fs::create_dir_all(&run_dir)
    .with_context(|| format!("无法创建运行目录: {}", run_dir.display()))?;
  let labels = match &args.output {
    Some(dir) => dir.clone(),
    None => cwd.join(label_dir_title(&images)),
  };

  info!("模型地址: {}", args.model);
  info!("图像目录: {}", images.display());
  info!("标注输出: {}", labels.display());
  info!("保留类别: {}", describe_classes(&args.classes));

  let mut input = ImageDirInput::open(&images, &labels)?;
  if let (Some(size), Some(index)) = (args.shard_size, args.shard_index) {
    let total = input.len();
    input = input.shard(size, index)?;
    info!("分片 {} (每片 {} 个): {} / {} 个文件", index, size, input.len(), total);
  }

  let mut builder = UltralyticsBuilder::from_url(&args.model)?.staging_dir(Some(run_dir.join("staging")));
  if args.device.is_some() {
    builder = builder.device(args.device.clone());
  }
  let model = builder.build()?;

  let params = DetectParams::coarse()
    .with_confidence(args.confidence)
    .with_iou(args.nms_threshold)
    .with_classes(Some(args.classes.clone()))
    .with_target_size(args.imgsz);

  let output = OutputSet::new(LabelRecordOutput::new(ClassColumn::Detected));
  #[cfg(feature = "preview")]
  let output = output.with_preview(args.preview.clone().map(recrop::output::PreviewOutput::new));

  let stop = stop_on_ctrlc().context("无法设置 Ctrl-C 处理器")?;
  let summary = CoarseTask::new(params)
    .with_isolate_failures(!args.fail_fast)
    .with_retry(RetryPolicy::new(args.attempts, Duration::from_millis(500)))
    .with_stop_flag(stop)
    .run_task(input, model, output)?;

  let summary_path = run_dir.join("summary.json");
  std::fs::write(&summary_path, serde_json::to_string_pretty(&summary.to_json())?)?;
  info!("运行统计已写入: {}", summary_path.display());

  Ok(())
}
