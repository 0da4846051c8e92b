// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/main.rs - 裁切精修主程序
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
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use url::Url;

use recrop::{
  FromUrl,
  input::LabelDirInput,
  model::{
    DetectParams, UltralyticsBuilder,
    coco::{describe_classes, parse_class},
  },
  output::{ClassColumn, LabelRecordOutput, OutputSet},
  task::{RefineConfig, RefineTask, ReprojectFrame, RetryPolicy, Task, stop_on_ctrlc},
  utils::{resolve_path, unique_run_title},
};

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FrameArg {
  /// 按实际裁切的像素区域映射
  Window,
  /// 按原始粗检测框映射
  Source,
}

impl From<FrameArg> for ReprojectFrame {
  fn from(arg: FrameArg) -> Self {
    match arg {
      FrameArg::Window => ReprojectFrame::Window,
      FrameArg::Source => ReprojectFrame::Source,
    }
  }
}

/// 在粗检测框的裁切图上重新检测，并把结果映射回原图
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 原图目录
  #[arg(long, value_name = "DIR")]
  pub images: PathBuf,

  /// 粗检测标注目录，每张图像一个 .txt 文件
  #[arg(long, value_name = "DIR")]
  pub labels: PathBuf,

  /// 模型地址，例如 ultralytics:///path/to/model.pt?device=0
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 精修结果输出目录（默认写在原图目录下）
  #[arg(long, value_name = "DIR")]
  pub output: Option<PathBuf>,

  /// 参与精修的类别，ID 或 COCO 名称，逗号分隔
  #[arg(long, value_delimiter = ',', value_parser = parse_class, default_value = "0,2,3,5,7")]
  pub classes: Vec<u32>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.01", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.05", value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 推理输入尺寸
  #[arg(long, default_value = "640", value_name = "PIXELS")]
  pub imgsz: u32,

  /// 推理设备，覆盖模型地址中的 device 参数
  #[arg(long, value_name = "DEVICE")]
  pub device: Option<String>,

  /// 映射回原图时使用的参考框
  #[arg(long, value_enum, default_value = "window")]
  pub frame: FrameArg,

  /// 输出记录保留检测器给出的类别，而不是统一写 0
  #[arg(long)]
  pub keep_class: bool,

  /// 每个分片的文件数
  #[arg(long, value_name = "COUNT", requires = "shard_index")]
  pub shard_size: Option<usize>,

  /// 本进程处理的分片索引（从 0 开始）
  #[arg(long, value_name = "INDEX", requires = "shard_size")]
  pub shard_index: Option<usize>,

  /// 检测器调用的最大尝试次数
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub attempts: u32,

  /// 首次重试前的等待时间（毫秒）
  #[arg(long, default_value = "500", value_name = "MILLIS")]
  pub backoff_ms: u64,

  /// 检测器出错时终止整个批处理
  #[arg(long)]
  pub fail_fast: bool,

  /// 运行目录（默认在当前目录下生成 run_<图像目录名>）
  #[arg(long, value_name = "DIR")]
  pub run_dir: Option<PathBuf>,

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
  let labels = resolve_path(&cwd, &args.labels)?;

  info!("模型地址: {}", args.model);
  info!("原图目录: {}", images.display());
  info!("标注目录: {}", labels.display());
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.nms_threshold);
  info!("参与精修的类别: {}", describe_classes(&args.classes));

  let mut input = LabelDirInput::open(&images, &labels)?;
  if let Some(output) = &args.output {
    input = input.with_output_dir(output);
  }
  if let (Some(size), Some(index)) = (args.shard_size, args.shard_index) {
    let total = input.len();
    input = input.shard(size, index)?;
    info!("分片 {} (每片 {} 个): {} / {} 个文件", index, size, input.len(), total);
  }

  let run_dir = match &args.run_dir {
    Some(dir) => dir.clone(),
    None => cwd.join(unique_run_title(&cwd, &images)),
  };
  std::fs::create_dir_all(&run_dir)
    .with_context(|| format!("无法创建运行目录: {}", run_dir.display()))?;
  info!("运行目录: {}", run_dir.display());

  let mut builder = UltralyticsBuilder::from_url(&args.model)?.staging_dir(Some(run_dir.join("crops")));
  if args.device.is_some() {
    builder = builder.device(args.device.clone());
  }
  let model = builder.build()?;

  let params = DetectParams::refine()
    .with_confidence(args.confidence)
    .with_iou(args.nms_threshold)
    .with_target_size(args.imgsz);
  let config = RefineConfig::default()
    .with_allowed_classes(args.classes.clone())
    .with_params(params)
    .with_frame(args.frame.into())
    .with_isolate_failures(!args.fail_fast)
    .with_retry(RetryPolicy::new(
      args.attempts,
      Duration::from_millis(args.backoff_ms),
    ));

  let column = if args.keep_class {
    ClassColumn::Detected
  } else {
    ClassColumn::Fixed(0)
  };
  let output = OutputSet::new(LabelRecordOutput::new(column));
  #[cfg(feature = "preview")]
  let output = output.with_preview(args.preview.clone().map(recrop::output::PreviewOutput::new));

  let stop = stop_on_ctrlc().context("无法设置 Ctrl-C 处理器")?;
  let summary = RefineTask::new(config)
    .with_stop_flag(stop)
    .run_task(input, model, output)?;

  let summary_path = run_dir.join("summary.json");
  std::fs::write(&summary_path, serde_json::to_string_pretty(&summary.to_json())?)?;
  info!("运行统计已写入: {}", summary_path.display());

  if summary.failed > 0 {
    warn!("{} 个文件处理失败", summary.failed);
  }

  Ok(())
}
