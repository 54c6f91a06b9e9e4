// 该文件是 Jingshi （镜识） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use jingshi::detector::{DetectorConfig, shared_detector};
use jingshi::output::{RecordWriter, Visualizer};
use jingshi::pipeline::{UploadedFile, deliver_reports, run_batch};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型文件路径: {}", args.model.display());
  info!("置信度阈值: {}", args.confidence);
  info!("输出目录: {}", args.output_dir.display());

  let mut config = DetectorConfig::new(&args.model);
  if let Some(labels) = &args.labels {
    config = config.with_labels(labels);
  }

  // 模型加载失败直接终止启动，不进入处理循环
  info!("正在加载模型...");
  let detector = shared_detector(&config).context("模型加载失败")?;
  let visualizer = Visualizer::new();

  let mut files = Vec::new();
  for path in &args.files {
    let file = UploadedFile::from_path(path)
      .with_context(|| format!("无法读取输入文件: {}", path.display()))?;
    files.push(file);
  }

  info!("开始处理, 共 {} 个文件", files.len());
  let reports = run_batch(detector.as_ref(), &visualizer, &files, args.confidence);

  std::fs::create_dir_all(&args.output_dir)
    .with_context(|| format!("无法创建输出目录: {}", args.output_dir.display()))?;
  let record_writer = args.record.then(|| RecordWriter::new(&args.output_dir));

  let summary = deliver_reports(&reports, &args.output_dir, record_writer.as_ref());

  info!(
    "处理完成: 成功 {} 个, 失败 {} 个, 共 {} 个检测",
    summary.succeeded, summary.failed, summary.detections
  );

  Ok(())
}
