// 该文件是 Jingshi （镜识） 项目的一部分。
// src/pipeline.rs - 检测管线
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

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};

use crate::detector::{Detect, Detection, InferenceError};
use crate::input::{DecodeError, ImageKind, decode_image};
use crate::output::{EncodeError, RecordWriter, Visualizer, encode_png};

/// 上传的待处理文件
#[derive(Clone, Debug)]
pub struct UploadedFile {
  pub name: String,
  pub bytes: Vec<u8>,
}

impl UploadedFile {
  pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
    Self {
      name: name.into(),
      bytes,
    }
  }

  /// 从磁盘路径读入，文件名取路径末段
  pub fn from_path(path: &Path) -> Result<Self, std::io::Error> {
    let name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string());
    let bytes = std::fs::read(path)?;
    Ok(Self { name, bytes })
  }
}

/// 单个文件的完整处理结果
#[derive(Debug)]
pub struct FileReport {
  /// 原始文件名
  pub name: String,
  /// 解码后的原图
  pub original: RgbImage,
  /// 标注副本
  pub annotated: RgbImage,
  /// 检测结果
  pub detections: Vec<Detection>,
  /// 文本化的检测清单，每条 “标签 — 置信度%”
  pub lines: Vec<String>,
  /// 下载文件名，detection_<原文件名>
  pub download_name: String,
  /// 标注副本的 PNG 字节流
  pub png: Vec<u8>,
}

/// 管线错误：以单个文件为失败单元，携带出错的文件名
#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("文件 {name} 解码失败: {source}")]
  Decode {
    name: String,
    #[source]
    source: DecodeError,
  },
  #[error("文件 {name} 推理失败: {source}")]
  Inference {
    name: String,
    #[source]
    source: InferenceError,
  },
  #[error("文件 {name} 结果编码失败: {source}")]
  Encode {
    name: String,
    #[source]
    source: EncodeError,
  },
}

impl PipelineError {
  /// 出错文件的名称
  pub fn file_name(&self) -> &str {
    match self {
      PipelineError::Decode { name, .. } => name,
      PipelineError::Inference { name, .. } => name,
      PipelineError::Encode { name, .. } => name,
    }
  }
}

/// 处理单个上传文件：解码、推理、标注、编码。
/// 纯函数式的一次完整流水，除返回值外不保留任何跨调用状态。
pub fn process_file<D: Detect>(
  detector: &D,
  visualizer: &Visualizer,
  file: &UploadedFile,
  threshold: f32,
) -> Result<FileReport, PipelineError> {
  let kind = ImageKind::from_name(&file.name).ok_or_else(|| PipelineError::Decode {
    name: file.name.clone(),
    source: DecodeError::Unsupported(file.name.clone()),
  })?;

  let original = decode_image(&file.bytes, kind).map_err(|source| PipelineError::Decode {
    name: file.name.clone(),
    source,
  })?;

  let now = std::time::Instant::now();
  let detections = detector
    .detect(&original, threshold)
    .map_err(|source| PipelineError::Inference {
      name: file.name.clone(),
      source,
    })?;
  info!(
    "{}: 推理完成, 耗时 {:.2?}, 检测到 {} 个目标",
    file.name,
    now.elapsed(),
    detections.len()
  );

  let annotated = visualizer.render(&original, &detections);
  let png = encode_png(&annotated).map_err(|source| PipelineError::Encode {
    name: file.name.clone(),
    source,
  })?;

  let lines = detections
    .iter()
    .map(|detection| {
      format!(
        "{} — {:.2}%",
        detection.class_name,
        detection.confidence * 100.0
      )
    })
    .collect();

  Ok(FileReport {
    download_name: format!("detection_{}", file.name),
    name: file.name.clone(),
    original,
    annotated,
    detections,
    lines,
    png,
  })
}

/// 顺序处理整批上传文件。单个文件失败只记录错误并跳过，
/// 不会中断其余文件的处理。
pub fn run_batch<D: Detect>(
  detector: &D,
  visualizer: &Visualizer,
  files: &[UploadedFile],
  threshold: f32,
) -> Vec<Result<FileReport, PipelineError>> {
  files
    .iter()
    .map(|file| {
      let result = process_file(detector, visualizer, file, threshold);
      if let Err(error) = &result {
        error!("{}", error);
      }
      result
    })
    .collect()
}

/// 整批写出的汇总计数
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
  pub succeeded: usize,
  pub failed: usize,
  pub detections: usize,
}

/// 将整批处理结果写出到目录：标注图像按下载名落盘，可选附带 JSON
/// 检测记录。与处理阶段一样以单个文件为失败单元，写出失败只记录
/// 错误并计入失败数，不影响其余文件。
pub fn deliver_reports(
  reports: &[Result<FileReport, PipelineError>],
  output_dir: &Path,
  records: Option<&RecordWriter>,
) -> BatchSummary {
  let mut summary = BatchSummary::default();

  for report in reports {
    let report = match report {
      Ok(report) => report,
      // 处理阶段失败的文件已记录错误，这里只计数
      Err(_) => {
        summary.failed += 1;
        continue;
      }
    };

    let path = output_dir.join(&report.download_name);
    if let Err(error) = std::fs::write(&path, &report.png) {
      error!("文件 {} 标注图像写出失败: {}", report.name, error);
      summary.failed += 1;
      continue;
    }
    info!("{}: 标注图像已写出到 {}", report.name, path.display());
    for line in &report.lines {
      info!("  - {}", line);
    }

    if let Some(writer) = records {
      if let Err(error) = writer.write(&report.name, &report.detections) {
        error!("文件 {} 检测记录写出失败: {}", report.name, error);
        summary.failed += 1;
        continue;
      }
    }

    summary.succeeded += 1;
    summary.detections += report.detections.len();
  }

  summary
}
