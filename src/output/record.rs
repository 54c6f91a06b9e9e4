// 该文件是 Jingshi （镜识） 项目的一部分。
// src/output/record.rs - 检测记录输出
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

use std::path::PathBuf;

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::detector::Detection;

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// 检测记录写出器：为每张图像生成一个 JSON 记录文件
pub struct RecordWriter {
  directory: PathBuf,
}

impl RecordWriter {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  /// 写出一条检测记录，返回记录文件路径
  pub fn write(&self, name: &str, detections: &[Detection]) -> Result<PathBuf, RecordError> {
    std::fs::create_dir_all(&self.directory)?;

    let path = self.directory.join(format!("detection_{}.json", name));
    let record = record_value(name, detections);
    std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;
    debug!("检测记录已写出: {}", path.display());

    Ok(path)
  }
}

/// 组装单张图像的检测记录
fn record_value(name: &str, detections: &[Detection]) -> serde_json::Value {
  serde_json::json!({
    "file": name,
    "recorded_at": Utc::now().to_rfc3339(),
    "detections": detections
      .iter()
      .map(|detection| {
        serde_json::json!({
          "class_id": detection.class_id,
          "label": detection.class_name,
          "confidence": detection.confidence,
          "bbox": [detection.x, detection.y, detection.width, detection.height],
        })
      })
      .collect::<Vec<_>>(),
  })
}
