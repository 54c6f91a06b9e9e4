// 该文件是 Jingshi （镜识） 项目的一部分。
// src/detector.rs - 检测器定义
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
use std::sync::{Arc, OnceLock};

use image::RgbImage;
use thiserror::Error;
use tracing::warn;

mod yolo;
pub use yolo::{DetectorConfig, YoloDetector};

/// 默认的眼镜检测标签（模型导出为 ONNX 后不再携带 names 元数据）
pub const GLASSES_CLASSES: [&str; 2] = ["glasses", "sunglasses"];

/// 未知类别的占位名称
const UNKNOWN_LABEL: &str = "unknown";

/// 标签词表：类别编号到可读名称的有序映射，加载后只读
#[derive(Clone, Debug)]
pub struct Vocabulary {
  names: Vec<String>,
}

impl Vocabulary {
  pub fn new(names: Vec<String>) -> Self {
    Self { names }
  }

  /// 内置的眼镜检测词表
  pub fn glasses() -> Self {
    Self::new(GLASSES_CLASSES.iter().map(|name| name.to_string()).collect())
  }

  /// 从标签文件加载词表，每行一个类别名，空行忽略
  pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let names = content
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(String::from)
      .collect();
    Ok(Self::new(names))
  }

  /// 查询类别名称，超出词表范围时返回占位名称
  pub fn name(&self, class_id: usize) -> &str {
    self
      .names
      .get(class_id)
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

impl Default for Vocabulary {
  fn default() -> Self {
    Self::glasses()
  }
}

/// 检测结果
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
  /// 边界框左上角 x 坐标（原图像素）
  pub x: f32,
  /// 边界框左上角 y 坐标（原图像素）
  pub y: f32,
  /// 边界框宽度
  pub width: f32,
  /// 边界框高度
  pub height: f32,
  /// 置信度，[0, 1]
  pub confidence: f32,
  /// 类别编号
  pub class_id: usize,
  /// 类别名称
  pub class_name: String,
}

#[derive(Error, Debug)]
pub enum LoadError {
  #[error("模型文件不存在: {0}")]
  Missing(PathBuf),
  #[error("模型加载失败: {0}")]
  Session(#[from] ort::Error),
  #[error("标签文件读取失败: {0}")]
  Labels(std::io::Error),
  #[error("标签词表为空: {0}")]
  EmptyVocabulary(PathBuf),
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("推理执行失败: {0}")]
  Session(#[from] ort::Error),
  #[error("模型无输出张量")]
  MissingOutput,
  #[error("模型输出形状异常: {0:?}")]
  BadOutput(Vec<usize>),
}

/// 检测器接口：对一张 RGB 图像做同步推理。
/// 空结果是合法输出；各实现必须保证返回的置信度不低于生效阈值，
/// 且边界框落在图像范围之内。
pub trait Detect {
  fn detect(&self, image: &RgbImage, threshold: f32) -> Result<Vec<Detection>, InferenceError>;

  fn vocabulary(&self) -> &Vocabulary;
}

/// 将调用方给出的阈值收拢到闭区间 [0, 1]
pub fn clamp_threshold(threshold: f32) -> f32 {
  if !(0.0..=1.0).contains(&threshold) {
    warn!("置信度阈值 {} 超出 [0, 1]，已收拢", threshold);
  }
  threshold.clamp(0.0, 1.0)
}

static SHARED: OnceLock<Arc<YoloDetector>> = OnceLock::new();

/// 进程级共享检测器。首次调用按配置加载模型，之后的调用无论配置
/// 如何都返回同一实例；加载失败不会占用单次初始化机会，可以重试。
pub fn shared_detector(config: &DetectorConfig) -> Result<Arc<YoloDetector>, LoadError> {
  if let Some(detector) = SHARED.get() {
    return Ok(detector.clone());
  }
  let detector = Arc::new(YoloDetector::load(config)?);
  Ok(SHARED.get_or_init(|| detector).clone())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn vocabulary_maps_ids_in_order() {
    let vocabulary = Vocabulary::glasses();
    assert_eq!(vocabulary.name(0), "glasses");
    assert_eq!(vocabulary.name(1), "sunglasses");
    assert_eq!(vocabulary.len(), 2);
  }

  #[test]
  fn vocabulary_falls_back_on_unknown_id() {
    let vocabulary = Vocabulary::new(vec!["glasses".to_string()]);
    assert_eq!(vocabulary.name(7), "unknown");
  }

  #[test]
  fn threshold_is_clamped_into_unit_range() {
    assert_eq!(clamp_threshold(-0.5), 0.0);
    assert_eq!(clamp_threshold(0.3), 0.3);
    assert_eq!(clamp_threshold(1.7), 1.0);
  }
}
