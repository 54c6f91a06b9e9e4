// 该文件是 Jingshi （镜识） 项目的一部分。
// src/detector/yolo.rs - YOLO 目标检测器（ONNX Runtime 后端）
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

use image::RgbImage;
use ndarray::{Array4, ArrayD, ArrayView2, Axis, CowArray, Ix3};
use ort::execution_providers::CPU as CPUExecutionProvider;
use ort::session::Session;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use tracing::{debug, info};

use crate::detector::{
  Detect, Detection, InferenceError, LoadError, Vocabulary, clamp_threshold,
};

const YOLO_INPUT_SIZE: u32 = 640;
const YOLO_BOX_CHANNELS: usize = 4;
const YOLO_NMS_IOU: f32 = 0.45;

/// 检测器配置
#[derive(Clone, Debug)]
pub struct DetectorConfig {
  /// ONNX 模型文件路径
  pub model_path: PathBuf,
  /// 标签文件路径，缺省使用内置眼镜词表
  pub labels: Option<PathBuf>,
  /// 模型输入边长
  pub input_size: u32,
  /// NMS IOU 阈值
  pub nms_threshold: f32,
}

impl DetectorConfig {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      labels: None,
      input_size: YOLO_INPUT_SIZE,
      nms_threshold: YOLO_NMS_IOU,
    }
  }

  pub fn with_labels(mut self, labels: impl Into<PathBuf>) -> Self {
    self.labels = Some(labels.into());
    self
  }

  pub fn with_input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn with_nms_threshold(mut self, nms_threshold: f32) -> Self {
    self.nms_threshold = nms_threshold;
    self
  }
}

/// YOLO 目标检测器。模型加载一次后只读，可安全地在多次调用间共享。
pub struct YoloDetector {
  session: std::sync::Mutex<Session>,
  vocabulary: Vocabulary,
  input_size: u32,
  nms_threshold: f32,
}

impl YoloDetector {
  /// 从 ONNX 模型文件加载检测器，失败应视为启动致命错误
  pub fn load(config: &DetectorConfig) -> Result<Self, LoadError> {
    if !config.model_path.exists() {
      return Err(LoadError::Missing(config.model_path.clone()));
    }

    let vocabulary = match &config.labels {
      Some(path) => {
        let vocabulary = Vocabulary::from_file(path).map_err(LoadError::Labels)?;
        if vocabulary.is_empty() {
          return Err(LoadError::EmptyVocabulary(path.clone()));
        }
        vocabulary
      }
      None => Vocabulary::glasses(),
    };

    info!("加载模型文件: {}", config.model_path.display());
    let session = SessionBuilder::new()?
      .with_execution_providers([CPUExecutionProvider::default().build()])
      .map_err(ort::Error::from)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(ort::Error::from)?
      .commit_from_file(&config.model_path)?;
    info!("模型加载完成, 词表大小: {}", vocabulary.len());

    Ok(Self {
      session: std::sync::Mutex::new(session),
      vocabulary,
      input_size: config.input_size,
      nms_threshold: config.nms_threshold,
    })
  }

  /// 预处理：缩放到模型输入尺寸，归一化为 [0, 1] 的 NCHW 浮点张量。
  /// 输入图像已经是 RGB 通道顺序，与模型训练约定一致。
  fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
    let size = self.input_size;
    let resized = image::imageops::resize(
      image,
      size,
      size,
      image::imageops::FilterType::Triangle,
    );

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
      for channel in 0..3 {
        tensor[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
      }
    }
    tensor
  }

  /// 后处理：过滤置信度、还原到原图坐标并做类内 NMS。
  /// 期望输出形状为 (1, 4 + 类别数, 锚点数)，兼容转置布局。
  fn postprocess(
    &self,
    preds: ArrayD<f32>,
    original_width: u32,
    original_height: u32,
    threshold: f32,
  ) -> Result<Vec<Detection>, InferenceError> {
    let shape = preds.shape().to_vec();
    let preds = preds
      .into_dimensionality::<Ix3>()
      .map_err(|_| InferenceError::BadOutput(shape.clone()))?;
    if preds.shape()[0] != 1 {
      return Err(InferenceError::BadOutput(shape));
    }

    let expected_channels = YOLO_BOX_CHANNELS + self.vocabulary.len();
    let view = orient_output(preds.index_axis(Axis(0), 0), expected_channels);

    if view.nrows() <= YOLO_BOX_CHANNELS {
      return Err(InferenceError::BadOutput(shape));
    }
    let num_classes = view.nrows() - YOLO_BOX_CHANNELS;
    let anchors = view.ncols();

    let scale_x = original_width as f32 / self.input_size as f32;
    let scale_y = original_height as f32 / self.input_size as f32;
    let max_x = original_width as f32;
    let max_y = original_height as f32;

    let mut detections = Vec::new();
    for anchor in 0..anchors {
      // 逐类别取最高分，导出模型的类别分数已经过 sigmoid
      let mut confidence = 0.0f32;
      let mut class_id = 0usize;
      for class in 0..num_classes {
        let score = view[[YOLO_BOX_CHANNELS + class, anchor]];
        if score > confidence {
          confidence = score;
          class_id = class;
        }
      }

      if confidence < threshold {
        continue;
      }

      // 中心点宽高均为模型输入尺度像素，缩放回原图
      let cx = view[[0, anchor]] * scale_x;
      let cy = view[[1, anchor]] * scale_y;
      let w = view[[2, anchor]] * scale_x;
      let h = view[[3, anchor]] * scale_y;

      // 收拢到图像范围内
      let x = (cx - w / 2.0).clamp(0.0, max_x - 1.0);
      let y = (cy - h / 2.0).clamp(0.0, max_y - 1.0);
      let width = w.min(max_x - x);
      let height = h.min(max_y - y);

      if width <= 0.0 || height <= 0.0 {
        continue;
      }

      detections.push(Detection {
        x,
        y,
        width,
        height,
        confidence,
        class_id,
        class_name: self.vocabulary.name(class_id).to_string(),
      });
    }

    debug!("阈值过滤后剩余 {} 个候选框", detections.len());
    Ok(nms(detections, self.nms_threshold))
  }
}

impl Detect for YoloDetector {
  fn detect(&self, image: &RgbImage, threshold: f32) -> Result<Vec<Detection>, InferenceError> {
    let threshold = clamp_threshold(threshold);

    let tensor = self.preprocess(image);
    let input = CowArray::from(tensor.into_dyn());

    debug!("执行模型推理");
    let mut session = self
      .session
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner);
    let outputs =
      session.run(ort::inputs![ort::value::TensorRef::from_array_view(input.view())?])?;
    let (_name, value) = outputs
      .iter()
      .next()
      .ok_or(InferenceError::MissingOutput)?;
    let preds = value.try_extract_array::<f32>()?.to_owned();

    self.postprocess(preds, image.width(), image.height(), threshold)
  }

  fn vocabulary(&self) -> &Vocabulary {
    &self.vocabulary
  }
}

/// 将模型输出统一为 (通道, 锚点) 布局。优先按词表推出的通道数匹配
/// 两个轴；两个轴都对不上时退回尺寸启发式，锚点数通常远大于通道数。
fn orient_output(view: ArrayView2<'_, f32>, expected_channels: usize) -> ArrayView2<'_, f32> {
  if view.nrows() == expected_channels {
    view
  } else if view.ncols() == expected_channels {
    debug!("模型输出为 (锚点, 通道) 布局, 转置处理");
    view.reversed_axes()
  } else if view.nrows() > view.ncols() {
    debug!("通道数与词表不一致, 按尺寸启发式转置处理");
    view.reversed_axes()
  } else {
    view
  }
}

/// 非极大值抑制：按置信度降序保留，同类且重叠过大的丢弃
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut kept: Vec<Detection> = Vec::new();
  for candidate in detections {
    let suppressed = kept
      .iter()
      .any(|best| best.class_id == candidate.class_id && iou(best, &candidate) > iou_threshold);
    if !suppressed {
      kept.push(candidate);
    }
  }
  kept
}

/// 计算两个边界框的 IoU
fn iou(a: &Detection, b: &Detection) -> f32 {
  let x1 = a.x.max(b.x);
  let y1 = a.y.max(b.y);
  let x2 = (a.x + a.width).min(b.x + b.width);
  let y2 = (a.y + a.height).min(b.y + b.height);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.width * a.height + b.width * b.height - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::Array2;

  fn detection(x: f32, y: f32, side: f32, confidence: f32, class_id: usize) -> Detection {
    Detection {
      x,
      y,
      width: side,
      height: side,
      confidence,
      class_id,
      class_name: "glasses".to_string(),
    }
  }

  #[test]
  fn orient_output_keeps_channel_first_even_with_few_anchors() {
    // 6 通道 3 锚点：行数大于列数，但行数与通道数一致，不应转置
    let preds = Array2::<f32>::zeros((6, 3));
    let view = orient_output(preds.view(), 6);
    assert_eq!(view.nrows(), 6);
    assert_eq!(view.ncols(), 3);
  }

  #[test]
  fn orient_output_transposes_anchor_first_layout() {
    let preds = Array2::<f32>::zeros((3, 6));
    let view = orient_output(preds.view(), 6);
    assert_eq!(view.nrows(), 6);
    assert_eq!(view.ncols(), 3);
  }

  #[test]
  fn orient_output_falls_back_to_size_heuristic() {
    // 通道数与词表对不上时，按锚点数远大于通道数的惯例转置
    let preds = Array2::<f32>::zeros((8400, 10));
    let view = orient_output(preds.view(), 6);
    assert_eq!(view.nrows(), 10);
    assert_eq!(view.ncols(), 8400);
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let a = detection(10.0, 10.0, 20.0, 0.9, 0);
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    let a = detection(0.0, 0.0, 10.0, 0.9, 0);
    let b = detection(50.0, 50.0, 10.0, 0.9, 0);
    assert_eq!(iou(&a, &b), 0.0);
  }

  #[test]
  fn nms_drops_overlapping_same_class() {
    let strong = detection(10.0, 10.0, 20.0, 0.9, 0);
    let weak = detection(12.0, 12.0, 20.0, 0.6, 0);
    let kept = nms(vec![weak, strong], 0.45);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].confidence, 0.9);
  }

  #[test]
  fn nms_keeps_overlapping_different_classes() {
    let glasses = detection(10.0, 10.0, 20.0, 0.9, 0);
    let sunglasses = detection(12.0, 12.0, 20.0, 0.6, 1);
    let kept = nms(vec![glasses, sunglasses], 0.45);
    assert_eq!(kept.len(), 2);
  }
}
