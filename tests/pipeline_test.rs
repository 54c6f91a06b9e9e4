// 该文件是 Jingshi （镜识） 项目的一部分。
// tests/pipeline_test.rs - 管线集成测试
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

use image::RgbImage;

use jingshi::detector::{Detect, Detection, InferenceError, Vocabulary, clamp_threshold};
use jingshi::input::{ImageKind, decode_image};
use jingshi::output::{Visualizer, encode_png};
use jingshi::pipeline::{
  BatchSummary, PipelineError, UploadedFile, deliver_reports, process_file, run_batch,
};

/// 返回预设结果的桩检测器，只保留不低于生效阈值的条目
struct StubDetector {
  canned: Vec<Detection>,
  vocabulary: Vocabulary,
}

impl StubDetector {
  fn new(canned: Vec<Detection>) -> Self {
    Self {
      canned,
      vocabulary: Vocabulary::glasses(),
    }
  }

  fn empty() -> Self {
    Self::new(Vec::new())
  }
}

impl Detect for StubDetector {
  fn detect(&self, _image: &RgbImage, threshold: f32) -> Result<Vec<Detection>, InferenceError> {
    let threshold = clamp_threshold(threshold);
    Ok(
      self
        .canned
        .iter()
        .filter(|detection| detection.confidence >= threshold)
        .cloned()
        .collect(),
    )
  }

  fn vocabulary(&self) -> &Vocabulary {
    &self.vocabulary
  }
}

fn detection(confidence: f32) -> Detection {
  Detection {
    x: 10.0,
    y: 10.0,
    width: 20.0,
    height: 20.0,
    confidence,
    class_id: 0,
    class_name: "glasses".to_string(),
  }
}

fn gradient_image(width: u32, height: u32) -> RgbImage {
  RgbImage::from_fn(width, height, |x, y| {
    image::Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) % 256) as u8])
  })
}

fn png_bytes(image: &RgbImage) -> Vec<u8> {
  encode_png(image).expect("PNG 编码失败")
}

#[test]
fn png_roundtrip_is_lossless() {
  let image = gradient_image(33, 17);
  let decoded = decode_image(&png_bytes(&image), ImageKind::Png).expect("解码失败");
  assert_eq!(decoded.dimensions(), (33, 17));
  assert_eq!(decoded, image);
}

#[test]
fn jpeg_roundtrip_keeps_dimensions() {
  let image = gradient_image(48, 32);
  let mut buffer = std::io::Cursor::new(Vec::new());
  image
    .write_to(&mut buffer, image::ImageFormat::Jpeg)
    .expect("JPEG 编码失败");

  let decoded = decode_image(&buffer.into_inner(), ImageKind::Jpeg).expect("解码失败");
  // JPEG 有损，只要求尺寸不变
  assert_eq!(decoded.dimensions(), (48, 32));
}

#[test]
fn threshold_filters_low_confidence_detections() {
  let detector = StubDetector::new(vec![detection(0.91), detection(0.42)]);
  let image = gradient_image(64, 64);

  let detections = detector.detect(&image, 0.5).expect("推理失败");
  assert_eq!(detections.len(), 1);
  assert_eq!(detections[0].confidence, 0.91);
  for detection in &detections {
    assert!(detection.confidence >= 0.5);
  }
}

#[test]
fn threshold_one_yields_empty_result() {
  let detector = StubDetector::new(vec![detection(0.91), detection(0.99)]);
  let image = gradient_image(64, 64);

  let detections = detector.detect(&image, 1.0).expect("推理失败");
  assert!(detections.is_empty());
}

#[test]
fn out_of_range_threshold_is_clamped() {
  let detector = StubDetector::new(vec![detection(0.91)]);
  let image = gradient_image(64, 64);

  // 大于 1 收拢为 1：没有检测可以通过
  assert!(detector.detect(&image, 4.2).expect("推理失败").is_empty());
  // 小于 0 收拢为 0：全部通过
  assert_eq!(detector.detect(&image, -0.5).expect("推理失败").len(), 1);
}

#[test]
fn render_never_mutates_its_input() {
  let image = gradient_image(64, 64);
  let snapshot = image.clone();

  let annotated = Visualizer::new().render(&image, &[detection(0.9)]);
  assert_eq!(image, snapshot);
  // 标注副本确实被画上了内容
  assert_ne!(annotated, snapshot);
}

#[test]
fn black_image_with_no_detections_renders_identically() {
  // 100x100 全黑图像，阈值 0.3：无检测，标注副本与原图一致
  let image = RgbImage::new(100, 100);
  let detector = StubDetector::empty();

  let detections = detector.detect(&image, 0.3).expect("推理失败");
  assert!(detections.is_empty());

  let annotated = Visualizer::new().render(&image, &detections);
  assert_eq!(annotated, image);
}

#[test]
fn corrupt_file_is_skipped_and_named() {
  let valid = png_bytes(&gradient_image(64, 64));
  let truncated = valid[..valid.len() / 2].to_vec();

  let files = vec![
    UploadedFile::new("broken.png", truncated),
    UploadedFile::new("ok.png", valid),
  ];
  let detector = StubDetector::new(vec![detection(0.9)]);
  let visualizer = Visualizer::new();

  let reports = run_batch(&detector, &visualizer, &files, 0.3);
  assert_eq!(reports.len(), 2);

  let error = reports[0].as_ref().expect_err("截断文件必须解码失败");
  assert!(matches!(error, PipelineError::Decode { .. }));
  assert_eq!(error.file_name(), "broken.png");
  assert!(error.to_string().contains("broken.png"));

  let report = reports[1].as_ref().expect("有效文件必须处理成功");
  assert_eq!(report.download_name, "detection_ok.png");
  assert_eq!(report.detections.len(), 1);
  assert_eq!(report.original.dimensions(), (64, 64));
  assert!(!report.png.is_empty());
}

#[test]
fn unsupported_extension_is_a_decode_error() {
  let detector = StubDetector::empty();
  let visualizer = Visualizer::new();
  let file = UploadedFile::new("notes.txt", b"hello".to_vec());

  let error = process_file(&detector, &visualizer, &file, 0.3)
    .expect_err("白名单之外的格式必须拒绝");
  assert!(matches!(error, PipelineError::Decode { .. }));
  assert_eq!(error.file_name(), "notes.txt");
}

#[test]
fn delivery_failure_does_not_abort_remaining_files() {
  let output_dir = std::env::temp_dir().join(format!(
    "jingshi-deliver-{}-{}",
    std::process::id(),
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
  ));
  std::fs::create_dir_all(&output_dir).expect("无法创建输出目录");
  // 占住 bad.png 的下载名，使对应的 fs::write 失败
  std::fs::create_dir(output_dir.join("detection_bad.png")).expect("无法创建占位目录");

  let valid = png_bytes(&gradient_image(64, 64));
  let files = vec![
    UploadedFile::new("bad.png", valid.clone()),
    UploadedFile::new("ok.png", valid),
  ];
  let detector = StubDetector::new(vec![detection(0.9)]);
  let visualizer = Visualizer::new();

  let reports = run_batch(&detector, &visualizer, &files, 0.3);
  let summary = deliver_reports(&reports, &output_dir, None);

  // 第一个文件写出失败只计入失败数，第二个文件照常落盘
  assert_eq!(
    summary,
    BatchSummary {
      succeeded: 1,
      failed: 1,
      detections: 1,
    }
  );
  assert!(output_dir.join("detection_ok.png").is_file());

  std::fs::remove_dir_all(&output_dir).expect("无法清理输出目录");
}

#[test]
fn report_lines_carry_two_decimal_percentage() {
  let detector = StubDetector::new(vec![detection(0.905)]);
  let visualizer = Visualizer::new();
  let file = UploadedFile::new("selfie.png", png_bytes(&gradient_image(32, 32)));

  let report = process_file(&detector, &visualizer, &file, 0.3).expect("处理失败");
  assert_eq!(report.lines, vec!["glasses — 90.50%".to_string()]);
}
