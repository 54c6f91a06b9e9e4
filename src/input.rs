// 该文件是 Jingshi （镜识） 项目的一部分。
// src/input.rs - 图像摄入
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
use thiserror::Error;
use tracing::debug;

/// 支持的上传图像格式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
  Jpeg,
  Png,
}

impl ImageKind {
  /// 根据文件名后缀判断声明格式，不在白名单内返回 None
  pub fn from_name(name: &str) -> Option<Self> {
    let lower = name.to_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
      Some(ImageKind::Jpeg)
    } else if lower.ends_with(".png") {
      Some(ImageKind::Png)
    } else {
      None
    }
  }

  fn format(self) -> image::ImageFormat {
    match self {
      ImageKind::Jpeg => image::ImageFormat::Jpeg,
      ImageKind::Png => image::ImageFormat::Png,
    }
  }
}

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("不支持的图像格式: {0}")]
  Unsupported(String),
  #[error("图像解码失败: {0}")]
  Malformed(#[from] image::ImageError),
}

/// 将上传的字节流按声明格式解码为 RGB 图像。
/// 输出一律归一化为 8 位 RGB 通道顺序，后续各环节不再做通道转换。
pub fn decode_image(bytes: &[u8], kind: ImageKind) -> Result<RgbImage, DecodeError> {
  debug!("解码 {:?} 图像, {} 字节", kind, bytes.len());
  let image = image::load_from_memory_with_format(bytes, kind.format())?;
  Ok(image.to_rgb8())
}
