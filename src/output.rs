// 该文件是 Jingshi （镜识） 项目的一部分。
// src/output.rs - 输出模块
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

mod record;
mod visualizer;

pub use record::{RecordError, RecordWriter};
pub use visualizer::Visualizer;

use std::io::Cursor;

use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
  #[error("图像编码失败: {0}")]
  Image(#[from] image::ImageError),
}

/// 将 RGB 图像编码为 PNG 字节流（无损）。
/// 内部通道顺序与 PNG 编码器一致（均为 RGB），这里不做任何通道转换。
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, EncodeError> {
  let mut buffer = Cursor::new(Vec::new());
  image.write_to(&mut buffer, image::ImageFormat::Png)?;
  Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encode_png_emits_png_signature() {
    let image = RgbImage::new(5, 5);
    let bytes = encode_png(&image).expect("编码失败");
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n".as_slice());
  }
}
