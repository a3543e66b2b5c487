// 该文件是 Jishu （计数） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, url_file_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法读取图像文件 {path}: {source}")]
  IoError {
    path: String,
    source: std::io::Error,
  },
  #[error("无法解码图像文件 {path}: {source}")]
  ImageLoadError {
    path: String,
    source: image::ImageError,
  },
}

/// 只产生一帧的图像文件输入
pub struct ImageFileInput {
  image: Option<Frame>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = url_file_path(url);
    let image = ImageReader::open(&path)
      .map_err(|source| ImageFileInputError::IoError {
        path: path.clone(),
        source,
      })?
      .with_guessed_format()
      .map_err(|source| ImageFileInputError::IoError {
        path: path.clone(),
        source,
      })?
      .decode()
      .map_err(|source| ImageFileInputError::ImageLoadError {
        path: path.clone(),
        source,
      })?;

    let frame = Frame::from(image.into_rgb8());
    info!("读取图像 {}: {}x{}", path, frame.width(), frame.height());

    Ok(ImageFileInput { image: Some(frame) })
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}
