// 该文件是 Jishu （计数） 项目的一部分。
// src/input/v4l_camera.rs - V4L2 摄像头输入
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

use std::pin::Pin;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, url_file_path};

const V4L_DEFAULT_DEVICE: &str = "/dev/video0";
const V4L_DEFAULT_WIDTH: u32 = 640;
const V4L_DEFAULT_HEIGHT: u32 = 480;
const V4L_BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum V4lCameraError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法打开摄像头 {path}: {source}")]
  OpenError {
    path: String,
    source: std::io::Error,
  },
  #[error("摄像头格式设置失败: {0}")]
  FormatError(std::io::Error),
  #[error("无法创建捕获流: {0}")]
  StreamError(std::io::Error),
  #[error("无法捕获帧: {0}")]
  CaptureError(std::io::Error),
  #[error("不支持的像素格式: {0}")]
  UnsupportedPixelFormat(String),
  #[error("帧数据无效: {0}")]
  InvalidFrame(String),
  #[error("参数错误: {0}")]
  InvalidParameter(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
  Yuyv,
  Mjpg,
}

impl PixelFormat {
  fn fourcc(&self) -> FourCC {
    match self {
      PixelFormat::Yuyv => FourCC::new(b"YUYV"),
      PixelFormat::Mjpg => FourCC::new(b"MJPG"),
    }
  }
}

/// V4L2 摄像头
///
/// `Stream` 需要引用 `Device`，所以 `Device` 放在 `Pin<Box>` 里固定地址，
/// 并保证 `stream` 先于 `device` 释放。
pub struct V4lCamera {
  device: Pin<Box<Device>>,
  stream: Option<Stream<'static>>,
  path: String,
  format: PixelFormat,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for V4lCamera {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lCamera {
  type Error = V4lCameraError;

  /// `v4l:///dev/video0?width=640&height=480&format=yuyv`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lCameraError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = match url_file_path(url) {
      p if p.is_empty() || p == "/" => V4L_DEFAULT_DEVICE.to_string(),
      p => p,
    };

    let mut width = V4L_DEFAULT_WIDTH;
    let mut height = V4L_DEFAULT_HEIGHT;
    let mut format = PixelFormat::Yuyv;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "width" => {
          width = v
            .parse()
            .map_err(|_| V4lCameraError::InvalidParameter(format!("width={}", v)))?
        }
        "height" => {
          height = v
            .parse()
            .map_err(|_| V4lCameraError::InvalidParameter(format!("height={}", v)))?
        }
        "format" => {
          format = match v.to_ascii_lowercase().as_str() {
            "yuyv" => PixelFormat::Yuyv,
            "mjpg" | "mjpeg" => PixelFormat::Mjpg,
            other => return Err(V4lCameraError::UnsupportedPixelFormat(other.to_string())),
          }
        }
        _ => debug!("忽略未知参数: {}={}", k, v),
      }
    }

    Self::open(&path, width, height, format)
  }
}

impl V4lCamera {
  fn open(path: &str, width: u32, height: u32, format: PixelFormat) -> Result<Self, V4lCameraError> {
    info!("打开摄像头: {}", path);
    let device = Box::pin(Device::with_path(path).map_err(|source| {
      V4lCameraError::OpenError {
        path: path.to_string(),
        source,
      }
    })?);

    let mut fmt = device.format().map_err(V4lCameraError::FormatError)?;
    fmt.width = width;
    fmt.height = height;
    fmt.fourcc = format.fourcc();
    let fmt = device.set_format(&fmt).map_err(V4lCameraError::FormatError)?;

    if fmt.fourcc != format.fourcc() {
      return Err(V4lCameraError::UnsupportedPixelFormat(fmt.fourcc.to_string()));
    }
    info!("摄像头格式: {}x{} {}", fmt.width, fmt.height, fmt.fourcc);

    let mut camera = Self {
      device,
      stream: None,
      path: path.to_string(),
      format,
      width: fmt.width,
      height: fmt.height,
    };

    let device_ref: &Device = &camera.device;
    // SAFETY: device 固定在堆上不会移动；stream 在 Drop 中先于 device 释放
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, V4L_BUFFER_COUNT)
        .map_err(V4lCameraError::StreamError)?
    };

    camera.stream = Some(stream);
    Ok(camera)
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  fn decode(&self, buffer: &[u8]) -> Result<Frame, V4lCameraError> {
    match self.format {
      PixelFormat::Yuyv => {
        let rgb = yuyv_to_rgb(buffer, self.width, self.height);
        Frame::from_raw(self.width, self.height, rgb).ok_or_else(|| {
          V4lCameraError::InvalidFrame(format!(
            "YUYV 缓冲区大小 {} 与 {}x{} 不匹配",
            buffer.len(),
            self.width,
            self.height
          ))
        })
      }
      PixelFormat::Mjpg => image::load_from_memory_with_format(buffer, image::ImageFormat::Jpeg)
        .map(|image| Frame::from(image.into_rgb8()))
        .map_err(|e| V4lCameraError::InvalidFrame(e.to_string())),
    }
  }
}

/// 将 YUYV 格式转换为 RGB
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let mut rgb = Vec::with_capacity((width * height * 3) as usize);

  for chunk in yuyv.chunks_exact(4) {
    let y0 = chunk[0] as f32;
    let u = chunk[1] as f32 - 128.0;
    let y1 = chunk[2] as f32;
    let v = chunk[3] as f32 - 128.0;

    for y in [y0, y1] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

impl Drop for V4lCamera {
  fn drop(&mut self) {
    // stream 必须先于 device 释放
    self.stream.take();
    info!("摄像头已释放: {}", self.path);
  }
}

impl Iterator for V4lCamera {
  type Item = Result<Frame, V4lCameraError>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;

    let buffer = match stream.next() {
      Ok((buffer, meta)) => {
        let used = (meta.bytesused as usize).min(buffer.len());
        if used == 0 { buffer } else { &buffer[..used] }
      }
      Err(e) => return Some(Err(V4lCameraError::CaptureError(e))),
    };
    let buffer = buffer.to_vec();

    Some(self.decode(&buffer))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_gray_maps_to_gray() {
    let rgb = yuyv_to_rgb(&[128, 128, 64, 128], 2, 1);
    assert_eq!(rgb, vec![128, 128, 128, 64, 64, 64]);
  }

  #[test]
  fn yuyv_ignores_trailing_partial_chunk() {
    let rgb = yuyv_to_rgb(&[0, 128, 255, 128, 7, 7], 2, 1);
    assert_eq!(rgb.len(), 6);
    assert_eq!(&rgb[3..], &[255, 255, 255]);
  }

  #[test]
  fn missing_device_is_an_open_error() {
    let url = Url::parse("v4l:///dev/no-such-video-device").unwrap();
    let err = V4lCamera::from_url(&url).err().unwrap();
    assert!(matches!(err, V4lCameraError::OpenError { .. }));
  }

  #[test]
  fn unknown_pixel_format_is_rejected() {
    let url = Url::parse("v4l:///dev/video0?format=nv12").unwrap();
    assert!(matches!(
      V4lCamera::from_url(&url),
      Err(V4lCameraError::UnsupportedPixelFormat(_))
    ));
  }
}
