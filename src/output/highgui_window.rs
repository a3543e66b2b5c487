// 该文件是 Jishu （计数） 项目的一部分。
// src/output/highgui_window.rs - OpenCV HighGUI 窗口显示
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

use std::cell::Cell;

use image::RgbImage;
use opencv::{
  core::{CV_8UC3, Mat, Scalar},
  highgui, imgproc,
  prelude::*,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::{Preview, strip_gui_modifiers},
  output::{Render, draw::AnnotatedFrame},
};

const DEFAULT_WINDOW_NAME: &str = "Detection Result";

#[derive(Error, Debug)]
pub enum HighGuiError {
  #[error("OpenCV 错误: {0}")]
  OpenCvError(#[from] opencv::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// HighGUI 窗口，释放时销毁窗口
pub struct HighGuiWindow {
  name: String,
  opened: Cell<bool>,
}

impl FromUrlWithScheme for HighGuiWindow {
  const SCHEME: &'static str = "window";
}

impl FromUrl for HighGuiWindow {
  type Error = HighGuiError;

  /// `window:` 或 `window:Live%20Camera`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(HighGuiError::SchemeMismatch(url.scheme().to_string()));
    }
    let name = crate::url_file_path(url);
    let name = name.trim_start_matches('/');
    Ok(Self::new(if name.is_empty() {
      DEFAULT_WINDOW_NAME
    } else {
      name
    }))
  }
}

impl HighGuiWindow {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      opened: Cell::new(false),
    }
  }

  fn imshow(&self, image: &RgbImage) -> Result<(), HighGuiError> {
    if !self.opened.get() {
      highgui::named_window(&self.name, highgui::WINDOW_AUTOSIZE)?;
      self.opened.set(true);
      debug!("打开窗口: {}", self.name);
    }
    let mat = to_bgr_mat(image)?;
    highgui::imshow(&self.name, &mat)?;
    Ok(())
  }
}

impl Drop for HighGuiWindow {
  fn drop(&mut self) {
    if self.opened.get() {
      if let Err(e) = highgui::destroy_window(&self.name) {
        warn!("销毁窗口失败: {}", e);
      }
      debug!("窗口已关闭: {}", self.name);
    }
  }
}

/// RGB 图像转为 OpenCV 的 BGR 矩阵
fn to_bgr_mat(image: &RgbImage) -> Result<Mat, opencv::Error> {
  let mut rgb = Mat::new_rows_cols_with_default(
    image.height() as i32,
    image.width() as i32,
    CV_8UC3,
    Scalar::all(0.0),
  )?;
  rgb.data_bytes_mut()?.copy_from_slice(image.as_raw());
  let mut bgr = Mat::default();
  imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
  Ok(bgr)
}

impl Render for HighGuiWindow {
  type Error = HighGuiError;

  /// 显示标注图并阻塞到任意按键
  fn render_result(&self, annotated: &AnnotatedFrame) -> Result<(), Self::Error> {
    self.imshow(&annotated.image)?;
    info!("按任意键关闭窗口");
    highgui::wait_key(0)?;
    highgui::destroy_window(&self.name)?;
    self.opened.set(false);
    Ok(())
  }
}

impl Preview for HighGuiWindow {
  type Error = HighGuiError;

  fn show(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    self.imshow(frame.image())
  }

  fn poll_key(&mut self) -> Result<Option<i32>, Self::Error> {
    Ok(strip_gui_modifiers(highgui::wait_key(1)?))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn bgr_mat_swaps_red_and_blue() {
    let mut image = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
    image.put_pixel(2, 1, Rgb([255, 0, 7]));

    let mat = to_bgr_mat(&image).unwrap();
    assert_eq!((mat.rows(), mat.cols()), (2, 3));
    let bytes = mat.data_bytes().unwrap();
    assert_eq!(&bytes[0..3], &[30, 20, 10]);
    assert_eq!(&bytes[15..18], &[7, 0, 255]);
  }

  #[test]
  fn window_name_comes_from_url() {
    let url = Url::parse("window:Live%20Camera").unwrap();
    assert_eq!(HighGuiWindow::from_url(&url).unwrap().name, "Live Camera");
    let url = Url::parse("window:").unwrap();
    assert_eq!(HighGuiWindow::from_url(&url).unwrap().name, DEFAULT_WINDOW_NAME);
  }
}
