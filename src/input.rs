// 该文件是 Jishu （计数） 项目的一部分。
// src/input.rs - 图像/摄像头输入
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

use thiserror::Error;

use crate::frame::Frame;

pub mod capture;
pub use self::capture::{
  CaptureError, CaptureOutcome, CaptureState, InteractiveCapture, Key, KeyBindings, Preview,
  strip_gui_modifiers,
};

mod terminal_preview;
pub use self::terminal_preview::TerminalPreview;

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "camera_v4l")]
mod v4l_camera;
#[cfg(feature = "camera_v4l")]
pub use self::v4l_camera::{V4lCamera, V4lCameraError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "camera_v4l")]
  #[error("摄像头输入错误: {0}")]
  V4lCameraError(#[from] V4lCameraError),
  #[error("拍照错误: {0}")]
  CaptureError(#[from] CaptureError),
  #[cfg(feature = "highgui")]
  #[error("预览窗口错误: {0}")]
  HighGuiError(#[from] crate::output::HighGuiError),
}

/// 预览方式
pub enum PreviewWrapper {
  Terminal(TerminalPreview),
  #[cfg(feature = "highgui")]
  Window(crate::output::HighGuiWindow),
}

impl Preview for PreviewWrapper {
  type Error = InputError;

  fn show(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    match self {
      PreviewWrapper::Terminal(preview) => match preview.show(frame) {
        Ok(()) => Ok(()),
        Err(never) => match never {},
      },
      #[cfg(feature = "highgui")]
      PreviewWrapper::Window(window) => window.show(frame).map_err(InputError::from),
    }
  }

  fn poll_key(&mut self) -> Result<Option<i32>, Self::Error> {
    match self {
      PreviewWrapper::Terminal(preview) => match preview.poll_key() {
        Ok(key) => Ok(key),
        Err(never) => match never {},
      },
      #[cfg(feature = "highgui")]
      PreviewWrapper::Window(window) => window.poll_key().map_err(InputError::from),
    }
  }
}
