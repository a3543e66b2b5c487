// 该文件是 Jishu （计数） 项目的一部分。
// src/output.rs - 输出定义
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
use url::Url;

use crate::FromUrl;
#[cfg(any(feature = "save_image_file", feature = "record_output", feature = "highgui"))]
use crate::FromUrlWithScheme;

pub trait Render {
  type Error;
  fn render_result(&self, annotated: &AnnotatedFrame) -> Result<(), Self::Error>;
}

impl<R: Render + ?Sized> Render for &R {
  type Error = R::Error;

  fn render_result(&self, annotated: &AnnotatedFrame) -> Result<(), Self::Error> {
    (**self).render_result(annotated)
  }
}

pub mod draw;
pub use self::draw::{AnnotatedFrame, Draw, Geometry, Label};

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "record_output")]
mod record;
#[cfg(feature = "record_output")]
pub use self::record::{RecordOutput, RecordOutputError, report_json};

#[cfg(feature = "highgui")]
mod highgui_window;
#[cfg(feature = "highgui")]
pub use self::highgui_window::{HighGuiError, HighGuiWindow};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "record_output")]
  #[error("记录输出错误: {0}")]
  RecordOutputError(#[from] RecordOutputError),
  #[cfg(feature = "highgui")]
  #[error("窗口显示错误: {0}")]
  HighGuiError(#[from] HighGuiError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "record_output")]
  RecordOutput(RecordOutput),
  #[cfg(feature = "highgui")]
  HighGuiWindow(HighGuiWindow),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "record_output")]
      RecordOutput::SCHEME => {
        let output = RecordOutput::from_url(url)?;
        Ok(OutputWrapper::RecordOutput(output))
      }
      #[cfg(feature = "highgui")]
      HighGuiWindow::SCHEME => {
        let output = HighGuiWindow::from_url(url)?;
        Ok(OutputWrapper::HighGuiWindow(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, annotated: &AnnotatedFrame) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(annotated)
        .map_err(OutputError::from),
      #[cfg(feature = "record_output")]
      OutputWrapper::RecordOutput(output) => output
        .render_result(annotated)
        .map_err(OutputError::from),
      #[cfg(feature = "highgui")]
      OutputWrapper::HighGuiWindow(output) => output
        .render_result(annotated)
        .map_err(OutputError::from),
      #[allow(unreachable_patterns)]
      _ => Ok(()),
    }
  }
}
