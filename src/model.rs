// 该文件是 Jishu （计数） 项目的一部分。
// src/model.rs - 检测模型
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

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, geometry::Region};

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE: f32 = 0.25;

/// 命令行置信度解析，只接受 [0, 1] 内的数
pub fn parse_confidence(text: &str) -> Result<f32, String> {
  let value: f32 = text
    .trim()
    .parse()
    .map_err(|e| format!("无法解析置信度 '{}': {}", text, e))?;
  if (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(format!("置信度必须在 0 到 1 之间，实际为 {}", value))
  }
}

/// 检测模型的统一接口
///
/// 只做一次推理调用；阈值之外的过滤、跟踪和抑制都由具体模型负责。
pub trait Detector {
  type Error;

  fn detect(&self, frame: &Frame, confidence: f32) -> Result<Vec<DetectResult>, Self::Error>;
}

impl<D: Detector + ?Sized> Detector for &D {
  type Error = D::Error;

  fn detect(&self, frame: &Frame, confidence: f32) -> Result<Vec<DetectResult>, Self::Error> {
    (**self).detect(frame, confidence)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub region: Region,
  pub score: f32,
  pub class_id: u32,
}

/// 一个模型结果对象，没有区域时 `regions` 为 `None`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub regions: Option<Box<[Detection]>>,
}

impl DetectResult {
  pub fn new(items: Vec<Detection>) -> Self {
    Self {
      regions: Some(items.into_boxed_slice()),
    }
  }

  pub fn empty() -> Self {
    Self { regions: None }
  }
}

/// 按结果顺序展开所有检测，跳过没有区域的结果
pub fn iter_detections(results: &[DetectResult]) -> impl Iterator<Item = &Detection> {
  results
    .iter()
    .filter_map(|r| r.regions.as_deref())
    .flat_map(|items| items.iter())
}

pub mod obb_decode;

mod replay;
pub use self::replay::{ReplayDetector, ReplayError};

#[cfg(feature = "model_rknn")]
mod rknn_obb;
#[cfg(feature = "model_rknn")]
pub use self::rknn_obb::{RknnObb, RknnObbBuilder, RknnObbError};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("回放模型错误: {0}")]
  ReplayError(#[from] ReplayError),
  #[cfg(feature = "model_rknn")]
  #[error("RKNN OBB 模型错误: {0}")]
  RknnObbError(#[from] RknnObbError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum ModelWrapper {
  Replay(ReplayDetector),
  #[cfg(feature = "model_rknn")]
  RknnObb(RknnObb<640, 640>),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayDetector::SCHEME => Ok(ModelWrapper::Replay(ReplayDetector::from_url(url)?)),
      #[cfg(feature = "model_rknn")]
      RknnObbBuilder::SCHEME => Ok(ModelWrapper::RknnObb(
        RknnObbBuilder::from_url(url)?.build()?,
      )),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Detector for ModelWrapper {
  type Error = ModelError;

  fn detect(&self, frame: &Frame, confidence: f32) -> Result<Vec<DetectResult>, Self::Error> {
    match self {
      ModelWrapper::Replay(model) => model.detect(frame, confidence).map_err(ModelError::from),
      #[cfg(feature = "model_rknn")]
      ModelWrapper::RknnObb(model) => model.detect(frame, confidence).map_err(ModelError::from),
    }
  }
}
