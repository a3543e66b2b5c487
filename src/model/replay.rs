// 该文件是 Jishu （计数） 项目的一部分。
// src/model/replay.rs - 回放预先计算的检测结果
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

//! 从 JSON 文件读取模型结果，格式为结果对象数组：
//!
//! ```json
//! [
//!   { "obb": [ { "points": [[0,0],[10,0],[10,10],[0,10]], "confidence": 0.9, "class": 0 } ] },
//!   { "obb": [ { "xyxy": [20,30,60,90], "confidence": 0.4 } ] },
//!   { "obb": null }
//! ]
//! ```

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  geometry::{Point, Region},
  model::{DetectResult, Detection, Detector},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("结果格式错误: {0}")]
  FormatError(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

#[derive(Debug, Clone)]
pub struct ReplayDetector {
  results: Vec<DetectResult>,
}

impl FromUrlWithScheme for ReplayDetector {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetector {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch(format!(
        "期望方案 '{}', 实际方案 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = url_file_path(url);
    info!("加载回放结果: {}", path);
    let text = std::fs::read_to_string(&path)?;
    Self::from_json_str(&text)
  }
}

impl ReplayDetector {
  pub fn from_results(results: Vec<DetectResult>) -> Self {
    Self { results }
  }

  pub fn from_json_str(text: &str) -> Result<Self, ReplayError> {
    let value: Value = serde_json::from_str(text)?;
    let entries = value
      .as_array()
      .ok_or_else(|| ReplayError::FormatError("顶层必须是数组".to_string()))?;

    let results = entries
      .iter()
      .enumerate()
      .map(|(i, entry)| parse_result(i, entry))
      .collect::<Result<Vec<_>, _>>()?;
    debug!("回放结果对象数: {}", results.len());

    Ok(Self { results })
  }
}

fn parse_result(index: usize, entry: &Value) -> Result<DetectResult, ReplayError> {
  match entry.get("obb") {
    None | Some(Value::Null) => Ok(DetectResult::empty()),
    Some(Value::Array(items)) => {
      let items = items
        .iter()
        .map(|item| parse_detection(index, item))
        .collect::<Result<Vec<_>, _>>()?;
      Ok(DetectResult::new(items))
    }
    Some(_) => Err(ReplayError::FormatError(format!(
      "第 {} 个结果的 obb 字段必须是数组或 null",
      index
    ))),
  }
}

fn number(value: &Value, what: &str, index: usize) -> Result<f32, ReplayError> {
  value
    .as_f64()
    .map(|v| v as f32)
    .ok_or_else(|| ReplayError::FormatError(format!("第 {} 个结果的 {} 不是数字", index, what)))
}

/// 类别可以写成整数或整数值的浮点数（如 `2.0`）
fn class_id(value: &Value, index: usize) -> Result<u32, ReplayError> {
  let id = match value.as_u64() {
    Some(id) => Some(id),
    None => value
      .as_f64()
      .filter(|v| *v >= 0.0 && v.fract() == 0.0 && *v <= u32::MAX as f64)
      .map(|v| v as u64),
  };
  id.and_then(|id| u32::try_from(id).ok()).ok_or_else(|| {
    ReplayError::FormatError(format!("第 {} 个结果的 class 无效: {}", index, value))
  })
}

fn parse_detection(index: usize, item: &Value) -> Result<Detection, ReplayError> {
  let score = match item.get("confidence") {
    Some(v) => number(v, "confidence", index)?,
    None => 1.0,
  };
  let class_id = match item.get("class") {
    Some(v) => class_id(v, index)?,
    None => 0,
  };

  let region = if let Some(points) = item.get("points").and_then(Value::as_array) {
    if points.len() != 4 {
      return Err(ReplayError::FormatError(format!(
        "第 {} 个结果的 points 需要 4 个角点, 实际 {}",
        index,
        points.len()
      )));
    }
    let mut corners = [Point::default(); 4];
    for (corner, p) in corners.iter_mut().zip(points) {
      let pair = p.as_array().filter(|a| a.len() == 2).ok_or_else(|| {
        ReplayError::FormatError(format!("第 {} 个结果的角点必须是 [x, y]", index))
      })?;
      *corner = Point::new(number(&pair[0], "x", index)?, number(&pair[1], "y", index)?);
    }
    Region::Rotated(corners)
  } else if let Some(xyxy) = item.get("xyxy").and_then(Value::as_array) {
    if xyxy.len() != 4 {
      return Err(ReplayError::FormatError(format!(
        "第 {} 个结果的 xyxy 需要 4 个数",
        index
      )));
    }
    Region::Aligned {
      x_min: number(&xyxy[0], "xyxy", index)?,
      y_min: number(&xyxy[1], "xyxy", index)?,
      x_max: number(&xyxy[2], "xyxy", index)?,
      y_max: number(&xyxy[3], "xyxy", index)?,
    }
  } else {
    return Err(ReplayError::FormatError(format!(
      "第 {} 个结果缺少 points 或 xyxy",
      index
    )));
  };

  Ok(Detection {
    region,
    score,
    class_id,
  })
}

impl Detector for ReplayDetector {
  type Error = ReplayError;

  fn detect(&self, frame: &Frame, confidence: f32) -> Result<Vec<DetectResult>, Self::Error> {
    debug!(
      "回放 {} 个结果对象, 帧尺寸 {}x{}",
      self.results.len(),
      frame.width(),
      frame.height()
    );
    let results = self
      .results
      .iter()
      .map(|result| DetectResult {
        regions: result.regions.as_ref().map(|items| {
          items
            .iter()
            .filter(|d| d.score >= confidence)
            .cloned()
            .collect()
        }),
      })
      .collect();
    Ok(results)
  }
}
