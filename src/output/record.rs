// 该文件是 Jishu （计数） 项目的一部分。
// src/output/record.rs - 计数结果记录输出
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

use std::path::PathBuf;

use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{
    Render,
    draw::{AnnotatedFrame, Label},
    save_image_file::{SaveImageFileError, save_image},
  },
  url_file_path,
};

#[derive(Error, Debug)]
pub enum RecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("保存图像错误: {0}")]
  SaveImageError(#[from] SaveImageFileError),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 写出 JSON 报告，并在同目录保存同名 PNG 标注图
///
/// 报告中的 `total_count` 与网页端读取的字段一致。
pub struct RecordOutput {
  report: PathBuf,
}

impl FromUrlWithScheme for RecordOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordOutput {
  type Error = RecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(RecordOutputError::SchemeMismatch);
    }

    let mut report = PathBuf::from(url_file_path(uri));
    if report.extension().is_none() {
      report.set_extension("json");
    }
    Ok(RecordOutput { report })
  }
}

impl RecordOutput {
  pub fn image_path(&self) -> PathBuf {
    self.report.with_extension("png")
  }
}

fn label_record(label: &Label) -> Value {
  let points: Vec<[f32; 2]> = label
    .detection
    .region
    .corners()
    .iter()
    .map(|p| [p.x, p.y])
    .collect();
  json!({
    "index": label.index,
    "anchor": [label.anchor.0, label.anchor.1],
    "rotated": label.detection.region.is_rotated(),
    "points": points,
    "confidence": label.detection.score,
    "class": label.detection.class_id,
  })
}

pub fn report_json(annotated: &AnnotatedFrame, image_name: &str) -> Value {
  json!({
    "total_count": annotated.count(),
    "created_at": Utc::now().to_rfc3339(),
    "image": image_name,
    "width": annotated.image.width(),
    "height": annotated.image.height(),
    "detections": annotated.labels.iter().map(label_record).collect::<Vec<_>>(),
  })
}

impl Render for RecordOutput {
  type Error = RecordOutputError;

  fn render_result(&self, annotated: &AnnotatedFrame) -> Result<(), Self::Error> {
    let image_path = self.image_path();
    save_image(&image_path, &annotated.image)?;

    let image_name = image_path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let report = report_json(annotated, &image_name);
    std::fs::write(&self.report, serde_json::to_string_pretty(&report)?)?;
    info!("保存计数报告: {}", self.report.display());

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::Frame,
    geometry::{Point, Region},
    model::{DetectResult, Detection},
    output::draw::Draw,
  };
  use image::RgbImage;

  #[test]
  fn writes_report_and_image() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("run/counted");
    let url = Url::parse(&format!("record://{}", report.display())).unwrap();
    let output = RecordOutput::from_url(&url).unwrap();

    let detection = Detection {
      region: Region::Rotated([
        Point::new(0.0, 0.0),
        Point::new(10.0, 0.0),
        Point::new(10.0, 10.0),
        Point::new(0.0, 10.0),
      ]),
      score: 0.75,
      class_id: 4,
    };
    let frame = Frame::from(RgbImage::new(32, 32));
    let annotated = Draw::default().annotate(&frame, &[DetectResult::new(vec![detection])]);
    output.render_result(&annotated).unwrap();

    let text = std::fs::read_to_string(dir.path().join("run/counted.json")).unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["total_count"], 1);
    assert_eq!(value["image"], "counted.png");
    assert_eq!(value["detections"][0]["index"], 1);
    assert_eq!(value["detections"][0]["anchor"], json!([5, 5]));
    assert_eq!(value["detections"][0]["class"], 4);
    assert!(dir.path().join("run/counted.png").exists());
  }

  #[test]
  fn empty_frame_reports_zero() {
    let frame = Frame::from(RgbImage::new(4, 4));
    let annotated = Draw::default().annotate(&frame, &[DetectResult::empty()]);
    let value = report_json(&annotated, "x.png");
    assert_eq!(value["total_count"], 0);
    assert_eq!(value["detections"], json!([]));
  }
}
