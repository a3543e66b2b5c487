// 该文件是 Jishu （计数） 项目的一部分。
// src/output/draw.rs - 检测框与序号绘制
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

use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::Frame,
  geometry::Region,
  model::{DetectResult, Detection, iter_detections},
};

// 绘制常量
const OUTLINE_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const OUTLINE_WIDTH: i32 = 2;
const LABEL_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const LABEL_STROKE: i32 = 2;
const ROTATED_LABEL_FONT_SIZE: f32 = 27.0;
const ALIGNED_LABEL_FONT_SIZE: f32 = 21.0;

/// 画面外保留的边距，超出部分的线段不再绘制
const CLIP_MARGIN: i64 = OUTLINE_WIDTH as i64 + 1;

const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum FontError {
  #[error("无法读取字体文件 {path}: {source}")]
  IoError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("字体文件无效: {0}")]
  InvalidFont(PathBuf),
}

pub fn load_font(path: &Path) -> Result<FontArc, FontError> {
  let data = std::fs::read(path).map_err(|source| FontError::IoError {
    path: path.to_path_buf(),
    source,
  })?;
  FontArc::try_from_vec(data).map_err(|_| FontError::InvalidFont(path.to_path_buf()))
}

fn embedded_font() -> FontArc {
  FontArc::try_from_slice(EMBEDDED_FONT).expect("无法加载嵌入的字体文件")
}

/// 绘制几何：保留旋转框，或转换为外接水平框
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Geometry {
  #[default]
  Rotated,
  Aligned,
}

impl Geometry {
  pub fn apply(&self, region: &Region) -> Region {
    match self {
      Geometry::Rotated => *region,
      Geometry::Aligned => region.to_aligned(),
    }
  }
}

/// 一个已绘制的序号
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
  /// 从 1 开始
  pub index: usize,
  pub anchor: (i32, i32),
  pub detection: Detection,
}

#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
  pub image: RgbImage,
  pub labels: Vec<Label>,
  outlines: usize,
}

impl AnnotatedFrame {
  pub fn count(&self) -> usize {
    self.labels.len()
  }

  pub fn outlines(&self) -> usize {
    self.outlines
  }
}

pub struct Draw {
  geometry: Geometry,
  font: FontArc,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(Geometry::default())
  }
}

impl Draw {
  /// 使用内嵌字体绘制序号
  pub fn new(geometry: Geometry) -> Self {
    Self {
      geometry,
      font: embedded_font(),
    }
  }

  /// 用指定字体替换内嵌字体，加载失败时继续使用内嵌字体
  pub fn with_font_file(mut self, path: Option<&Path>) -> Self {
    if let Some(path) = path {
      match load_font(path) {
        Ok(font) => {
          info!("使用字体: {}", path.display());
          self.font = font;
        }
        Err(e) => warn!("{}，改用内嵌字体", e),
      }
    }
    self
  }

  /// 在帧的副本上按结果顺序绘制边框与序号
  pub fn annotate(&self, frame: &Frame, results: &[DetectResult]) -> AnnotatedFrame {
    let mut image = frame.image().clone();
    let mut labels = Vec::new();
    let mut outlines = 0usize;

    for detection in iter_detections(results) {
      let index = labels.len() + 1;
      let region = self.geometry.apply(&detection.region);

      draw_outline(&mut image, &region);
      outlines += 1;

      let anchor = region.label_anchor();
      self.draw_label(&mut image, &region, anchor, index);

      labels.push(Label {
        index,
        anchor,
        detection: Detection {
          region,
          ..detection.clone()
        },
      });
    }

    debug!("绘制 {} 个检测框", outlines);
    AnnotatedFrame {
      image,
      labels,
      outlines,
    }
  }

  fn draw_label(&self, image: &mut RgbImage, region: &Region, anchor: (i32, i32), index: usize) {
    let size = if region.is_rotated() {
      ROTATED_LABEL_FONT_SIZE
    } else {
      ALIGNED_LABEL_FONT_SIZE
    };
    let scale = PxScale::from(size);
    // 锚点是文字基线左端，imageproc 从文字顶部开始绘制
    let ascent = self.font.as_scaled(scale).ascent().round() as i64;
    let text = index.to_string();

    // 文字完全落在画面外时跳过，序号仍然计数
    let extent = (text.len() as i64 + 1) * size.ceil() as i64;
    let (x, top) = (anchor.0 as i64, anchor.1 as i64 - ascent);
    let (w, h) = (image.width() as i64, image.height() as i64);
    if x > w || x + extent < 0 || top > h || top + extent < 0 {
      debug!("序号 {} 的锚点 {:?} 在画面外", index, anchor);
      return;
    }

    for dx in 0..LABEL_STROKE as i64 {
      draw_text_mut(
        image,
        Rgb(LABEL_COLOR),
        (x + dx) as i32,
        top as i32,
        scale,
        &self.font,
        &text,
      );
    }
  }
}

fn draw_outline(image: &mut RgbImage, region: &Region) {
  let color = Rgb(OUTLINE_COLOR);
  let (w, h) = (image.width() as i64, image.height() as i64);

  match region {
    Region::Rotated(_) => {
      let pixels = region.pixel_corners();
      let bounds = (
        -CLIP_MARGIN as f64,
        -CLIP_MARGIN as f64,
        (w + CLIP_MARGIN) as f64,
        (h + CLIP_MARGIN) as f64,
      );
      for i in 0..pixels.len() {
        let (x0, y0) = pixels[i];
        let (x1, y1) = pixels[(i + 1) % pixels.len()];
        let Some(((x0, y0), (x1, y1))) =
          clip_segment((x0 as f64, y0 as f64), (x1 as f64, y1 as f64), bounds)
        else {
          continue;
        };
        for dx in 0..OUTLINE_WIDTH {
          for dy in 0..OUTLINE_WIDTH {
            draw_line_segment_mut(
              image,
              ((x0 + dx as f64) as f32, (y0 + dy as f64) as f32),
              ((x1 + dx as f64) as f32, (y1 + dy as f64) as f32),
              color,
            );
          }
        }
      }
    }
    Region::Aligned { .. } => {
      let [(x_min, y_min), _, (x_max, y_max), _] = region.pixel_corners();
      // 收进画面附近，画面外的边仍留在画面外
      let clamp_x = |v: i32| (v as i64).clamp(-CLIP_MARGIN, w + CLIP_MARGIN);
      let clamp_y = |v: i32| (v as i64).clamp(-CLIP_MARGIN, h + CLIP_MARGIN);
      let (x_min, x_max) = (clamp_x(x_min), clamp_x(x_max));
      let (y_min, y_max) = (clamp_y(y_min), clamp_y(y_max));

      // 由外向内逐层加粗
      for t in 0..OUTLINE_WIDTH as i64 {
        let rw = x_max - x_min - 2 * t + 1;
        let rh = y_max - y_min - 2 * t + 1;
        if rw <= 0 || rh <= 0 {
          break;
        }
        let rect = Rect::at((x_min + t) as i32, (y_min + t) as i32).of_size(rw as u32, rh as u32);
        draw_hollow_rect_mut(image, rect, color);
      }
    }
  }
}

/// Liang–Barsky 线段裁剪，`bounds` 为 `(x_min, y_min, x_max, y_max)`
fn clip_segment(
  p0: (f64, f64),
  p1: (f64, f64),
  bounds: (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
  let (dx, dy) = (p1.0 - p0.0, p1.1 - p0.1);
  let (mut t0, mut t1) = (0.0f64, 1.0f64);

  for (p, q) in [
    (-dx, p0.0 - bounds.0),
    (dx, bounds.2 - p0.0),
    (-dy, p0.1 - bounds.1),
    (dy, bounds.3 - p0.1),
  ] {
    if p == 0.0 {
      if q < 0.0 {
        return None;
      }
      continue;
    }
    let r = q / p;
    if p < 0.0 {
      if r > t1 {
        return None;
      }
      t0 = t0.max(r);
    } else {
      if r < t0 {
        return None;
      }
      t1 = t1.min(r);
    }
  }

  Some((
    (p0.0 + t0 * dx, p0.1 + t0 * dy),
    (p0.0 + t1 * dx, p0.1 + t1 * dy),
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::Point;

  fn blank(w: u32, h: u32) -> Frame {
    Frame::from(RgbImage::from_pixel(w, h, Rgb([0, 0, 0])))
  }

  fn rotated(x: f32, y: f32, size: f32) -> Detection {
    Detection {
      region: Region::Rotated([
        Point::new(x, y),
        Point::new(x + size, y),
        Point::new(x + size, y + size),
        Point::new(x, y + size),
      ]),
      score: 0.8,
      class_id: 0,
    }
  }

  fn aligned(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Detection {
    Detection {
      region: Region::Aligned {
        x_min,
        y_min,
        x_max,
        y_max,
      },
      score: 0.8,
      class_id: 0,
    }
  }

  #[test]
  fn no_detections_draws_nothing() {
    let frame = blank(20, 20);
    let annotated = Draw::default().annotate(&frame, &[DetectResult::empty()]);
    assert_eq!(annotated.count(), 0);
    assert_eq!(annotated.outlines(), 0);
    assert_eq!(annotated.image, *frame.image());
  }

  #[test]
  fn labels_are_one_based_in_result_order() {
    let results = vec![
      DetectResult::new(vec![rotated(50.0, 50.0, 10.0), rotated(0.0, 0.0, 10.0)]),
      DetectResult::empty(),
      DetectResult::new(vec![rotated(20.0, 60.0, 10.0)]),
    ];
    let annotated = Draw::default().annotate(&blank(100, 100), &results);

    let indices: Vec<usize> = annotated.labels.iter().map(|l| l.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    let anchors: Vec<(i32, i32)> = annotated.labels.iter().map(|l| l.anchor).collect();
    assert_eq!(anchors, vec![(55, 55), (5, 5), (25, 65)]);
    assert_eq!(annotated.outlines(), annotated.count());
  }

  #[test]
  fn rotated_outline_is_drawn_in_green() {
    let annotated =
      Draw::default().annotate(&blank(40, 40), &[DetectResult::new(vec![rotated(5.0, 5.0, 20.0)])]);
    assert_eq!(annotated.image.get_pixel(5, 5), &Rgb(OUTLINE_COLOR));
    assert_eq!(annotated.image.get_pixel(15, 5), &Rgb(OUTLINE_COLOR));
    assert_eq!(annotated.image.get_pixel(15, 6), &Rgb(OUTLINE_COLOR));
    // 内部不填充
    assert_eq!(annotated.image.get_pixel(8, 22), &Rgb([0, 0, 0]));
  }

  #[test]
  fn aligned_geometry_converts_and_offsets_anchor() {
    let diamond = Detection {
      region: Region::Rotated([
        Point::new(40.0, 30.0),
        Point::new(60.0, 50.0),
        Point::new(40.0, 70.0),
        Point::new(20.0, 50.0),
      ]),
      score: 0.5,
      class_id: 3,
    };
    let annotated =
      Draw::new(Geometry::Aligned).annotate(&blank(100, 100), &[DetectResult::new(vec![diamond])]);

    let label = &annotated.labels[0];
    assert_eq!(label.anchor, (25, 20));
    assert!(!label.detection.region.is_rotated());
    assert_eq!(annotated.image.get_pixel(20, 30), &Rgb(OUTLINE_COLOR));
    assert_eq!(annotated.image.get_pixel(21, 31), &Rgb(OUTLINE_COLOR));
    assert_eq!(annotated.image.get_pixel(60, 70), &Rgb(OUTLINE_COLOR));
  }

  #[test]
  fn aligned_regions_stay_aligned_in_rotated_mode() {
    let annotated = Draw::new(Geometry::Rotated).annotate(
      &blank(100, 100),
      &[DetectResult::new(vec![aligned(20.0, 30.0, 40.0, 50.0)])],
    );
    assert_eq!(annotated.labels[0].anchor, (25, 20));
  }

  #[test]
  fn regions_outside_the_frame_are_still_counted() {
    let annotated = Draw::default().annotate(
      &blank(10, 10),
      &[DetectResult::new(vec![
        aligned(-30.0, -30.0, -20.0, -20.0),
        rotated(100.0, 100.0, 5.0),
      ])],
    );
    assert_eq!(annotated.count(), 2);
    assert_eq!(annotated.outlines(), 2);
  }

  fn red_pixels_near(image: &RgbImage, anchor: (i32, i32)) -> usize {
    let mut n = 0;
    for y in (anchor.1 - 30).max(0)..=(anchor.1 + 2).min(image.height() as i32 - 1) {
      for x in (anchor.0 - 2).max(0)..=(anchor.0 + 30).min(image.width() as i32 - 1) {
        let p = image.get_pixel(x as u32, y as u32);
        if p[0] > 128 && p[0] > p[1] && p[2] == 0 {
          n += 1;
        }
      }
    }
    n
  }

  #[test]
  fn embedded_font_is_valid() {
    assert!(FontArc::try_from_slice(EMBEDDED_FONT).is_ok());
  }

  #[test]
  fn every_label_draws_its_digits() {
    let results = [DetectResult::new(vec![
      rotated(0.0, 0.0, 60.0),
      rotated(80.0, 80.0, 60.0),
    ])];
    let annotated = Draw::default().annotate(&blank(160, 160), &results);

    assert_eq!(annotated.count(), 2);
    for label in &annotated.labels {
      assert!(red_pixels_near(&annotated.image, label.anchor) > 0, "序号 {} 没有绘制", label.index);
    }
  }

  #[test]
  fn bad_font_override_keeps_drawing_digits() {
    let draw = Draw::new(Geometry::Aligned).with_font_file(Some(Path::new("/no/such/font.ttf")));
    let annotated = draw.annotate(
      &blank(80, 80),
      &[DetectResult::new(vec![aligned(10.0, 40.0, 70.0, 75.0)])],
    );
    assert_eq!(annotated.labels[0].anchor, (15, 30));
    assert!(red_pixels_near(&annotated.image, (15, 30)) > 0);
  }

  #[test]
  fn font_override_is_used_when_it_loads() {
    let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/DejaVuSans.ttf"));
    let annotated = Draw::default()
      .with_font_file(Some(path))
      .annotate(&blank(60, 60), &[DetectResult::new(vec![rotated(0.0, 0.0, 50.0)])]);
    assert!(red_pixels_near(&annotated.image, annotated.labels[0].anchor) > 0);
  }

  #[test]
  fn huge_coordinates_are_clipped_not_overflowed() {
    let far = Detection {
      region: Region::Rotated([
        Point::new(-3.0e9, -3.0e9),
        Point::new(3.0e9, -3.0e9),
        Point::new(3.0e9, 3.0e9),
        Point::new(-3.0e9, 3.0e9),
      ]),
      score: 0.9,
      class_id: 0,
    };
    let annotated = Draw::default().annotate(
      &blank(20, 20),
      &[DetectResult::new(vec![
        far.clone(),
        aligned(-3.0e9, 5.0, 3.0e9, 15.0),
        aligned(2.0e9, 2.0e9, 2.1e9, 2.1e9),
      ])],
    );
    assert_eq!(annotated.count(), 3);
    // 水平框的上下边横穿画面
    assert_eq!(annotated.image.get_pixel(10, 5), &Rgb(OUTLINE_COLOR));
    assert_eq!(annotated.image.get_pixel(10, 15), &Rgb(OUTLINE_COLOR));
    // 左右边在画面外
    assert_ne!(annotated.image.get_pixel(0, 10), &Rgb(OUTLINE_COLOR));
  }

  #[test]
  fn clip_segment_cuts_to_bounds() {
    let b = (0.0, 0.0, 10.0, 10.0);
    assert_eq!(clip_segment((-5.0, 5.0), (15.0, 5.0), b), Some(((0.0, 5.0), (10.0, 5.0))));
    assert_eq!(clip_segment((-5.0, -5.0), (-1.0, 20.0), b), None);
    assert_eq!(clip_segment((2.0, 2.0), (3.0, 3.0), b), Some(((2.0, 2.0), (3.0, 3.0))));
  }

  #[test]
  fn invalid_font_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bogus.ttf");
    std::fs::write(&path, b"not a font").unwrap();
    assert!(matches!(load_font(&path), Err(FontError::InvalidFont(_))));
  }
}
