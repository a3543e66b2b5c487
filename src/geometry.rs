// 该文件是 Jishu （计数） 项目的一部分。
// src/geometry.rs - 检测区域几何
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

// 水平框标签相对左上角的偏移（向右 5 像素，向上 10 像素）
const ALIGNED_LABEL_OFFSET_X: i32 = 5;
const ALIGNED_LABEL_OFFSET_Y: i32 = -10;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

impl Point {
  pub const fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }

  /// 截断为整数像素坐标（向零取整）
  pub fn to_pixel(self) -> (i32, i32) {
    (self.x as i32, self.y as i32)
  }
}

impl From<(f32, f32)> for Point {
  fn from((x, y): (f32, f32)) -> Self {
    Self { x, y }
  }
}

/// 检测区域：旋转四边形或水平矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
  /// 四个角点，按模型给出的顺序
  Rotated([Point; 4]),
  Aligned {
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
  },
}

impl Region {
  /// 由中心点、宽高和旋转角（弧度）构造旋转框
  pub fn from_xywhr(cx: f32, cy: f32, w: f32, h: f32, angle: f32) -> Self {
    let (sin, cos) = angle.sin_cos();
    let v1 = Point::new(w / 2.0 * cos, w / 2.0 * sin);
    let v2 = Point::new(-h / 2.0 * sin, h / 2.0 * cos);

    Region::Rotated([
      Point::new(cx + v1.x + v2.x, cy + v1.y + v2.y),
      Point::new(cx + v1.x - v2.x, cy + v1.y - v2.y),
      Point::new(cx - v1.x - v2.x, cy - v1.y - v2.y),
      Point::new(cx - v1.x + v2.x, cy - v1.y + v2.y),
    ])
  }

  pub fn corners(&self) -> [Point; 4] {
    match *self {
      Region::Rotated(points) => points,
      Region::Aligned {
        x_min,
        y_min,
        x_max,
        y_max,
      } => [
        Point::new(x_min, y_min),
        Point::new(x_max, y_min),
        Point::new(x_max, y_max),
        Point::new(x_min, y_max),
      ],
    }
  }

  /// 外接水平矩形
  pub fn to_aligned(&self) -> Region {
    let corners = self.corners();
    let mut x_min = f32::MAX;
    let mut y_min = f32::MAX;
    let mut x_max = f32::MIN;
    let mut y_max = f32::MIN;
    for p in corners.iter() {
      x_min = x_min.min(p.x);
      y_min = y_min.min(p.y);
      x_max = x_max.max(p.x);
      y_max = y_max.max(p.y);
    }
    Region::Aligned {
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }

  pub fn is_rotated(&self) -> bool {
    matches!(self, Region::Rotated(_))
  }

  /// 对每个角点做坐标变换，水平框保持为水平框
  pub fn map_points<F: Fn(Point) -> Point>(&self, f: F) -> Region {
    match *self {
      Region::Rotated(points) => Region::Rotated(points.map(f)),
      Region::Aligned {
        x_min,
        y_min,
        x_max,
        y_max,
      } => {
        let a = f(Point::new(x_min, y_min));
        let b = f(Point::new(x_max, y_max));
        Region::Aligned {
          x_min: a.x,
          y_min: a.y,
          x_max: b.x,
          y_max: b.y,
        }
      }
    }
  }

  pub fn pixel_corners(&self) -> [(i32, i32); 4] {
    self.corners().map(Point::to_pixel)
  }

  /// 序号标签的锚点（文字基线左端）
  ///
  /// 旋转框取四个整数角点的均值，水平框取左上角偏移 (+5, -10)。
  pub fn label_anchor(&self) -> (i32, i32) {
    match self {
      Region::Rotated(_) => {
        let pixels = self.pixel_corners();
        // 在 i64 中求和，远离画面的角点不会溢出
        let sum_x: i64 = pixels.iter().map(|p| p.0 as i64).sum();
        let sum_y: i64 = pixels.iter().map(|p| p.1 as i64).sum();
        // 整数除法向零截断，与均值后取整一致
        ((sum_x / 4) as i32, (sum_y / 4) as i32)
      }
      Region::Aligned { x_min, y_min, .. } => (
        (*x_min as i32).saturating_add(ALIGNED_LABEL_OFFSET_X),
        (*y_min as i32).saturating_add(ALIGNED_LABEL_OFFSET_Y),
      ),
    }
  }

  pub fn area(&self) -> f32 {
    polygon_area(&self.corners())
  }
}

fn signed_area(polygon: &[Point]) -> f32 {
  let n = polygon.len();
  if n < 3 {
    return 0.0;
  }
  let mut acc = 0.0;
  for i in 0..n {
    let a = polygon[i];
    let b = polygon[(i + 1) % n];
    acc += a.x * b.y - b.x * a.y;
  }
  acc / 2.0
}

pub fn polygon_area(polygon: &[Point]) -> f32 {
  signed_area(polygon).abs()
}

fn cross(a: Point, b: Point, p: Point) -> f32 {
  (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn line_intersection(s: Point, e: Point, a: Point, b: Point) -> Point {
  let d1 = cross(a, b, s);
  let d2 = cross(a, b, e);
  let t = d1 / (d1 - d2);
  Point::new(s.x + (e.x - s.x) * t, s.y + (e.y - s.y) * t)
}

/// Sutherland–Hodgman 裁剪，`clip` 必须是凸多边形
fn clip_polygon(subject: &[Point], clip: &[Point]) -> Vec<Point> {
  let orientation = if signed_area(clip) >= 0.0 { 1.0 } else { -1.0 };
  let inside = |a: Point, b: Point, p: Point| cross(a, b, p) * orientation >= 0.0;

  let mut output = subject.to_vec();
  for i in 0..clip.len() {
    if output.is_empty() {
      break;
    }
    let a = clip[i];
    let b = clip[(i + 1) % clip.len()];
    let input = std::mem::take(&mut output);

    let mut s = input[input.len() - 1];
    for &e in input.iter() {
      match (inside(a, b, s), inside(a, b, e)) {
        (true, true) => output.push(e),
        (true, false) => output.push(line_intersection(s, e, a, b)),
        (false, true) => {
          output.push(line_intersection(s, e, a, b));
          output.push(e);
        }
        (false, false) => {}
      }
      s = e;
    }
  }
  output
}

/// 两个凸四边形的交并比
pub fn rotated_iou(a: &Region, b: &Region) -> f32 {
  let pa = a.corners();
  let pb = b.corners();
  let area_a = polygon_area(&pa);
  let area_b = polygon_area(&pb);
  if area_a <= 0.0 || area_b <= 0.0 {
    return 0.0;
  }

  let inter = polygon_area(&clip_polygon(&pa, &pb));
  let union = area_a + area_b - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}
