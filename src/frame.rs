// 该文件是 Jishu （计数） 项目的一部分。
// src/frame.rs - 帧与模型输入张量定义
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

use image::{Rgb, RgbImage, imageops::FilterType};

use crate::geometry::Point;

// 与常见 YOLO 预处理一致的灰色填充
const LETTERBOX_FILL: u8 = 114;

/// 一帧 RGB 图像（H × W × 3，8 位）
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbImage,
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self { image }
  }
}

impl Frame {
  /// 由紧密排列的 RGB 数据构造，长度不匹配时返回 `None`
  pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
    RgbImage::from_raw(width, height, data).map(Self::from)
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }
}

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

/// 等比缩放并填充后的坐标映射
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
}

impl Letterbox {
  /// 模型输入坐标映射回原始帧坐标
  pub fn to_frame(&self, p: Point) -> Point {
    Point::new((p.x - self.pad_x) / self.scale, (p.y - self.pad_y) / self.scale)
  }
}

/// 固定尺寸的 NHWC 模型输入
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  /// 将任意尺寸的帧等比缩放到 W × H，空白处用灰色填充
  pub fn letterbox(frame: &Frame) -> (Self, Letterbox) {
    let (src_w, src_h) = (frame.width().max(1), frame.height().max(1));
    let scale = (W as f32 / src_w as f32).min(H as f32 / src_h as f32);
    let new_w = ((src_w as f32 * scale).round() as u32).clamp(1, W);
    let new_h = ((src_h as f32 * scale).round() as u32).clamp(1, H);
    let pad_x = (W - new_w) / 2;
    let pad_y = (H - new_h) / 2;

    let resized = image::imageops::resize(frame.image(), new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(W, H, Rgb([LETTERBOX_FILL; 3]));
    image::imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let letterbox = Letterbox {
      scale,
      pad_x: pad_x as f32,
      pad_y: pad_y as f32,
    };
    let tensor = Self {
      data: canvas.into_raw().into_boxed_slice(),
    };
    (tensor, letterbox)
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}
