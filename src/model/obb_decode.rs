// 该文件是 Jishu （计数） 项目的一部分。
// src/model/obb_decode.rs - YOLO OBB 输出解码与旋转框 NMS
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

use tracing::debug;

use crate::{
  frame::Letterbox,
  geometry::{Region, rotated_iou},
  model::Detection,
};

/// 检测头步长
pub const OBB_STRIDES: [u32; 3] = [8, 16, 32];
pub const OBB_NMS_IOU: f32 = 0.7;
pub const OBB_MAX_DET: usize = 300;

/// 输入尺寸对应的锚点总数（640x640 为 8400）
pub fn anchor_count(width: u32, height: u32) -> usize {
  OBB_STRIDES
    .iter()
    .map(|s| ((width / s) * (height / s)) as usize)
    .sum()
}

/// 由张量长度推出类别数，布局为 `[1, 4 + nc + 1, anchors]`
pub fn class_count(len: usize, anchors: usize) -> Option<usize> {
  if anchors == 0 || len % anchors != 0 {
    return None;
  }
  let channels = len / anchors;
  if channels < 6 { None } else { Some(channels - 5) }
}

#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
  pub anchors: usize,
  pub classes: usize,
  pub confidence: f32,
  pub nms_iou: f32,
  pub max_det: usize,
}

/// 解码通道优先的输出：`cx, cy, w, h, 各类别分数..., angle`
///
/// 坐标在模型输入空间中，经 `letterbox` 映射回原始帧。
pub fn decode(output: &[f32], params: &DecodeParams, letterbox: &Letterbox) -> Vec<Detection> {
  let n = params.anchors;
  let angle_channel = 4 + params.classes;
  let at = |c: usize, i: usize| output[c * n + i];

  let mut candidates = Vec::new();
  for i in 0..n {
    let (class_id, score) = (0..params.classes)
      .map(|c| (c, at(4 + c, i)))
      .fold((0usize, f32::MIN), |best, cur| {
        if cur.1 > best.1 { cur } else { best }
      });

    if score < params.confidence {
      continue;
    }

    let region = Region::from_xywhr(at(0, i), at(1, i), at(2, i), at(3, i), at(angle_channel, i));
    candidates.push(Detection {
      region,
      score,
      class_id: class_id as u32,
    });
  }
  debug!("阈值过滤后候选框: {}", candidates.len());

  let kept = nms_rotated(candidates, params.nms_iou, params.max_det);
  debug!("NMS 后保留: {}", kept.len());

  kept
    .into_iter()
    .map(|d| Detection {
      region: d.region.map_points(|p| letterbox.to_frame(p)),
      ..d
    })
    .collect()
}

/// 同类别旋转框的贪心非极大值抑制，结果按分数降序
pub fn nms_rotated(mut candidates: Vec<Detection>, iou: f32, max_det: usize) -> Vec<Detection> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<Detection> = Vec::new();
  for candidate in candidates {
    if kept.len() >= max_det {
      break;
    }
    let suppressed = kept.iter().any(|k| {
      k.class_id == candidate.class_id && rotated_iou(&k.region, &candidate.region) > iou
    });
    if !suppressed {
      kept.push(candidate);
    }
  }
  kept
}
