// 该文件是 Jishu （计数） 项目的一部分。
// src/model/rknn_obb.rs - RKNN 上的 YOLO OBB 模型
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

use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNhwcFrame, Frame, RgbNhwcFrame},
  model::{
    DetectResult, Detector,
    obb_decode::{self, DecodeParams, OBB_MAX_DET, OBB_NMS_IOU},
  },
  url_file_path,
};

const RKNN_OBB_NUM_INPUTS: u32 = 1;
const RKNN_OBB_NUM_OUTPUTS: u32 = 1;

#[derive(Error, Debug)]
pub enum RknnObbError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型输出错误: {0}")]
  OutputError(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl RknnObbError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnObbError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct RknnObb<const W: u32, const H: u32> {
  context: Context,
  nms_iou: f32,
  max_det: usize,
}

pub struct RknnObbBuilder {
  model_path: String,
  flags: InitFlags,
  nms_iou: f32,
  max_det: usize,
}

impl FromUrlWithScheme for RknnObbBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnObbBuilder {
  type Error = RknnObbError;

  /// `rknn:///path/best.rknn?iou=0.7&max_det=300`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnObbError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = RknnObbBuilder {
      model_path: url_file_path(url),
      flags: InitFlags::default(),
      nms_iou: OBB_NMS_IOU,
      max_det: OBB_MAX_DET,
    };

    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "iou" => {
          builder.nms_iou = v
            .parse()
            .map_err(|_| RknnObbError::ModelPathError(format!("无效的 iou 参数: {}", v)))?
        }
        "max_det" => {
          builder.max_det = v
            .parse()
            .map_err(|_| RknnObbError::ModelPathError(format!("无效的 max_det 参数: {}", v)))?
        }
        _ => debug!("忽略未知参数: {}={}", k, v),
      }
    }

    Ok(builder)
  }
}

impl RknnObbBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build<const W: u32, const H: u32>(self) -> Result<RknnObb<W, H>, RknnObbError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(RknnObbError::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnObbError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnObbError::invalid("无法获取输出数量", e))?;

    if num_inputs != RKNN_OBB_NUM_INPUTS || num_outputs != RKNN_OBB_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        RKNN_OBB_NUM_INPUTS, RKNN_OBB_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(RknnObbError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("模型加载完成");
    Ok(RknnObb {
      context,
      nms_iou: self.nms_iou,
      max_det: self.max_det,
    })
  }
}

impl<const W: u32, const H: u32> Detector for RknnObb<W, H> {
  type Error = RknnObbError;

  fn detect(&self, frame: &Frame, confidence: f32) -> Result<Vec<DetectResult>, Self::Error> {
    let (input, letterbox) = RgbNhwcFrame::<W, H>::letterbox(frame);
    debug!("输入缩放: {:?}", letterbox);

    self.context.set_input(
      0,
      input.as_nhwc(),
      rknpu::TensorFormat::NHWC,
      TensorType::UInt8,
    )?;

    debug!("执行模型推理");
    self.context.run()?;

    let output = self.context.get_outputs()?;
    let tensor = output
      .get_f32(0)
      .map_err(|e| RknnObbError::OutputError(e.to_string()))?;

    let anchors = obb_decode::anchor_count(W, H);
    let classes = obb_decode::class_count(tensor.len(), anchors).ok_or_else(|| {
      RknnObbError::OutputError(format!(
        "输出长度 {} 与锚点数 {} 不匹配",
        tensor.len(),
        anchors
      ))
    })?;
    debug!("锚点数: {}, 类别数: {}", anchors, classes);

    let params = DecodeParams {
      anchors,
      classes,
      confidence,
      nms_iou: self.nms_iou,
      max_det: self.max_det,
    };
    let items = obb_decode::decode(tensor, &params, &letterbox);
    debug!("检测到 {} 个物体", items.len());

    Ok(vec![DetectResult::new(items)])
  }
}
