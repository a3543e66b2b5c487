// 该文件是 Jishu （计数） 项目的一部分。
// src/bin/count_image.rs - 图像文件计数
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use jishu::{
  FromUrl,
  input::ImageFileInput,
  model::{DEFAULT_CONFIDENCE, ModelWrapper, parse_confidence},
  output::{Draw, Geometry, OutputWrapper},
  task::{CountTask, Task},
};
use tracing::info;

/// 读取一张图像，检测并计数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，如 rknn:///opt/best.rknn 或 replay:///tmp/results.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，如 image:///images/boxes4.png
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，如 window:、image:///tmp/out.png、record:///tmp/out.json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值，范围 [0, 1]
  #[arg(
    long,
    default_value_t = DEFAULT_CONFIDENCE,
    value_parser = parse_confidence,
    value_name = "THRESHOLD"
  )]
  pub confidence: f32,
  /// 绘制几何
  #[arg(long, value_enum, default_value_t = Geometry::Aligned)]
  pub geometry: Geometry,
  /// 序号字体 (TTF/OTF)，默认使用内嵌字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input_image = ImageFileInput::from_url(&args.input)?;
  let model = ModelWrapper::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let draw = Draw::new(args.geometry).with_font_file(args.font.as_deref());

  CountTask::new(draw)
    .with_confidence(args.confidence)
    .run_task(input_image, model, output)?;

  Ok(())
}
