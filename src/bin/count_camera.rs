// 该文件是 Jishu （计数） 项目的一部分。
// src/bin/count_camera.rs - 摄像头拍照计数
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
use clap::{Parser, ValueEnum};
use url::Url;

use jishu::{
  FromUrl,
  input::{InteractiveCapture, KeyBindings, PreviewWrapper, TerminalPreview, V4lCamera},
  model::{DEFAULT_CONFIDENCE, ModelWrapper, parse_confidence},
  output::{Draw, Geometry, OutputWrapper},
  task::{CaptureCountTask, CountTask, Task},
};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PreviewKind {
  /// 在终端中按回车拍照
  Terminal,
  /// OpenCV 实时预览窗口
  Window,
}

/// 打开摄像头，按键拍照后检测并计数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，如 rknn:///opt/best.rknn 或 replay:///tmp/results.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 摄像头，如 v4l:///dev/video0?width=640&height=480
  #[arg(long, value_name = "SOURCE", default_value = "v4l:///dev/video0")]
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
  #[arg(long, value_enum, default_value_t = Geometry::Rotated)]
  pub geometry: Geometry,
  /// 序号字体 (TTF/OTF)，默认使用内嵌字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 预览方式
  #[arg(long, value_enum, default_value_t = PreviewKind::Terminal)]
  pub preview: PreviewKind,
  /// 拍照键
  #[arg(long, default_value_t = ' ')]
  pub capture_key: char,
  /// 退出键
  #[arg(long, default_value_t = 'q')]
  pub quit_key: char,
}

fn open_preview(kind: PreviewKind) -> Result<PreviewWrapper> {
  match kind {
    PreviewKind::Terminal => {
      info!("终端预览: 回车拍照, 输入 q 回车退出");
      Ok(PreviewWrapper::Terminal(TerminalPreview::new()))
    }
    #[cfg(feature = "highgui")]
    PreviewKind::Window => Ok(PreviewWrapper::Window(jishu::output::HighGuiWindow::new(
      "Live Camera",
    ))),
    #[cfg(not(feature = "highgui"))]
    PreviewKind::Window => Err(anyhow::anyhow!("窗口预览需要启用 highgui 特性")),
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let model = ModelWrapper::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let draw = Draw::new(args.geometry).with_font_file(args.font.as_deref());

  let camera = V4lCamera::from_url(&args.input).inspect_err(|e| error!("无法打开摄像头: {}", e))?;
  info!("摄像头已启动: {}x{}", camera.width(), camera.height());

  let bindings = KeyBindings {
    capture: args.capture_key,
    quit: args.quit_key,
  };
  let capture = InteractiveCapture::new(open_preview(args.preview)?)
    .with_bindings(bindings)
    .with_interrupt(jishu::input::capture::interrupt_channel()?);

  let count = CountTask::new(draw).with_confidence(args.confidence);
  let report = CaptureCountTask::new(capture, count).run_task(camera, model, output)?;

  if report.is_none() {
    info!("已退出");
  }
  Ok(())
}
