// 该文件是 Jishu （计数） 项目的一部分。
// src/task.rs - 计数任务
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

use tracing::info;

use crate::{
  frame::Frame,
  input::{CaptureOutcome, InteractiveCapture, Preview},
  model::{DEFAULT_CONFIDENCE, Detector},
  output::{AnnotatedFrame, Draw, Render},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug)]
pub struct CountReport {
  pub annotated: AnnotatedFrame,
}

impl CountReport {
  pub fn total(&self) -> usize {
    self.annotated.count()
  }

  pub fn total_line(&self) -> String {
    format!("TOTAL OBJECTS: {}", self.total())
  }
}

/// 单帧计数：推理一次、绘制、打印总数、输出
pub struct CountTask {
  confidence: f32,
  draw: Draw,
}

impl Default for CountTask {
  fn default() -> Self {
    Self::new(Draw::default())
  }
}

impl CountTask {
  pub fn new(draw: Draw) -> Self {
    Self {
      confidence: DEFAULT_CONFIDENCE,
      draw,
    }
  }

  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn count_frame<M, O>(&self, frame: &Frame, model: &M, output: &O) -> anyhow::Result<CountReport>
  where
    M: Detector,
    M::Error: std::error::Error + Send + Sync + 'static,
    O: Render,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    info!("开始推理, 置信度阈值: {}", self.confidence);
    let now = std::time::Instant::now();
    let results = model.detect(frame, self.confidence)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    let annotated = self.draw.annotate(frame, &results);
    let report = CountReport { annotated };
    println!("{}", report.total_line());

    output.render_result(&report.annotated)?;
    info!("渲染完成");
    Ok(report)
  }
}

impl<I, M, O> Task<I, M, O> for CountTask
where
  I: Iterator<Item = Frame>,
  M: Detector,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = CountReport;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    self.count_frame(&frame, &model, &output)
  }
}

/// 先交互拍照再计数；退出时不推理，返回 `None`
pub struct CaptureCountTask<P> {
  capture: InteractiveCapture<P>,
  count: CountTask,
}

impl<P: Preview> CaptureCountTask<P> {
  pub fn new(capture: InteractiveCapture<P>, count: CountTask) -> Self {
    Self { capture, count }
  }
}

impl<S, E, P, M, O> Task<S, M, O> for CaptureCountTask<P>
where
  S: Iterator<Item = Result<Frame, E>>,
  E: std::error::Error + Send + Sync + 'static,
  P: Preview,
  M: Detector,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = Option<CountReport>;
  type Error = anyhow::Error;

  fn run_task(self, source: S, model: M, output: O) -> Result<Self::Output, Self::Error> {
    let CaptureCountTask { mut capture, count } = self;

    let outcome = capture.run(source)?;
    // 推理前关闭预览与摄像头
    drop(capture);

    match outcome {
      CaptureOutcome::Captured(frame) => count.count_frame(&frame, &model, &output).map(Some),
      CaptureOutcome::Terminated => {
        info!("未拍照，跳过推理");
        Ok(None)
      }
    }
  }
}
