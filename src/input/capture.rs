// 该文件是 Jishu （计数） 项目的一部分。
// src/input/capture.rs - 交互式拍照
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

use std::sync::mpsc::Receiver;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::Frame;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 实时预览：显示帧并非阻塞地读取按键
pub trait Preview {
  type Error: std::error::Error + Send + Sync + 'static;

  fn show(&mut self, frame: &Frame) -> Result<(), Self::Error>;

  /// 没有按键时返回 `None`
  fn poll_key(&mut self) -> Result<Option<i32>, Self::Error>;
}

impl<P: Preview + ?Sized> Preview for &mut P {
  type Error = P::Error;

  fn show(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    (**self).show(frame)
  }

  fn poll_key(&mut self) -> Result<Option<i32>, Self::Error> {
    (**self).poll_key()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
  Capture,
  Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBindings {
  pub capture: char,
  pub quit: char,
}

impl Default for KeyBindings {
  fn default() -> Self {
    Self {
      capture: ' ',
      quit: 'q',
    }
  }
}

impl KeyBindings {
  /// 按完整的 Unicode 码位比较，负数表示没有按键
  pub fn classify(&self, code: i32) -> Option<Key> {
    let code = u32::try_from(code).ok()?;
    if code == self.capture as u32 {
      Some(Key::Capture)
    } else if code == self.quit as u32 {
      Some(Key::Quit)
    } else {
      None
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
  AwaitingFrame,
  Previewing,
  Captured,
  Terminated,
}

#[derive(Debug)]
pub enum CaptureOutcome {
  Captured(Frame),
  Terminated,
}

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("拍照前视频流已结束")]
  StreamEnded,
  #[error("读取帧失败: {0}")]
  SourceError(BoxError),
  #[error("预览失败: {0}")]
  PreviewError(BoxError),
  #[error("无法设置中断处理: {0}")]
  InterruptError(#[from] ctrlc::Error),
}

/// 去掉 GUI 按键码中的修饰位，只保留低 8 位
pub fn strip_gui_modifiers(code: i32) -> Option<i32> {
  if code < 0 { None } else { Some(code & 0xFF) }
}

/// 预览循环：`AwaitingFrame → Previewing → (Captured | Terminated)`
pub struct InteractiveCapture<P> {
  preview: P,
  bindings: KeyBindings,
  interrupt: Option<Receiver<()>>,
  state: CaptureState,
}

impl<P: Preview> InteractiveCapture<P> {
  pub fn new(preview: P) -> Self {
    Self {
      preview,
      bindings: KeyBindings::default(),
      interrupt: None,
      state: CaptureState::AwaitingFrame,
    }
  }

  pub fn with_bindings(mut self, bindings: KeyBindings) -> Self {
    self.bindings = bindings;
    self
  }

  /// 收到中断信号时按退出键处理
  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  pub fn state(&self) -> CaptureState {
    self.state
  }

  pub fn bindings(&self) -> KeyBindings {
    self.bindings
  }

  pub fn run<S, E>(&mut self, source: S) -> Result<CaptureOutcome, CaptureError>
  where
    S: IntoIterator<Item = Result<Frame, E>>,
    E: std::error::Error + Send + Sync + 'static,
  {
    info!(
      "按 '{}' 拍照, 按 '{}' 退出",
      self.bindings.capture.escape_default(),
      self.bindings.quit
    );

    self.state = CaptureState::AwaitingFrame;
    let mut previewed = 0u64;

    for frame in source {
      let frame = frame.map_err(|e| CaptureError::SourceError(Box::new(e)))?;
      if self.state == CaptureState::AwaitingFrame {
        debug!("收到第一帧: {}x{}", frame.width(), frame.height());
        self.state = CaptureState::Previewing;
      }

      self
        .preview
        .show(&frame)
        .map_err(|e| CaptureError::PreviewError(Box::new(e)))?;
      previewed += 1;

      let key = self
        .preview
        .poll_key()
        .map_err(|e| CaptureError::PreviewError(Box::new(e)))?
        .and_then(|code| self.bindings.classify(code));

      let interrupted = self
        .interrupt
        .as_ref()
        .map(|rx| rx.try_recv().is_ok())
        .unwrap_or(false);

      match key {
        Some(Key::Capture) => {
          info!("已拍照 (预览 {} 帧)", previewed);
          self.state = CaptureState::Captured;
          return Ok(CaptureOutcome::Captured(frame));
        }
        Some(Key::Quit) => {
          info!("用户退出");
          self.state = CaptureState::Terminated;
          return Ok(CaptureOutcome::Terminated);
        }
        None if interrupted => {
          warn!("收到中断信号，退出预览");
          self.state = CaptureState::Terminated;
          return Ok(CaptureOutcome::Terminated);
        }
        None => {}
      }
    }

    warn!("拍照前视频流已结束");
    Err(CaptureError::StreamEnded)
  }
}

/// 注册 Ctrl-C 处理，返回接收中断信号的通道
pub fn interrupt_channel() -> Result<Receiver<()>, CaptureError> {
  let (tx, rx) = std::sync::mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号");
    let _ = tx.send(());
  })?;
  Ok(rx)
}
