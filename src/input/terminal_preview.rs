// 该文件是 Jishu （计数） 项目的一部分。
// src/input/terminal_preview.rs - 无窗口环境下的终端预览
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

use std::{
  convert::Infallible,
  io::BufRead,
  sync::mpsc::{Receiver, TryRecvError},
  thread,
};

use tracing::{debug, warn};

use crate::{frame::Frame, input::capture::Preview};

const SPACE_KEY: i32 = b' ' as i32;
const PREVIEW_LOG_INTERVAL: u64 = 30;

/// 从标准输入逐行读取按键：空行视为空格，其余取首字符
pub struct TerminalPreview {
  keys: Receiver<i32>,
  frames: u64,
  closed: bool,
}

impl TerminalPreview {
  pub fn new() -> Self {
    let (tx, rx) = std::sync::mpsc::channel();
    thread::spawn(move || {
      let stdin = std::io::stdin();
      for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if tx.send(line_to_key(&line)).is_err() {
          break;
        }
      }
      debug!("标准输入已关闭");
    });
    Self::from_receiver(rx)
  }

  pub fn from_receiver(keys: Receiver<i32>) -> Self {
    Self {
      keys,
      frames: 0,
      closed: false,
    }
  }
}

impl Default for TerminalPreview {
  fn default() -> Self {
    Self::new()
  }
}

pub fn line_to_key(line: &str) -> i32 {
  match line.trim_end_matches(['\r', '\n']).chars().next() {
    None => SPACE_KEY,
    Some(c) => c as i32,
  }
}

impl Preview for TerminalPreview {
  type Error = Infallible;

  fn show(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    if self.frames % PREVIEW_LOG_INTERVAL == 0 {
      debug!(
        "预览第 {} 帧: {}x{}",
        self.frames,
        frame.width(),
        frame.height()
      );
    }
    self.frames += 1;
    Ok(())
  }

  fn poll_key(&mut self) -> Result<Option<i32>, Self::Error> {
    match self.keys.try_recv() {
      Ok(code) => Ok(Some(code)),
      Err(TryRecvError::Empty) => Ok(None),
      Err(TryRecvError::Disconnected) => {
        if !self.closed {
          warn!("终端输入已关闭，只能通过 Ctrl-C 退出");
          self.closed = true;
        }
        Ok(None)
      }
    }
  }
}
