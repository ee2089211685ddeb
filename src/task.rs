// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/task.rs - 推理任务
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

use std::collections::BTreeMap;
use std::{thread, time::Duration};
use tracing::{info, warn};

use crate::{
  detector::{Detector, Prediction},
  frame::Image,
  grad_cam::GradCam,
  model::{Classifier, WithLabel},
  output::Render,
};

pub trait Task<I, D, O>: Sized {
  type Error;
  fn run_task(self, input: I, detector: D, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  ME: std::error::Error + Sync + Send + 'static,
  GE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Image>,
  M: Classifier<Error = ME>,
  G: GradCam<Error = GE>,
  O: Render<Image, Prediction, Error = RE>,
> Task<I, Detector<M, G>, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, detector: Detector<M, G>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = detector.predict(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    info!(
      "诊断结果: {}, 概率: {:.2}%",
      result.label.to_label_str(),
      result.probability * 100.0
    );
    output.render_result(&frame, &result)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  handle_interrupt: bool,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 注册 Ctrl-C 处理，收到信号后在下一张图像前退出
  pub fn with_interrupt(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }
}

impl<
  ME: std::error::Error + Sync + Send + 'static,
  GE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Image>,
  M: Classifier<Error = ME>,
  G: GradCam<Error = GE>,
  O: Render<Image, Prediction, Error = RE>,
> Task<I, Detector<M, G>, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, detector: Detector<M, G>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    if self.handle_interrupt {
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        let _ = tx.send(());
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })?;
    }

    let mut frame_index = 0;
    let mut summary: BTreeMap<String, usize> = BTreeMap::new();
    let mut now = std::time::Instant::now();
    for frame in input {
      frame_index += 1;
      info!("处理第 {} 张图像", frame_index);
      let result = detector.predict(&frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      now = std::time::Instant::now();
      info!(
        "{}: {:.2}%, 耗时: {:.2?} / {:.2?}",
        result.label.to_label_str(),
        result.probability * 100.0,
        elapsed_a,
        elapsed_b
      );
      *summary.entry(result.label.to_label_str()).or_default() += 1;

      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定图像数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    for (label, count) in &summary {
      info!("{}: {} 张", label, count);
    }
    info!("任务完成，共处理 {} 张图像", frame_index);
    Ok(())
  }
}
