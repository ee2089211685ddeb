// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/bin/simple_continueshot.rs - 批量胸片推理
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use feiyan::{
  Detector, FromUrl,
  grad_cam::{DEFAULT_TRANSPARENCY, ModelGradCam},
  input::InputWrapper,
  model::LinearCamModelBuilder,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};
use tracing::info;

/// Feiyan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型权重路径
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，通常为 folder:///path/to/xrays
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 热力图叠加透明度 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_TRANSPARENCY, value_name = "ALPHA")]
  pub transparency: f32,
  /// 最多处理的图像数
  #[arg(long)]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let model = LinearCamModelBuilder::from_url(&args.model)?.build()?;
  let grad_cam = ModelGradCam::new(&model).with_transparency(args.transparency);
  let output = OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_interrupt(true)
    .run_task(input.into_hwc(), Detector::new(&model, grad_cam), output)?;

  Ok(())
}
