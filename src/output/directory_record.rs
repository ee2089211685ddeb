// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use chrono::{Datelike, Utc};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  detector::Prediction,
  frame::{FrameError, Image},
  model::PneumoniaLabel,
  output::{
    Render,
    record::{Record, RecordFormat, heatmap_image},
  },
  url_to_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("热力图错误: {0}")]
  FrameError(#[from] FrameError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("路径解码错误: {0}")]
  PathDecodeError(#[from] std::string::FromUtf8Error),
}

/// 按日期分目录保存热力图与记录
///
/// 默认只保存非 `normal` 的结果，URL 带 `always` 时全部保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: Record,
  frame_counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let format = {
      let mut format = RecordFormat::default();
      for (k, v) in uri.query_pairs() {
        if k == "record" {
          format = RecordFormat::with(&v);
          break;
        }
      }
      format
    };

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: url_to_path(uri)?,
      record: Record { format },
      frame_counter: Mutex::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counter
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    let id = counter.wrapping_add(1);
    *counter = id;
    id
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<Image, Prediction> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, _frame: &Image, result: &Prediction) -> Result<(), Self::Error> {
    if !self.always && result.label == PneumoniaLabel::Normal {
      debug!("结果为 normal, 跳过记录");
      return Ok(());
    }

    let path = self.frame_path()?;
    heatmap_image(result)?.save(&path)?;
    self.record.record(result, &path)?;
    info!("记录结果到: {}", path.display());
    Ok(())
  }
}
