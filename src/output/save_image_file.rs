// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detector::Prediction,
  frame::{FrameError, Image},
  output::{
    Render,
    record::{Record, RecordFormat, heatmap_image},
  },
  url_to_path,
};

pub struct SaveImageFileOutput {
  path: PathBuf,
  record: Record,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("热力图错误: {0}")]
  FrameError(FrameError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("路径解码错误: {0}")]
  PathDecodeError(std::string::FromUtf8Error),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let format = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| RecordFormat::with(&v))
      .unwrap_or_default();

    Ok(SaveImageFileOutput {
      path: url_to_path(uri).map_err(SaveImageFileError::PathDecodeError)?,
      record: Record { format },
    })
  }
}

impl SaveImageFileOutput {
  fn save_prediction(&self, prediction: &Prediction) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    heatmap_image(prediction)
      .map_err(SaveImageFileError::FrameError)?
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;
    self
      .record
      .record(prediction, &self.path)
      .map_err(SaveImageFileError::IoError)?;

    warn!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<Image, Prediction> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, _frame: &Image, result: &Prediction) -> Result<(), Self::Error> {
    self.save_prediction(result)
  }
}
