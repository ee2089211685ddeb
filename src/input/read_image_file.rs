// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::Path;

use image::{ImageReader, imageops::FilterType};
use imageproc::contrast::equalize_histogram;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FromGrayImage, FromRgbImage, Image},
  url_to_path,
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Invalid option: {0}")]
  InvalidOption(String),
  #[error("Path decoding error: {0}")]
  PathDecodeError(#[from] std::string::FromUtf8Error),
}

/// 读取图像时的选项，来自 URL 查询参数
///
/// - `gray`: 读取为单通道灰度图
/// - `equalize`: 灰度直方图均衡化（隐含 `gray`）
/// - `size=N`: 缩放到 N x N
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
  pub gray: bool,
  pub equalize: bool,
  pub size: Option<u32>,
}

impl LoadOptions {
  pub fn from_url(url: &Url) -> Result<Self, ImageFileInputError> {
    let mut options = LoadOptions::default();
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "gray" => options.gray = true,
        "equalize" => {
          options.gray = true;
          options.equalize = true;
        }
        "size" => {
          let size = v
            .parse::<u32>()
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| ImageFileInputError::InvalidOption(format!("size={v}")))?;
          options.size = Some(size);
        }
        other => debug!("忽略未知参数: {}", other),
      }
    }
    Ok(options)
  }
}

/// 按选项读取一张图像，得到 (H, W, C) 数组
pub fn load_image(path: &Path, options: &LoadOptions) -> Result<Image, ImageFileInputError> {
  let mut image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  if let Some(size) = options.size {
    image = image.resize_exact(size, size, FilterType::Triangle);
  }

  let frame = if options.gray {
    let mut gray = image.to_luma8();
    if options.equalize {
      gray = equalize_histogram(&gray);
    }
    Image::from_gray_image(&gray)
  } else {
    Image::from_rgb_image(&image.to_rgb8())
  };

  debug!("读取图像 {}: {:?}", path.display(), frame.dim());
  Ok(frame)
}

pub struct ImageFileInput {
  image: Option<Image>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let options = LoadOptions::from_url(url)?;
    let image = load_image(&url_to_path(url)?, &options)?;

    Ok(ImageFileInput { image: Some(image) })
  }
}

impl ImageFileInput {
  pub fn into_hwc(self) -> ImageFileInputHwc {
    ImageFileInputHwc { inner: self }
  }
}

pub struct ImageFileInputHwc {
  inner: ImageFileInput,
}

impl Iterator for ImageFileInputHwc {
  type Item = Image;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.image.take()
  }
}
