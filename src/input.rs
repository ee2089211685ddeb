// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/input.rs - 图像输入
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

use thiserror::Error;

use crate::{FromUrl, frame::Image};

#[cfg(feature = "read_image_file")]
mod folder_input;
#[cfg(feature = "read_image_file")]
mod read_image_file;

#[cfg(feature = "read_image_file")]
pub use self::folder_input::{FolderInput, FolderInputHwc};
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{
  ImageFileInput, ImageFileInputError, ImageFileInputHwc, LoadOptions, load_image,
};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "read_image_file")]
  Folder(FolderInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
      if url.scheme() == FolderInput::SCHEME {
        let input = FolderInput::from_url(url)?;
        return Ok(InputWrapper::Folder(input));
      }
    }
    let _ = url;
    Err(InputError::SchemeMismatch)
  }
}

impl InputWrapper {
  pub fn into_hwc(self) -> InputWrapperHwcIter {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => InputWrapperHwcIter::ReadImageFile(input.into_hwc()),
      #[cfg(feature = "read_image_file")]
      InputWrapper::Folder(input) => InputWrapperHwcIter::Folder(input.into_hwc()),
    }
  }
}

pub enum InputWrapperHwcIter {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInputHwc),
  #[cfg(feature = "read_image_file")]
  Folder(FolderInputHwc),
}

impl Iterator for InputWrapperHwcIter {
  type Item = Image;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapperHwcIter::ReadImageFile(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapperHwcIter::Folder(input) => input.next(),
    }
  }
}
