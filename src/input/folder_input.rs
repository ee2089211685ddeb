// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/input/folder_input.rs - 目录批量输入
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

use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Image,
  input::read_image_file::{ImageFileInputError, LoadOptions, load_image},
  url_to_path,
};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// 按文件名顺序依次读取目录中的图像
pub struct FolderInput {
  files: std::vec::IntoIter<PathBuf>,
  options: LoadOptions,
}

impl FromUrlWithScheme for FolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for FolderInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let options = LoadOptions::from_url(url)?;
    let directory = url_to_path(url)?;
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false);
      if path.is_file() && is_image {
        files.push(path);
      }
    }
    files.sort();
    info!("目录 {} 中共有 {} 张图像", directory.display(), files.len());

    Ok(FolderInput {
      files: files.into_iter(),
      options,
    })
  }
}

impl FolderInput {
  pub fn into_hwc(self) -> FolderInputHwc {
    FolderInputHwc { inner: self }
  }
}

pub struct FolderInputHwc {
  inner: FolderInput,
}

impl Iterator for FolderInputHwc {
  type Item = Image;

  fn next(&mut self) -> Option<Self::Item> {
    for path in self.inner.files.by_ref() {
      match load_image(&path, &self.inner.options) {
        Ok(image) => return Some(image),
        Err(e) => error!("读取 {} 失败, 跳过: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn iterates_images_and_skips_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(3, 2, Rgb([1, 2, 3]))
      .save(dir.path().join("b.png"))
      .unwrap();
    RgbImage::from_pixel(5, 4, Rgb([4, 5, 6]))
      .save(dir.path().join("a.png"))
      .unwrap();
    std::fs::write(dir.path().join("c.png"), b"not an image").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let frames: Vec<Image> = FolderInput::from_url(&url).unwrap().into_hwc().collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].dim(), (4, 5, 3));
    assert_eq!(frames[1].dim(), (2, 3, 3));
  }

  #[test]
  fn reads_directory_with_space_and_cjk_name() {
    let dir = tempfile::tempdir().unwrap();
    let xrays = dir.path().join("胸片 2024");
    std::fs::create_dir_all(&xrays).unwrap();
    RgbImage::from_pixel(2, 2, Rgb([7, 7, 7]))
      .save(xrays.join("a.png"))
      .unwrap();

    let url = Url::parse(&format!("folder://{}?gray", xrays.display())).unwrap();
    let frames: Vec<Image> = FolderInput::from_url(&url).unwrap().into_hwc().collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].dim(), (2, 2, 1));
  }

  #[test]
  fn missing_directory_is_an_io_error() {
    let url = Url::parse("folder:///definitely/not/here").unwrap();
    assert!(matches!(
      FolderInput::from_url(&url),
      Err(ImageFileInputError::IoError(_))
    ));
  }
}
