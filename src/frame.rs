// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/frame.rs - HWC 图像与批次张量定义
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

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::{Array3, Array4, ArrayBase, Data, Ix3};
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;
pub const GRAY_CHANNELS: usize = 1;

/// 原始图像，形状 (H, W, C)
pub type Image = Array3<u8>;
/// 模型输入批次，形状 (1, H, W, C)
pub type Batch = Array4<f32>;
/// Grad-CAM 热力图，形状与输入图像一致
pub type Heatmap = Array3<u8>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("不支持的通道数: {0}")]
  UnsupportedChannels(usize),
  #[error("图像尺寸过大: {0}x{1}")]
  TooLarge(usize, usize),
}

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> Result<RgbImage, FrameError>;
}

pub trait FromRgbImage {
  fn from_rgb_image(image: &RgbImage) -> Self;
}

pub trait FromGrayImage {
  fn from_gray_image(image: &GrayImage) -> Self;
}

fn dimensions(height: usize, width: usize) -> Result<(u32, u32), FrameError> {
  let w = u32::try_from(width).map_err(|_| FrameError::TooLarge(height, width))?;
  let h = u32::try_from(height).map_err(|_| FrameError::TooLarge(height, width))?;
  Ok((w, h))
}

impl<S> ToRgbImage for ArrayBase<S, Ix3>
where
  S: Data<Elem = u8>,
{
  fn to_rgb_image(&self) -> Result<RgbImage, FrameError> {
    let (height, width, channels) = self.dim();
    let (w, h) = dimensions(height, width)?;

    match channels {
      RGB_CHANNELS => Ok(ImageBuffer::from_fn(w, h, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([self[[y, x, 0]], self[[y, x, 1]], self[[y, x, 2]]])
      })),
      // 灰度图复制到三个通道
      GRAY_CHANNELS => Ok(ImageBuffer::from_fn(w, h, |x, y| {
        let v = self[[y as usize, x as usize, 0]];
        Rgb([v, v, v])
      })),
      other => Err(FrameError::UnsupportedChannels(other)),
    }
  }
}

impl FromRgbImage for Image {
  fn from_rgb_image(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn(
      (height as usize, width as usize, RGB_CHANNELS),
      |(y, x, c)| image.get_pixel(x as u32, y as u32)[c],
    )
  }
}

impl FromGrayImage for Image {
  fn from_gray_image(image: &GrayImage) -> Self {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn(
      (height as usize, width as usize, GRAY_CHANNELS),
      |(y, x, _)| image.get_pixel(x as u32, y as u32)[0],
    )
  }
}

/// 按 ITU-R BT.601 权重把 RGB 图像转为亮度
pub fn luminance(image: &RgbImage) -> GrayImage {
  ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
    let Rgb([r, g, b]) = *image.get_pixel(x, y);
    let l = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    Luma([l.round().clamp(0.0, 255.0) as u8])
  })
}
