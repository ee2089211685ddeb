// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/preprocess.rs - 图像归一化与批次构造
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

use ndarray::{ArrayBase, Axis, Data, Ix3};
use num_traits::AsPrimitive;
use thiserror::Error;
use tracing::debug;

use crate::frame::Batch;

/// 默认缩放系数，把 u8 像素映射到 [0, 1]
pub const DEFAULT_SCALE: f32 = 1.0 / 255.0;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Error, Debug, PartialEq)]
pub enum PreprocessError {
  #[error("归一化配置错误: {0}")]
  Config(String),
  #[error("通道数不匹配: 归一化参数为 {expected} 个通道, 图像为 {actual} 个通道")]
  ChannelMismatch { expected: usize, actual: usize },
}

/// 逐通道归一化: `y = (x * scale - mean[c]) / std[c]`
///
/// 内部保存为 `y = x * alpha[c] + beta[c]`。长度为 1 的参数会广播到所有通道。
#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
  alpha: Vec<f32>,
  beta: Vec<f32>,
}

impl Default for Normalize {
  fn default() -> Self {
    Self {
      alpha: vec![DEFAULT_SCALE],
      beta: vec![0.0],
    }
  }
}

impl Normalize {
  pub fn new(
    scale: Option<f32>,
    mean: Option<Vec<f32>>,
    std: Option<Vec<f32>>,
  ) -> Result<Self, PreprocessError> {
    let scale = scale.unwrap_or(DEFAULT_SCALE);
    let mean = mean.unwrap_or_else(|| vec![0.0]);
    let std = std.unwrap_or_else(|| vec![1.0]);

    if !(scale.is_finite() && scale > 0.0) {
      return Err(PreprocessError::Config(format!(
        "缩放系数必须为正数, 实际为 {scale}"
      )));
    }
    if mean.is_empty() || std.is_empty() {
      return Err(PreprocessError::Config("均值与标准差不能为空".to_string()));
    }
    if mean.len() != std.len() && mean.len() != 1 && std.len() != 1 {
      return Err(PreprocessError::Config(format!(
        "均值长度 {} 与标准差长度 {} 不一致",
        mean.len(),
        std.len()
      )));
    }
    for (i, &s) in std.iter().enumerate() {
      if !(s.is_finite() && s > 0.0) {
        return Err(PreprocessError::Config(format!(
          "第 {i} 个标准差必须为正数, 实际为 {s}"
        )));
      }
    }
    if let Some(m) = mean.iter().find(|m| !m.is_finite()) {
      return Err(PreprocessError::Config(format!("均值不是有限数: {m}")));
    }

    let len = mean.len().max(std.len());
    let pick = |v: &[f32], c: usize| if v.len() == 1 { v[0] } else { v[c] };
    let alpha = (0..len).map(|c| scale / pick(&std, c)).collect();
    let beta = (0..len).map(|c| -pick(&mean, c) / pick(&std, c)).collect();

    Ok(Self { alpha, beta })
  }

  /// ImageNet 预训练模型常用的均值与标准差
  pub fn imagenet() -> Self {
    let alpha = IMAGENET_STD.iter().map(|s| DEFAULT_SCALE / s).collect();
    let beta = IMAGENET_MEAN
      .iter()
      .zip(IMAGENET_STD)
      .map(|(m, s)| -m / s)
      .collect();
    Self { alpha, beta }
  }

  pub fn channels(&self) -> usize {
    self.alpha.len()
  }

  /// 归一化图像并添加批次维度，得到 (1, H, W, C) 的 f32 张量
  pub fn apply<S, T>(&self, image: &ArrayBase<S, Ix3>) -> Result<Batch, PreprocessError>
  where
    S: Data<Elem = T>,
    T: AsPrimitive<f32>,
  {
    let (height, width, channels) = image.dim();
    if self.channels() != 1 && self.channels() != channels {
      return Err(PreprocessError::ChannelMismatch {
        expected: self.channels(),
        actual: channels,
      });
    }

    let mut normalized = image.mapv(|v| AsPrimitive::<f32>::as_(v));
    if self.channels() == 1 {
      let (alpha, beta) = (self.alpha[0], self.beta[0]);
      normalized.mapv_inplace(|v| v * alpha + beta);
    } else {
      for (c, mut lane) in normalized.axis_iter_mut(Axis(2)).enumerate() {
        let (alpha, beta) = (self.alpha[c], self.beta[c]);
        lane.mapv_inplace(|v| v * alpha + beta);
      }
    }

    debug!("预处理完成: {}x{}x{}", height, width, channels);
    Ok(normalized.insert_axis(Axis(0)))
  }
}

/// 默认预处理: 除以 255 并添加批次维度
pub fn preprocess<S, T>(image: &ArrayBase<S, Ix3>) -> Batch
where
  S: Data<Elem = T>,
  T: AsPrimitive<f32>,
{
  image
    .mapv(|v| v.as_() * DEFAULT_SCALE)
    .insert_axis(Axis(0))
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::Array3;

  #[test]
  fn preprocess_returns_batch() {
    let image = Array3::<u8>::zeros((250, 250, 3));
    let batch = preprocess(&image);
    assert_eq!(batch.ndim(), 4);
    assert_eq!(batch.shape(), &[1, 250, 250, 3]);
  }

  #[test]
  fn preprocess_scales_to_unit_range() {
    let image = Array3::from_elem((2, 2, 1), 255u8);
    let batch = preprocess(&image);
    assert!(batch.iter().all(|&v| (v - 1.0).abs() < 1e-6));
  }

  #[test]
  fn preprocess_accepts_float_images() {
    let image = Array3::from_elem((3, 5, 3), 51.0f64);
    let batch = preprocess(&image);
    assert_eq!(batch.shape(), &[1, 3, 5, 3]);
    assert!((batch[[0, 1, 1, 1]] - 0.2).abs() < 1e-6);
  }

  #[test]
  fn default_normalize_matches_preprocess() {
    let image = Array3::from_shape_fn((4, 4, 3), |(y, x, c)| (y * 16 + x * 4 + c) as u8);
    assert_eq!(Normalize::default().apply(&image).unwrap(), preprocess(&image));
  }

  #[test]
  fn per_channel_mean_and_std() {
    let norm = Normalize::new(Some(1.0), Some(vec![1.0, 2.0, 3.0]), Some(vec![2.0])).unwrap();
    let image = Array3::from_elem((1, 1, 3), 5u8);
    let batch = norm.apply(&image).unwrap();
    assert_eq!(batch[[0, 0, 0, 0]], 2.0);
    assert_eq!(batch[[0, 0, 0, 1]], 1.5);
    assert_eq!(batch[[0, 0, 0, 2]], 1.0);
  }

  #[test]
  fn channel_mismatch_is_reported() {
    let image = Array3::<u8>::zeros((2, 2, 1));
    let err = Normalize::imagenet().apply(&image).unwrap_err();
    assert_eq!(
      err,
      PreprocessError::ChannelMismatch {
        expected: 3,
        actual: 1
      }
    );
  }

  #[test]
  fn invalid_config_is_rejected() {
    assert!(Normalize::new(Some(0.0), None, None).is_err());
    assert!(Normalize::new(None, None, Some(vec![0.0])).is_err());
    assert!(Normalize::new(None, Some(vec![0.0, 0.0]), Some(vec![1.0, 1.0, 1.0])).is_err());
  }
}
