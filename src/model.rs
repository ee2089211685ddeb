// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/model.rs - 模型
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

use ndarray::{Array2, Array3};

use crate::frame::Batch;

/// 分类模型，输出形状为 (1, K) 的类别概率
pub trait Classifier {
  type Error;

  fn predict(&self, batch: &Batch) -> Result<Array2<f32>, Self::Error>;
}

impl<M: Classifier + ?Sized> Classifier for &M {
  type Error = M::Error;

  fn predict(&self, batch: &Batch) -> Result<Array2<f32>, Self::Error> {
    (**self).predict(batch)
  }
}

/// 最后一个卷积层的特征图及目标类别分数对其的梯度，形状均为 (h, w, K)
#[derive(Debug, Clone)]
pub struct Activations {
  pub features: Array3<f32>,
  pub gradients: Array3<f32>,
}

/// 能够提供 Grad-CAM 所需激活与梯度的模型
pub trait ClassActivation: Classifier {
  fn activations(&self, batch: &Batch, class_id: usize) -> Result<Activations, Self::Error>;
}

impl<M: ClassActivation + ?Sized> ClassActivation for &M {
  fn activations(&self, batch: &Batch, class_id: usize) -> Result<Activations, Self::Error> {
    (**self).activations(batch, class_id)
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Option<Self>;
}

/// 胸片分类结果，顺序与模型输出下标一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PneumoniaLabel {
  Bacterial,
  Normal,
  Viral,
}

impl PneumoniaLabel {
  pub const COUNT: usize = 3;
}

impl WithLabel for PneumoniaLabel {
  fn to_label_str(&self) -> String {
    match self {
      PneumoniaLabel::Bacterial => "bacteriana",
      PneumoniaLabel::Normal => "normal",
      PneumoniaLabel::Viral => "viral",
    }
    .to_string()
  }

  fn to_label_id(&self) -> u32 {
    *self as u32
  }

  fn from_label_id(id: u32) -> Option<Self> {
    match id {
      0 => Some(PneumoniaLabel::Bacterial),
      1 => Some(PneumoniaLabel::Normal),
      2 => Some(PneumoniaLabel::Viral),
      _ => None,
    }
  }
}

impl std::fmt::Display for PneumoniaLabel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.to_label_str())
  }
}

#[cfg(feature = "model_linear_cam")]
mod linear_cam;
#[cfg(feature = "model_linear_cam")]
pub use self::linear_cam::{LinearCamModel, LinearCamModelBuilder, LinearCamModelError};
