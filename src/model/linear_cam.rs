// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/model/linear_cam.rs - 线性类别激活映射模型
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

use ndarray::{Array1, Array2, Array3, ArrayView3, Axis};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Batch,
  model::{Activations, ClassActivation, Classifier, PneumoniaLabel},
  url_to_path,
};

#[derive(Error, Debug)]
pub enum LinearCamModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型解析错误: {0}")]
  ModelParseError(#[from] serde_json::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型路径解码错误: {0}")]
  ModelPathDecodeError(#[from] std::string::FromUtf8Error),
  #[error("输入形状错误: {0}")]
  InputShape(String),
  #[error("类别下标越界: {0}")]
  ClassOutOfRange(usize),
}

/// 1x1 卷积 + 全局平均池化 + softmax 的分类头
///
/// 特征图即归一化后的输入，`weights[k][c]` 为类别 `k` 在通道 `c` 上的权重。
#[derive(Debug, Clone, Deserialize)]
pub struct LinearCamModel {
  weights: Vec<Vec<f32>>,
  bias: Vec<f32>,
}

pub struct LinearCamModelBuilder {
  model_path: PathBuf,
}

impl FromUrlWithScheme for LinearCamModelBuilder {
  const SCHEME: &'static str = "cam";
}

impl FromUrl for LinearCamModelBuilder {
  type Error = LinearCamModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LinearCamModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(LinearCamModelBuilder {
      model_path: url_to_path(url)?,
    })
  }
}

impl LinearCamModelBuilder {
  pub fn build(self) -> Result<LinearCamModel, LinearCamModelError> {
    info!("加载模型文件: {}", self.model_path.display());
    let data = std::fs::read_to_string(&self.model_path)?;
    debug!("模型文件大小: {:.2} KB", data.len() as f64 / 1024.0);

    let model: LinearCamModel = serde_json::from_str(&data)?;
    model.validate()?;
    info!(
      "模型加载完成: {} 个类别, {} 个通道",
      model.num_classes(),
      model.num_channels()
    );
    Ok(model)
  }
}

impl LinearCamModel {
  pub fn new(weights: Vec<Vec<f32>>, bias: Vec<f32>) -> Result<Self, LinearCamModelError> {
    let model = Self { weights, bias };
    model.validate()?;
    Ok(model)
  }

  pub fn num_classes(&self) -> usize {
    self.weights.len()
  }

  pub fn num_channels(&self) -> usize {
    self.weights.first().map(Vec::len).unwrap_or(0)
  }

  fn validate(&self) -> Result<(), LinearCamModelError> {
    if self.weights.len() != PneumoniaLabel::COUNT {
      error!(
        "预期模型类别数量为 {}, 实际为 {}",
        PneumoniaLabel::COUNT,
        self.weights.len()
      );
      return Err(LinearCamModelError::ModelInvalid(format!(
        "预期模型类别数量为 {}, 实际为 {}",
        PneumoniaLabel::COUNT,
        self.weights.len()
      )));
    }
    if self.bias.len() != self.weights.len() {
      return Err(LinearCamModelError::ModelInvalid(format!(
        "偏置数量 {} 与类别数量 {} 不一致",
        self.bias.len(),
        self.weights.len()
      )));
    }
    let channels = self.num_channels();
    if channels == 0 || self.weights.iter().any(|row| row.len() != channels) {
      return Err(LinearCamModelError::ModelInvalid(
        "每个类别的权重长度必须一致且非空".to_string(),
      ));
    }
    let all = self.weights.iter().flatten().chain(self.bias.iter());
    if all.copied().any(|v| !v.is_finite()) {
      return Err(LinearCamModelError::ModelInvalid(
        "权重中存在非有限数".to_string(),
      ));
    }
    Ok(())
  }

  fn features<'a>(&self, batch: &'a Batch) -> Result<ArrayView3<'a, f32>, LinearCamModelError> {
    let (n, h, w, c) = batch.dim();
    if n != 1 {
      return Err(LinearCamModelError::InputShape(format!(
        "批次大小必须为 1, 实际为 {n}"
      )));
    }
    if h == 0 || w == 0 {
      return Err(LinearCamModelError::InputShape("输入图像为空".to_string()));
    }
    if c != self.num_channels() {
      return Err(LinearCamModelError::InputShape(format!(
        "模型需要 {} 个通道, 输入为 {} 个通道",
        self.num_channels(),
        c
      )));
    }
    Ok(batch.index_axis(Axis(0), 0))
  }

  fn logits(&self, features: &ArrayView3<f32>) -> Array1<f32> {
    let pooled = features
      .sum_axis(Axis(0))
      .sum_axis(Axis(0))
      .mapv(|v| v / (features.dim().0 * features.dim().1) as f32);

    self
      .weights
      .iter()
      .zip(&self.bias)
      .map(|(row, b)| row.iter().zip(&pooled).map(|(w, x)| w * x).sum::<f32>() + b)
      .collect()
  }
}

fn softmax(logits: &Array1<f32>) -> Array1<f32> {
  let max = logits.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
  let exp = logits.mapv(|v| (v - max).exp());
  let sum = exp.sum();
  exp / sum
}

impl Classifier for LinearCamModel {
  type Error = LinearCamModelError;

  fn predict(&self, batch: &Batch) -> Result<Array2<f32>, Self::Error> {
    let features = self.features(batch)?;
    let probabilities = softmax(&self.logits(&features));
    debug!("类别概率: {:?}", probabilities);
    Ok(probabilities.insert_axis(Axis(0)))
  }
}

impl ClassActivation for LinearCamModel {
  fn activations(&self, batch: &Batch, class_id: usize) -> Result<Activations, Self::Error> {
    let row = self
      .weights
      .get(class_id)
      .ok_or(LinearCamModelError::ClassOutOfRange(class_id))?;
    let features = self.features(batch)?;
    let (h, w, c) = features.dim();
    let area = (h * w) as f32;

    // logit 对每个像素的梯度为 W[k][c] / (H * W)
    let gradients = Array3::from_shape_fn((h, w, c), |(_, _, k)| row[k] / area);

    Ok(Activations {
      features: features.to_owned(),
      gradients,
    })
  }
}
