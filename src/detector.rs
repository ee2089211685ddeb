// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/detector.rs - 肺炎分类与解释
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

use ndarray::ArrayView1;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::{Batch, Heatmap, Image},
  grad_cam::GradCam,
  model::{Classifier, PneumoniaLabel, WithLabel},
  preprocess::{Normalize, PreprocessError, preprocess},
};

#[derive(Error, Debug)]
pub enum DetectorError<ME, GE> {
  #[error("模型错误: {0}")]
  Model(ME),
  #[error("Grad-CAM 错误: {0}")]
  GradCam(GE),
  #[error("预处理错误: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("模型没有输出任何类别概率")]
  EmptyPrediction,
  #[error("模型输出批次大小应为 1, 实际为 {0}")]
  BatchSize(usize),
  #[error("类别概率不是有限数: {0}")]
  NonFinite(f32),
  #[error("类别下标 {0} 没有对应标签")]
  UnknownLabel(usize),
  #[error("热力图形状 {actual:?} 与图像形状 {expected:?} 不一致")]
  HeatmapShape {
    expected: (usize, usize, usize),
    actual: (usize, usize, usize),
  },
}

/// 单张图像的推理结果
#[derive(Debug, Clone)]
pub struct Prediction {
  pub label: PneumoniaLabel,
  pub probability: f32,
  pub heatmap: Heatmap,
}

impl Prediction {
  /// 拆成 (标签, 概率, 热力图)
  pub fn into_parts(self) -> (String, f32, Heatmap) {
    (self.label.to_label_str(), self.probability, self.heatmap)
  }
}

/// 返回最大概率的下标与值，相同时取下标最小者，NaN 被忽略
pub fn argmax(row: ArrayView1<f32>) -> Option<(usize, f32)> {
  let mut best: Option<(usize, f32)> = None;
  for (idx, &p) in row.iter().enumerate() {
    if p.is_nan() {
      continue;
    }
    match best {
      Some((_, score)) if p <= score => {}
      _ => best = Some((idx, p)),
    }
  }
  best
}

pub struct Detector<M, G> {
  model: M,
  grad_cam: G,
  normalize: Normalize,
}

impl<M: Classifier, G: GradCam> Detector<M, G> {
  pub fn new(model: M, grad_cam: G) -> Self {
    Self {
      model,
      grad_cam,
      normalize: Normalize::default(),
    }
  }

  /// 分类所用的归一化，需与 Grad-CAM 的归一化一致
  pub fn with_normalize(mut self, normalize: Normalize) -> Self {
    self.normalize = normalize;
    self
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  pub fn predict(&self, image: &Image) -> Result<Prediction, DetectorError<M::Error, G::Error>> {
    let batch = self.normalize.apply(image)?;
    classify(image, batch, &self.model, &self.grad_cam)
  }
}

/// 预处理、分类并生成 Grad-CAM 热力图，返回 (标签, 概率, 热力图)
pub fn predict<M, G>(
  image: &Image,
  model: &M,
  grad_cam: &G,
) -> Result<(String, f32, Heatmap), DetectorError<M::Error, G::Error>>
where
  M: Classifier,
  G: GradCam,
{
  classify(image, preprocess(image), model, grad_cam).map(Prediction::into_parts)
}

fn classify<M, G>(
  image: &Image,
  batch: Batch,
  model: &M,
  grad_cam: &G,
) -> Result<Prediction, DetectorError<M::Error, G::Error>>
where
  M: Classifier,
  G: GradCam,
{
  let probabilities = model.predict(&batch).map_err(DetectorError::Model)?;
  debug!("模型输出: {:?}", probabilities);

  let rows = probabilities.nrows();
  if rows != 1 {
    return Err(DetectorError::BatchSize(rows));
  }
  let (class_id, probability) =
    argmax(probabilities.row(0)).ok_or(DetectorError::EmptyPrediction)?;
  if !probability.is_finite() {
    return Err(DetectorError::NonFinite(probability));
  }
  let label = PneumoniaLabel::from_label_id(class_id as u32)
    .ok_or(DetectorError::UnknownLabel(class_id))?;

  let heatmap = grad_cam.grad_cam(image).map_err(DetectorError::GradCam)?;
  if heatmap.dim() != image.dim() {
    return Err(DetectorError::HeatmapShape {
      expected: image.dim(),
      actual: heatmap.dim(),
    });
  }

  info!("分类结果: {} ({:.2}%)", label, probability * 100.0);
  Ok(Prediction {
    label,
    probability,
    heatmap,
  })
}
