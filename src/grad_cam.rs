// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/grad_cam.rs - Grad-CAM 热力图
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

use std::convert::Infallible;

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, imageops::FilterType};
use imageproc::map::map_pixels;
use ndarray::{Array2, Axis};
use thiserror::Error;
use tracing::debug;

use crate::{
  detector::argmax,
  frame::{
    FrameError, FromGrayImage, FromRgbImage, GRAY_CHANNELS, Heatmap, Image, ToRgbImage, luminance,
  },
  model::{Activations, ClassActivation},
  preprocess::{Normalize, PreprocessError},
};

/// 热力图叠加到原图时的透明度
pub const DEFAULT_TRANSPARENCY: f32 = 0.8;

/// 根据图像生成与其形状一致的 u8 热力图
pub trait GradCam {
  type Error;

  fn grad_cam(&self, image: &Image) -> Result<Heatmap, Self::Error>;
}

impl<F> GradCam for F
where
  F: Fn(&Image) -> Heatmap,
{
  type Error = Infallible;

  fn grad_cam(&self, image: &Image) -> Result<Heatmap, Self::Error> {
    Ok(self(image))
  }
}

#[derive(Error, Debug)]
pub enum GradCamError<ME> {
  #[error("模型错误: {0}")]
  Model(ME),
  #[error("预处理错误: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("图像错误: {0}")]
  Frame(#[from] FrameError),
  #[error("模型没有输出任何类别概率")]
  EmptyPrediction,
  #[error("激活与梯度形状不一致: {0:?} / {1:?}")]
  ShapeMismatch(Vec<usize>, Vec<usize>),
}

/// 基于模型激活与梯度的 Grad-CAM
pub struct ModelGradCam<M> {
  model: M,
  normalize: Normalize,
  transparency: f32,
}

impl<M: ClassActivation> ModelGradCam<M> {
  pub fn new(model: M) -> Self {
    Self {
      model,
      normalize: Normalize::default(),
      transparency: DEFAULT_TRANSPARENCY,
    }
  }

  /// 选择类别所用的归一化，需与 `Detector::with_normalize` 一致
  pub fn with_normalize(mut self, normalize: Normalize) -> Self {
    self.normalize = normalize;
    self
  }

  /// 透明度限制在 [0, 1]，非有限数回退到默认值
  pub fn with_transparency(mut self, transparency: f32) -> Self {
    self.transparency = if transparency.is_finite() {
      transparency.clamp(0.0, 1.0)
    } else {
      DEFAULT_TRANSPARENCY
    };
    self
  }

  /// 针对指定类别生成热力图
  pub fn grad_cam_for_class(
    &self,
    image: &Image,
    class_id: usize,
  ) -> Result<Heatmap, GradCamError<M::Error>> {
    let batch = self.normalize.apply(image)?;
    let activations = self
      .model
      .activations(&batch, class_id)
      .map_err(GradCamError::Model)?;
    let cam = class_activation_map(&activations).ok_or_else(|| {
      GradCamError::ShapeMismatch(
        activations.features.shape().to_vec(),
        activations.gradients.shape().to_vec(),
      )
    })?;
    debug!("类别 {} 的激活图尺寸: {:?}", class_id, cam.dim());
    Ok(render_heatmap(image, &cam, self.transparency)?)
  }
}

impl<M: ClassActivation> GradCam for ModelGradCam<M> {
  type Error = GradCamError<M::Error>;

  fn grad_cam(&self, image: &Image) -> Result<Heatmap, Self::Error> {
    let batch = self.normalize.apply(image)?;
    let probabilities = self.model.predict(&batch).map_err(GradCamError::Model)?;
    let (class_id, _) = probabilities
      .rows()
      .into_iter()
      .next()
      .and_then(argmax)
      .ok_or(GradCamError::EmptyPrediction)?;
    self.grad_cam_for_class(image, class_id)
  }
}

/// 计算归一化到 [0, 1] 的类别激活图
///
/// 通道权重为梯度的空间均值，加权求和后经过 ReLU，再除以最大值。
/// 最大值不为正时返回全零。特征与梯度形状不一致时返回 `None`。
pub fn class_activation_map(activations: &Activations) -> Option<Array2<f32>> {
  let Activations {
    features,
    gradients,
  } = activations;
  if features.dim() != gradients.dim() {
    return None;
  }

  let (h, w, _) = features.dim();
  if h == 0 || w == 0 {
    return Some(Array2::zeros((h, w)));
  }

  let weights = gradients
    .sum_axis(Axis(0))
    .sum_axis(Axis(0))
    .mapv(|g| g / (h * w) as f32);
  let mut cam = features.map_axis(Axis(2), |lane| lane.dot(&weights).max(0.0));

  let max = cam.fold(0.0f32, |acc, &v| acc.max(v));
  if max > 0.0 {
    cam.mapv_inplace(|v| v / max);
  } else {
    cam.fill(0.0);
  }
  Some(cam)
}

/// JET 色表: 蓝 -> 青 -> 黄 -> 红
pub fn jet(value: u8) -> Rgb<u8> {
  let x = value as f32 / 255.0;
  let channel =
    |offset: f32| ((1.5 - (4.0 * x - offset).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
  Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// 把激活图放大到图像尺寸，着色后叠加到原图
pub fn render_heatmap(
  image: &Image,
  cam: &Array2<f32>,
  transparency: f32,
) -> Result<Heatmap, FrameError> {
  let (height, width, channels) = image.dim();
  let base = image.to_rgb_image()?;
  let (w, h) = base.dimensions();

  let (cam_h, cam_w) = cam.dim();
  let resized = if cam_h == 0 || cam_w == 0 {
    GrayImage::new(w, h)
  } else {
    let gray: GrayImage = ImageBuffer::from_fn(cam_w as u32, cam_h as u32, |x, y| {
      let v = cam[[y as usize, x as usize]].clamp(0.0, 1.0);
      Luma([(v * 255.0).round() as u8])
    });
    image::imageops::resize(&gray, w, h, FilterType::Triangle)
  };
  let colored: RgbImage = map_pixels(&resized, |p: Luma<u8>| jet(p[0]));

  let blended: RgbImage = ImageBuffer::from_fn(w, h, |x, y| {
    let src = base.get_pixel(x, y);
    let heat = colored.get_pixel(x, y);
    let mix = |c: usize| (src[c] as f32 + transparency * heat[c] as f32).round().min(255.0) as u8;
    Rgb([mix(0), mix(1), mix(2)])
  });

  debug!("热力图生成完成: {}x{}x{}", height, width, channels);
  if channels == GRAY_CHANNELS {
    Ok(Image::from_gray_image(&luminance(&blended)))
  } else {
    Ok(Image::from_rgb_image(&blended))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::{Array3, Array4, array};

  use crate::{frame::Batch, model::Classifier};

  /// 左半边激活强的假模型
  struct LeftSideModel;

  impl Classifier for LeftSideModel {
    type Error = String;

    fn predict(&self, _batch: &Batch) -> Result<Array2<f32>, Self::Error> {
      Ok(array![[0.2, 0.7, 0.1]])
    }
  }

  impl ClassActivation for LeftSideModel {
    fn activations(&self, batch: &Batch, class_id: usize) -> Result<Activations, Self::Error> {
      if class_id != 1 {
        return Err(format!("unexpected class {class_id}"));
      }
      let (_, h, w, _) = batch.dim();
      let features = Array3::from_shape_fn((h, w, 2), |(_, x, k)| {
        if k == 0 && x < w / 2 { 1.0 } else { 0.0 }
      });
      let gradients = Array3::from_shape_fn((h, w, 2), |(_, _, k)| if k == 0 { 1.0 } else { -1.0 });
      Ok(Activations {
        features,
        gradients,
      })
    }
  }

  #[test]
  fn closures_are_grad_cams() {
    let cam = |image: &Image| -> Heatmap { Array3::zeros(image.dim()) };
    let image = Array3::<u8>::zeros((5, 7, 3));
    assert_eq!(cam.grad_cam(&image).unwrap().dim(), (5, 7, 3));
  }

  #[test]
  fn activation_map_is_normalized() {
    let act = Activations {
      features: Array3::from_shape_fn((2, 2, 1), |(y, x, _)| (y * 2 + x) as f32),
      gradients: Array3::ones((2, 2, 1)),
    };
    let cam = class_activation_map(&act).unwrap();
    assert_eq!(cam[[1, 1]], 1.0);
    assert_eq!(cam[[0, 0]], 0.0);
    assert!((cam[[0, 1]] - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn negative_evidence_is_clipped() {
    let act = Activations {
      features: Array3::ones((3, 3, 1)),
      gradients: Array3::from_elem((3, 3, 1), -1.0),
    };
    let cam = class_activation_map(&act).unwrap();
    assert!(cam.iter().all(|&v| v == 0.0));
  }

  #[test]
  fn mismatched_activations_are_rejected() {
    let act = Activations {
      features: Array3::ones((3, 3, 1)),
      gradients: Array3::ones((3, 3, 2)),
    };
    assert!(class_activation_map(&act).is_none());
  }

  #[test]
  fn jet_runs_from_blue_to_red() {
    let Rgb([r, _, b]) = jet(0);
    assert!(b > r);
    let Rgb([r, _, b]) = jet(255);
    assert!(r > b);
  }

  #[test]
  fn model_grad_cam_highlights_active_region() {
    let image = Array3::<u8>::zeros((8, 16, 3));
    let heatmap = ModelGradCam::new(LeftSideModel).grad_cam(&image).unwrap();
    assert_eq!(heatmap.dim(), (8, 16, 3));
    // 左侧偏红，右侧偏蓝
    assert!(heatmap[[4, 1, 0]] > heatmap[[4, 1, 2]]);
    assert!(heatmap[[4, 14, 2]] > heatmap[[4, 14, 0]]);
  }

  #[test]
  fn gray_images_keep_one_channel() {
    let image = Array3::<u8>::zeros((6, 6, 1));
    let heatmap = ModelGradCam::new(LeftSideModel).grad_cam(&image).unwrap();
    assert_eq!(heatmap.dim(), (6, 6, 1));
  }

  #[test]
  fn unsupported_channels_are_reported() {
    let image = Array3::<u8>::zeros((4, 4, 4));
    let grad_cam = ModelGradCam::new(LeftSideModel).with_normalize(Normalize::default());
    assert!(matches!(
      grad_cam.grad_cam_for_class(&image, 1),
      Err(GradCamError::Frame(FrameError::UnsupportedChannels(4)))
    ));
  }

  #[test]
  fn non_finite_transparency_falls_back_to_default() {
    let image = Array3::from_elem((8, 16, 3), 40u8);
    let expected = ModelGradCam::new(LeftSideModel).grad_cam(&image).unwrap();
    for t in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
      let grad_cam = ModelGradCam::new(LeftSideModel).with_transparency(t);
      assert_eq!(grad_cam.transparency, DEFAULT_TRANSPARENCY);
      assert_eq!(grad_cam.grad_cam(&image).unwrap(), expected);
    }
    assert_eq!(
      ModelGradCam::new(LeftSideModel)
        .with_transparency(3.0)
        .transparency,
      1.0
    );
  }

  #[test]
  fn matching_normalize_explains_reported_class() {
    use crate::detector::Detector;

    let image = Array3::<u8>::zeros((8, 16, 3));
    let grad_cam = ModelGradCam::new(LeftSideModel).with_normalize(Normalize::imagenet());
    let detector = Detector::new(LeftSideModel, grad_cam).with_normalize(Normalize::imagenet());
    let prediction = detector.predict(&image).unwrap();
    assert_eq!(prediction.label, crate::model::PneumoniaLabel::Normal);
    assert_eq!(prediction.heatmap.dim(), (8, 16, 3));
  }

  #[test]
  fn zero_transparency_keeps_original() {
    let image = Array3::from_elem((4, 4, 3), 77u8);
    let cam = Array2::ones((2, 2));
    let heatmap = render_heatmap(&image, &cam, 0.0).unwrap();
    assert_eq!(heatmap, image);
  }

  #[test]
  fn model_errors_are_propagated() {
    let image = Array3::<u8>::zeros((4, 4, 3));
    let batch: Array4<f32> = crate::preprocess(&image);
    assert!(LeftSideModel.activations(&batch, 0).is_err());
    assert!(matches!(
      ModelGradCam::new(LeftSideModel).grad_cam_for_class(&image, 0),
      Err(GradCamError::Model(_))
    ));
  }
}
