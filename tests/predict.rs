mod common;

use std::convert::Infallible;

use feiyan::{
  Detector, predict,
  frame::{Batch, Heatmap, Image},
  grad_cam::ModelGradCam,
  model::{Classifier, PneumoniaLabel},
};
use ndarray::{Array2, Array3, array};

struct DummyModel;

impl Classifier for DummyModel {
  type Error = Infallible;

  fn predict(&self, _batch: &Batch) -> Result<Array2<f32>, Self::Error> {
    // 3 类
    Ok(array![[0.1, 0.8, 0.1]])
  }
}

#[test]
fn predict_returns_expected_types() {
  let grad_cam = |_: &Image| -> Heatmap { Array3::zeros((250, 250, 3)) };

  let (label, proba, heatmap): (String, f32, Heatmap) =
    predict(&common::dummy_img_array(), &DummyModel, &grad_cam).unwrap();

  assert_eq!(label, "normal");
  assert!((proba - 0.8).abs() < f32::EPSILON);
  assert_eq!(heatmap.shape(), &[250, 250, 3]);
}

#[test]
fn detector_holds_collaborators() {
  let detector = Detector::new(DummyModel, |image: &Image| -> Heatmap {
    Array3::from_elem(image.dim(), 9)
  });
  let prediction = detector.predict(&common::dummy_img_array()).unwrap();
  assert_eq!(prediction.label, PneumoniaLabel::Normal);
  assert!(prediction.heatmap.iter().all(|&v| v == 9));
}

#[cfg(feature = "model_linear_cam")]
#[test]
fn linear_cam_model_end_to_end() {
  use feiyan::model::LinearCamModel;

  // 红色通道偏向 viral
  let model = LinearCamModel::new(
    vec![vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0], vec![4.0, 0.0, 0.0]],
    vec![0.0, 0.0, 0.0],
  )
  .unwrap();
  let image = Array3::from_shape_fn((32, 32, 3), |(_, x, c)| {
    if c == 0 && x < 16 { 255u8 } else { 0 }
  });

  let grad_cam = ModelGradCam::new(&model);
  let (label, proba, heatmap) = predict(&image, &model, &grad_cam).unwrap();
  assert_eq!(label, "viral");
  assert!(proba > 0.5 && proba <= 1.0);
  assert_eq!(heatmap.dim(), (32, 32, 3));
}
