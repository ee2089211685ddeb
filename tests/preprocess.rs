mod common;

use feiyan::{Normalize, preprocess};
use ndarray::Array3;

#[test]
fn preprocess_returns_batch() {
  let batch = preprocess(&common::dummy_img_array());

  assert_eq!(batch.ndim(), 4);
  assert_eq!(batch.shape()[0], 1);
  assert_eq!(batch.shape(), &[1, 250, 250, 3]);
}

#[test]
fn preprocess_matches_batch_fixture_shape() {
  let batch = preprocess(&common::dummy_img_array());
  assert_eq!(batch.shape(), common::dummy_batch().shape());
}

#[test]
fn preprocess_keeps_arbitrary_shapes() {
  for (h, w, c) in [(1, 1, 1), (17, 9, 3), (512, 512, 1)] {
    let image = Array3::<u8>::from_elem((h, w, c), 128);
    let batch = preprocess(&image);
    assert_eq!(batch.shape(), &[1, h, w, c]);
    assert!(batch.iter().all(|&v| (v - 128.0 / 255.0).abs() < 1e-6));
  }
}

#[test]
fn imagenet_normalization_centers_mean_pixel() {
  let image = Array3::from_shape_fn((2, 2, 3), |(_, _, c)| {
    [0.485f32, 0.456, 0.406][c] * 255.0
  });
  let batch = Normalize::imagenet().apply(&image).unwrap();
  assert!(batch.iter().all(|v| v.abs() < 1e-4));
}
