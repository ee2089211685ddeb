use feiyan::frame::{Batch, Image};
use ndarray::{Array3, Axis};

/// 假胸片 (H, W, C)
pub fn dummy_img_array() -> Image {
  Array3::zeros((250, 250, 3))
}

/// 假批次 (1, H, W, C)
#[allow(dead_code)]
pub fn dummy_batch() -> Batch {
  dummy_img_array().mapv(f32::from).insert_axis(Axis(0))
}
