// 该文件是 Feiyan （肺炎检测） 项目的一部分。
// src/output/record.rs - 分类结果记录
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Serialize;

use crate::{
  detector::Prediction,
  frame::{FrameError, ToRgbImage},
  model::WithLabel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
  #[default]
  Json,
  Text,
}

impl RecordFormat {
  pub fn with(kind: &str) -> Self {
    match kind {
      "text" | "txt" => RecordFormat::Text,
      _ => RecordFormat::Json,
    }
  }

  fn extension(&self) -> &'static str {
    match self {
      RecordFormat::Json => "json",
      RecordFormat::Text => "txt",
    }
  }
}

#[derive(Debug, Serialize)]
struct RecordEntry {
  label: String,
  label_id: u32,
  probability: f32,
}

/// 把分类结果写到图像旁边的记录文件
#[derive(Debug, Clone, Default)]
pub struct Record {
  pub format: RecordFormat,
}

impl Record {
  pub fn record(&self, prediction: &Prediction, path: &Path) -> Result<PathBuf, std::io::Error> {
    let entry = RecordEntry {
      label: prediction.label.to_label_str(),
      label_id: prediction.label.to_label_id(),
      probability: prediction.probability,
    };
    let content = match self.format {
      RecordFormat::Json => serde_json::to_string_pretty(&entry).map_err(std::io::Error::other)?,
      RecordFormat::Text => format!("{}, {:.4}", entry.label, entry.probability),
    };
    let path = path.with_extension(self.format.extension());
    std::fs::write(&path, content)?;
    Ok(path)
  }
}

/// 热力图转为可保存的 RGB 图像
pub fn heatmap_image(prediction: &Prediction) -> Result<RgbImage, FrameError> {
  prediction.heatmap.to_rgb_image()
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::Array3;

  use crate::model::PneumoniaLabel;

  fn prediction() -> Prediction {
    Prediction {
      label: PneumoniaLabel::Viral,
      probability: 0.625,
      heatmap: Array3::zeros((2, 2, 3)),
    }
  }

  #[test]
  fn json_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = Record::default()
      .record(&prediction(), &dir.path().join("a.png"))
      .unwrap();
    assert_eq!(path.extension().unwrap(), "json");
    let value: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(value["label"], "viral");
    assert_eq!(value["label_id"], 2);
    assert_eq!(value["probability"], 0.625);
  }

  #[test]
  fn text_record() {
    let dir = tempfile::tempdir().unwrap();
    let record = Record {
      format: RecordFormat::with("text"),
    };
    let path = record.record(&prediction(), &dir.path().join("a.png")).unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "viral, 0.6250");
  }
}
