// 该文件是 Kanwu （看物） 项目的一部分。
// src/output/export_json.rs - 导出检测结果
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

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Render, Scene},
  projector::{Anchor, ImageSize, project},
};

#[derive(Error, Debug)]
pub enum ExportJsonError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  Serialize(#[from] serde_json::Error),
  #[error("路径编码无效: {0}")]
  PathEncoding(String),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

#[derive(Debug, Serialize)]
pub struct ExportLabel {
  pub id: String,
  pub english: String,
  pub chinese: String,
  pub phonetic: String,
  pub box_2d: Option<[f64; 4]>,
  /// 标签在画布中的锚点，无法投影时为 `null`
  pub position: Option<Anchor>,
}

/// 导出文件的内容
#[derive(Debug, Serialize)]
pub struct ExportDocument {
  pub timestamp: String,
  pub image: ImageSize,
  pub labels: Vec<ExportLabel>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_data: Option<String>,
}

impl ExportDocument {
  pub fn from_scene(scene: &Scene, include_image: bool) -> Self {
    let labels = scene
      .detections
      .iter()
      .map(|d| ExportLabel {
        id: d.id.clone(),
        english: d.label.english.clone(),
        chinese: d.label.chinese.clone(),
        phonetic: d.label.phonetic.clone(),
        box_2d: d.box_2d.map(|b| b.to_array()),
        position: project(d.box_2d.as_ref(), &d.image_size, &scene.container)
          .ok()
          .map(|p| p.anchor),
      })
      .collect();

    ExportDocument {
      timestamp: scene.timestamp.to_rfc3339(),
      image: scene.image.size(),
      labels,
      image_data: include_image.then(|| scene.image.upload().to_data_url()),
    }
  }

  pub fn write_to(&self, path: &Path) -> Result<(), ExportJsonError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
    Ok(())
  }
}

/// `json://<path>[?image]`
pub struct ExportJsonOutput {
  path: PathBuf,
  include_image: bool,
}

impl FromUrlWithScheme for ExportJsonOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for ExportJsonOutput {
  type Error = ExportJsonError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(ExportJsonError::SchemeMismatch);
    }
    let path =
      urlencoding::decode(uri.path()).map_err(|e| ExportJsonError::PathEncoding(e.to_string()))?;
    let include_image = uri.query_pairs().any(|(k, _)| k == "image");

    Ok(ExportJsonOutput {
      path: PathBuf::from(path.as_ref()),
      include_image,
    })
  }
}

impl Render for ExportJsonOutput {
  type Error = ExportJsonError;

  fn render_scene(&self, scene: &Scene) -> Result<(), Self::Error> {
    let document = ExportDocument::from_scene(scene, self.include_image);
    document.write_to(&self.path)?;
    info!(
      "导出 {} 个标签到 {}",
      document.labels.len(),
      self.path.display()
    );
    Ok(())
  }
}
