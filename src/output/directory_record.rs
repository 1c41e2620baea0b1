// 该文件是 Kanwu （看物） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
use std::sync::{
  Arc,
  atomic::{AtomicU16, Ordering},
};

use chrono::{DateTime, Datelike, Local};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{
    Render, Scene,
    draw::Draw,
    export_json::{ExportDocument, ExportJsonError},
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("路径编码无效: {0}")]
  PathEncoding(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("导出错误: {0}")]
  ExportError(#[from] ExportJsonError),
}

/// 按日期分目录保存每次分析的画布和标签
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Arc<Draw>,
  counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let directory = urlencoding::decode(uri.path())
      .map_err(|e| DirectoryRecordOutputError::PathEncoding(e.to_string()))?;
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(directory.as_ref()),
      draw: Arc::new(Draw::default()),
      counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn with_draw(self, draw: Arc<Draw>) -> Self {
    DirectoryRecordOutput { draw, ..self }
  }

  fn record_id(&self) -> u16 {
    self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  /// `<dir>/YYYY/MM/DD/HH-MM-SS-NNNN.png`
  fn record_path(&self, now: &DateTime<Local>) -> Result<PathBuf, std::io::Error> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.record_id()
    )))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_scene(&self, scene: &Scene) -> Result<(), Self::Error> {
    if !self.always && scene.detections.is_empty() {
      debug!("没有检测结果，跳过记录");
      return Ok(());
    }

    let path = self.record_path(&scene.timestamp)?;
    self.draw.draw_scene(scene).save(&path)?;
    ExportDocument::from_scene(scene, false).write_to(&path.with_extension("json"))?;
    info!("记录到 {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    detection::{LabelInfo, LabelStyle, aggregate},
    input::LoadedImage,
    projector::ContainerSize,
  };

  fn output(query: &str, dir: &std::path::Path) -> DirectoryRecordOutput {
    let mut url = url::Url::parse(&format!("folder:///{query}")).unwrap();
    url.set_path(&dir.to_string_lossy());
    DirectoryRecordOutput::from_url(&url).unwrap()
  }

  fn files(dir: &std::path::Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
      for entry in std::fs::read_dir(current).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          found.push(path);
        }
      }
    }
    found.sort();
    found
  }

  #[test]
  fn records_canvas_and_labels_in_dated_folder() {
    let dir = tempfile::tempdir().unwrap();
    let output = output("", dir.path());
    let image = LoadedImage::from_rgb(image::RgbImage::new(8, 8));
    let detections = aggregate(
      [None],
      [LabelInfo::untranslated("thing")],
      LabelStyle::default(),
      image.shared_size(),
    );
    let scene = Scene::new(&image, &detections, ContainerSize::new(0, 0));
    output.render_scene(&scene).unwrap();

    let found = files(dir.path());
    assert_eq!(found.len(), 2);
    assert!(found[0].ends_with(format!(
      "{}/{:02}/{:02}/{}-0001.json",
      scene.timestamp.year(),
      scene.timestamp.month(),
      scene.timestamp.day(),
      scene.timestamp.format("%H-%M-%S")
    )));
    assert_eq!(found[1].extension().unwrap(), "png");
  }

  #[test]
  fn empty_results_are_skipped_unless_always() {
    let image = LoadedImage::from_rgb(image::RgbImage::new(8, 8));
    let scene = Scene::new(&image, &[], ContainerSize::new(0, 0));

    let skipped = tempfile::tempdir().unwrap();
    output("", skipped.path()).render_scene(&scene).unwrap();
    assert!(files(skipped.path()).is_empty());

    let kept = tempfile::tempdir().unwrap();
    output("?always", kept.path()).render_scene(&scene).unwrap();
    assert_eq!(files(kept.path()).len(), 2);
  }
}
