// 该文件是 Kanwu （看物） 项目的一部分。
// src/output/save_image_file.rs - 保存渲染结果
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

use std::{path::Path, sync::Arc};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Render, Scene, draw::Draw},
};

pub struct SaveImageFileOutput {
  path: String,
  draw: Arc<Draw>,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("路径编码无效: {0}")]
  PathEncoding(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let path = urlencoding::decode(uri.path())
      .map_err(|e| SaveImageFileError::PathEncoding(e.to_string()))?;
    Ok(SaveImageFileOutput {
      path: path.into_owned(),
      draw: Arc::new(Draw::default()),
    })
  }
}

impl SaveImageFileOutput {
  pub fn with_draw(self, draw: Arc<Draw>) -> Self {
    SaveImageFileOutput { draw, ..self }
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path);
    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_scene(&self, scene: &Scene) -> Result<(), Self::Error> {
    let image = self.draw.draw_scene(scene);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{input::LoadedImage, projector::ContainerSize};

  #[test]
  fn saves_canvas_at_container_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/out.png");
    let mut url = Url::parse("image:///").unwrap();
    url.set_path(&path.to_string_lossy());

    let output = SaveImageFileOutput::from_url(&url).unwrap();
    let image = LoadedImage::from_rgb(image::RgbImage::new(20, 10));
    output
      .render_scene(&Scene::new(&image, &[], ContainerSize::new(64, 48)))
      .unwrap();

    let saved = image::open(&path).unwrap();
    assert_eq!((saved.width(), saved.height()), (64, 48));
  }
}
