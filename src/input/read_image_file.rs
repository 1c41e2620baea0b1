// 该文件是 Kanwu （看物） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageFormat;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{ImageUpload, LoadedImage},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Invalid path encoding: {0}")]
  PathEncoding(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// `image://<path>` 指向的单张图片
pub struct ImageFileInput {
  image: LoadedImage,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = urlencoding::decode(url.path())
      .map_err(|e| ImageFileInputError::PathEncoding(e.to_string()))?;
    let bytes = std::fs::read(path.as_ref())?;
    Ok(ImageFileInput {
      image: Self::decode(bytes, path.as_ref())?,
    })
  }
}

impl ImageFileInput {
  /// 按内容识别格式，识别不了时退回扩展名
  pub fn decode(bytes: Vec<u8>, path: &str) -> Result<LoadedImage, ImageFileInputError> {
    let format = match image::guess_format(&bytes) {
      Ok(format) => format,
      Err(_) => ImageFormat::from_path(path)?,
    };
    let pixels = image::load_from_memory_with_format(&bytes, format)?.to_rgb8();
    debug!(
      "读取图像 {}: {:?}, {}x{}, {} 字节",
      path,
      format,
      pixels.width(),
      pixels.height(),
      bytes.len()
    );
    Ok(LoadedImage::new(
      ImageUpload::new(bytes, format.to_mime_type()),
      pixels,
    ))
  }

  pub fn into_loaded(self) -> LoadedImage {
    self.image
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::projector::ImageSize;

  #[test]
  fn reads_and_decodes_from_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("small pic.png");
    image::RgbImage::new(5, 2).save(&path).unwrap();

    let mut url = Url::parse("image:///").unwrap();
    url.set_path(&path.to_string_lossy());
    let loaded = ImageFileInput::from_url(&url).unwrap().into_loaded();

    assert_eq!(loaded.size(), ImageSize::new(5, 2));
    assert_eq!(loaded.upload().mime, "image/png");
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("json:///tmp/out.json").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
