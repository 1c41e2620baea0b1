// 该文件是 Kanwu （看物） 项目的一部分。
// src/input.rs - 图像输入
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

use std::sync::Arc;

use base64::Engine as _;
use image::RgbImage;
use thiserror::Error;

use crate::{FromUrl, projector::ImageSize};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 上传的图像：原始字节与声明的 MIME 类型
#[derive(Debug, Clone)]
pub struct ImageUpload {
  pub bytes: Arc<[u8]>,
  pub mime: String,
}

impl ImageUpload {
  pub fn new(bytes: impl Into<Arc<[u8]>>, mime: impl Into<String>) -> Self {
    ImageUpload {
      bytes: bytes.into(),
      mime: mime.into(),
    }
  }

  pub fn to_base64(&self) -> String {
    base64::engine::general_purpose::STANDARD.encode(&self.bytes)
  }

  /// `data:<mime>;base64,<payload>`
  pub fn to_data_url(&self) -> String {
    format!("data:{};base64,{}", self.mime, self.to_base64())
  }
}

/// 已解码的图像，尺寸在解码时确定且不再改变
#[derive(Debug, Clone)]
pub struct LoadedImage {
  upload: ImageUpload,
  pixels: RgbImage,
  size: Arc<ImageSize>,
}

impl LoadedImage {
  pub fn new(upload: ImageUpload, pixels: RgbImage) -> Self {
    let (width, height) = pixels.dimensions();
    LoadedImage {
      upload,
      pixels,
      size: Arc::new(ImageSize::new(width, height)),
    }
  }

  /// 从内存中的像素构造，编码为 PNG 作为上传内容
  pub fn from_rgb(pixels: RgbImage) -> Self {
    let mut bytes = Vec::new();
    let encoded = pixels
      .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
      .is_ok();
    if !encoded {
      bytes.clear();
    }
    LoadedImage::new(ImageUpload::new(bytes, "image/png"), pixels)
  }

  pub fn upload(&self) -> &ImageUpload {
    &self.upload
  }

  pub fn pixels(&self) -> &RgbImage {
    &self.pixels
  }

  pub fn size(&self) -> ImageSize {
    *self.size
  }

  pub fn shared_size(&self) -> Arc<ImageSize> {
    Arc::clone(&self.size)
  }
}

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
    }
    let _ = url;
    Err(InputError::SchemeMismatch)
  }
}

impl InputWrapper {
  pub fn into_loaded(self) -> LoadedImage {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.into_loaded(),
    }
  }
}
