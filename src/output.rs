// 该文件是 Kanwu （看物） 项目的一部分。
// src/output.rs - 输出定义
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

use chrono::{DateTime, Local};
use thiserror::Error;
use url::Url;

#[cfg(any(
  feature = "save_image_file",
  feature = "export_json",
  feature = "directory_record"
))]
use crate::FromUrlWithScheme;
use crate::{FromUrl, detection::Detection, input::LoadedImage, projector::ContainerSize};

/// 一次渲染所需的全部内容
pub struct Scene<'a> {
  pub image: &'a LoadedImage,
  pub detections: &'a [Detection],
  /// 画布尺寸；为空时按原图尺寸
  pub container: ContainerSize,
  pub timestamp: DateTime<Local>,
}

impl<'a> Scene<'a> {
  pub fn new(image: &'a LoadedImage, detections: &'a [Detection], container: ContainerSize) -> Self {
    let container = if container.is_empty() {
      ContainerSize::from(image.size())
    } else {
      container
    };
    Scene {
      image,
      detections,
      container,
      timestamp: Local::now(),
    }
  }
}

pub trait Render: Sized {
  type Error;
  fn render_scene(&self, scene: &Scene) -> Result<(), Self::Error>;
}

#[cfg(feature = "draw")]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "export_json")]
mod export_json;
#[cfg(feature = "export_json")]
pub use self::export_json::{ExportDocument, ExportJsonError, ExportJsonOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "export_json")]
  #[error("导出 JSON 错误: {0}")]
  ExportJsonError(#[from] ExportJsonError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "export_json")]
  ExportJsonOutput(ExportJsonOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "export_json")]
      ExportJsonOutput::SCHEME => {
        let output = ExportJsonOutput::from_url(url)?;
        Ok(OutputWrapper::ExportJsonOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl OutputWrapper {
  /// 替换绘制器（字体、字号）；不绘图的输出忽略
  #[cfg(feature = "draw")]
  pub fn with_draw(self, draw: std::sync::Arc<draw::Draw>) -> Self {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => {
        OutputWrapper::SaveImageFileOutput(output.with_draw(draw))
      }
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => {
        OutputWrapper::DirectoryRecordOutput(output.with_draw(draw))
      }
      #[allow(unreachable_patterns)]
      other => other,
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_scene(&self, scene: &Scene) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => {
        output.render_scene(scene).map_err(OutputError::from)
      }
      #[cfg(feature = "export_json")]
      OutputWrapper::ExportJsonOutput(output) => {
        output.render_scene(scene).map_err(OutputError::from)
      }
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => {
        output.render_scene(scene).map_err(OutputError::from)
      }
      #[allow(unreachable_patterns)]
      _ => {
        let _ = scene;
        Ok(())
      }
    }
  }
}

/// 多个输出依次渲染
pub struct OutputList(pub Vec<OutputWrapper>);

impl Render for OutputList {
  type Error = OutputError;

  fn render_scene(&self, scene: &Scene) -> Result<(), Self::Error> {
    for output in &self.0 {
      output.render_scene(scene)?;
    }
    Ok(())
  }
}

impl From<Vec<OutputWrapper>> for OutputList {
  fn from(outputs: Vec<OutputWrapper>) -> Self {
    OutputList(outputs)
  }
}
