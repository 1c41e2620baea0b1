// 该文件是 Kanwu （看物） 项目的一部分。
// src/state.rs - 应用状态
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

use thiserror::Error;
use tracing::{info, warn};

use crate::{
  detection::{Detection, LabelField, LabelStyle},
  input::LoadedImage,
  projector::ImageSize,
  prompt::PromptSettings,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
  #[error("请先上传图片")]
  NoImage,
  #[error("已有分析任务正在进行")]
  AnalysisInFlight,
  #[error("分析结果已过期: 第 {ticket} 代, 当前第 {current} 代")]
  Stale { ticket: u64, current: u64 },
  #[error("第 {0} 代没有进行中的分析")]
  NotInFlight(u64),
  #[error("找不到标签: {0}")]
  UnknownLabel(String),
}

/// 一次分析请求的凭据，记录发起时的图像代数和尺寸
///
/// 只能使用一次，`commit` 或 `abort` 都会消耗它。
#[derive(Debug)]
pub struct AnalysisTicket {
  generation: u64,
  image_size: Arc<ImageSize>,
}

impl AnalysisTicket {
  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn image_size(&self) -> Arc<ImageSize> {
    Arc::clone(&self.image_size)
  }
}

/// 当前生效的检测集合，整体替换，不做原地修改
#[derive(Debug, Clone, Default)]
pub struct DetectionSet {
  generation: u64,
  items: Arc<[Detection]>,
}

impl DetectionSet {
  pub fn new(generation: u64, items: Vec<Detection>) -> Self {
    DetectionSet {
      generation,
      items: items.into(),
    }
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn items(&self) -> &[Detection] {
    &self.items
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// 单一所有者的应用状态
#[derive(Default)]
pub struct AppState {
  image: Option<LoadedImage>,
  detections: DetectionSet,
  style: LabelStyle,
  settings: PromptSettings,
  generation: u64,
  in_flight: Option<u64>,
}

impl AppState {
  pub fn new(style: LabelStyle, settings: PromptSettings) -> Self {
    AppState {
      style,
      settings,
      ..Default::default()
    }
  }

  /// 换图：清空检测结果，之前发起的分析全部作废
  pub fn load_image(&mut self, image: LoadedImage) {
    self.generation += 1;
    info!(
      "载入图像 {}x{} ({}), 第 {} 代",
      image.size().width,
      image.size().height,
      image.upload().mime,
      self.generation
    );
    self.image = Some(image);
    self.detections = DetectionSet::new(self.generation, Vec::new());
    self.in_flight = None;
  }

  pub fn begin_analysis(&mut self) -> Result<AnalysisTicket, StateError> {
    let image = self.image.as_ref().ok_or(StateError::NoImage)?;
    if self.in_flight == Some(self.generation) {
      return Err(StateError::AnalysisInFlight);
    }
    self.in_flight = Some(self.generation);
    Ok(AnalysisTicket {
      generation: self.generation,
      image_size: image.shared_size(),
    })
  }

  /// 用一次分析的完整结果整体替换当前集合
  pub fn commit(
    &mut self,
    ticket: AnalysisTicket,
    detections: Vec<Detection>,
  ) -> Result<&DetectionSet, StateError> {
    if ticket.generation != self.generation {
      warn!(
        "丢弃过期的分析结果: 第 {} 代, 当前第 {} 代",
        ticket.generation, self.generation
      );
      return Err(StateError::Stale {
        ticket: ticket.generation,
        current: self.generation,
      });
    }
    if self.in_flight != Some(ticket.generation) {
      warn!("第 {} 代的分析已结束，忽略重复提交", ticket.generation);
      return Err(StateError::NotInFlight(ticket.generation));
    }
    self.in_flight = None;
    self.detections = DetectionSet::new(self.generation, detections);
    info!("检测结果已更新: {} 项", self.detections.len());
    Ok(&self.detections)
  }

  pub fn abort(&mut self, ticket: AnalysisTicket) {
    if self.in_flight == Some(ticket.generation) {
      self.in_flight = None;
    }
  }

  pub fn edit_label(&mut self, id: &str, field: LabelField, value: &str) -> Result<(), StateError> {
    let mut items = self.detections.items().to_vec();
    let item = items
      .iter_mut()
      .find(|d| d.id == id)
      .ok_or_else(|| StateError::UnknownLabel(id.to_string()))?;
    item.set_field(field, value);
    self.detections = DetectionSet::new(self.generation, items);
    Ok(())
  }

  /// 新样式作用于之后的分析
  pub fn set_style(&mut self, style: LabelStyle) {
    self.style = style;
  }

  pub fn set_settings(&mut self, settings: PromptSettings) {
    self.settings = settings;
  }

  pub fn image(&self) -> Option<&LoadedImage> {
    self.image.as_ref()
  }

  pub fn detections(&self) -> &DetectionSet {
    &self.detections
  }

  pub fn style(&self) -> LabelStyle {
    self.style
  }

  pub fn settings(&self) -> &PromptSettings {
    &self.settings
  }

  pub fn is_analyzing(&self) -> bool {
    self.in_flight.is_some()
  }
}
