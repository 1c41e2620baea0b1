// 该文件是 Kanwu （看物） 项目的一部分。
// src/detection.rs - 检测记录与聚合
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

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{canonical::CanonicalBox, projector::ImageSize};

/// 标签文本：英文、中文、音标
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
  pub english: String,
  pub chinese: String,
  pub phonetic: String,
}

impl LabelInfo {
  /// 翻译失败时的退化结果：原文同时作为英文和中文
  pub fn untranslated(text: &str) -> Self {
    LabelInfo {
      english: text.to_string(),
      chinese: text.to_string(),
      phonetic: String::new(),
    }
  }

  /// 空字段回落到原文
  pub fn or_source(self, text: &str) -> Self {
    let pick = |v: String| if v.is_empty() { text.to_string() } else { v };
    LabelInfo {
      english: pick(self.english),
      chinese: pick(self.chinese),
      phonetic: self.phonetic,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelField {
  English,
  Chinese,
  Phonetic,
}

impl std::str::FromStr for LabelField {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "english" => Ok(LabelField::English),
      "chinese" => Ok(LabelField::Chinese),
      "phonetic" => Ok(LabelField::Phonetic),
      other => Err(format!("未知的标签字段: {other}")),
    }
  }
}

/// RGBA 颜色，文本形式为 `#RRGGBB` 或 `#RRGGBBAA`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 4]);

impl Color {
  pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
    Color([r, g, b, 0xFF])
  }

  pub fn with_alpha(self, alpha: u8) -> Self {
    let [r, g, b, _] = self.0;
    Color([r, g, b, alpha])
  }

  pub fn alpha(&self) -> u8 {
    self.0[3]
  }
}

impl std::str::FromStr for Color {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
      return Err(format!("颜色格式应为 #RRGGBB 或 #RRGGBBAA: {s}"));
    }
    let channel = |i: usize| {
      u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("颜色 {s} 无效: {e}"))
    };
    let alpha = if hex.len() == 8 { channel(6)? } else { 0xFF };
    Ok(Color([channel(0)?, channel(2)?, channel(4)?, alpha]))
  }
}

impl std::fmt::Display for Color {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let [r, g, b, a] = self.0;
    if a == 0xFF {
      write!(f, "#{r:02X}{g:02X}{b:02X}")
    } else {
      write!(f, "#{r:02X}{g:02X}{b:02X}{a:02X}")
    }
  }
}

impl Serialize for Color {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelStyle {
  pub border_color: Color,
  pub text_color: Color,
  pub shading_color: Color,
}

impl Default for LabelStyle {
  fn default() -> Self {
    LabelStyle {
      border_color: Color::rgb(0xFF, 0x98, 0x00),
      text_color: Color::rgb(0x00, 0x00, 0x00),
      shading_color: Color([0xFF, 0xFF, 0xFF, 0x80]),
    }
  }
}

/// 一个检测对象：规范框 + 标签 + 样式
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub id: String,
  pub box_2d: Option<CanonicalBox>,
  pub label: LabelInfo,
  pub style: LabelStyle,
  /// 发起分析时的图像尺寸
  pub image_size: Arc<ImageSize>,
}

impl Detection {
  pub fn set_field(&mut self, field: LabelField, value: &str) {
    let slot = match field {
      LabelField::English => &mut self.label.english,
      LabelField::Chinese => &mut self.label.chinese,
      LabelField::Phonetic => &mut self.label.phonetic,
    };
    *slot = value.to_string();
  }
}

/// 按索引把框和翻译结果对齐，生成顺序编号的检测记录
///
/// 两边数量不一致时以较短的一边为准，并记录警告。
pub fn aggregate(
  boxes: impl IntoIterator<Item = Option<CanonicalBox>>,
  labels: impl IntoIterator<Item = LabelInfo>,
  style: LabelStyle,
  image_size: Arc<ImageSize>,
) -> Vec<Detection> {
  let boxes: Vec<_> = boxes.into_iter().collect();
  let labels: Vec<_> = labels.into_iter().collect();
  if boxes.len() != labels.len() {
    warn!("框数量 {} 与标签数量 {} 不一致", boxes.len(), labels.len());
  }

  let detections: Vec<Detection> = boxes
    .into_iter()
    .zip(labels)
    .enumerate()
    .map(|(index, (box_2d, label))| Detection {
      id: format!("label-{index}"),
      box_2d,
      label,
      style,
      image_size: Arc::clone(&image_size),
    })
    .collect();
  debug!("聚合得到 {} 个检测记录", detections.len());
  detections
}
