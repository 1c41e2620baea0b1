// 该文件是 Kanwu （看物） 项目的一部分。
// src/prompt.rs - 提示词与模板
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

use crate::canonical::AxisOrder;

pub const DEFAULT_DETECT_LIMIT: u32 = 20;
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

/// 单次分析的参数
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeOptions {
  pub detect_limit: u32,
  pub temperature: f32,
  pub include_bounding_box: bool,
  /// 对每个物体的额外标注要求
  pub label_prompt: Option<String>,
}

impl Default for AnalyzeOptions {
  fn default() -> Self {
    AnalyzeOptions {
      detect_limit: DEFAULT_DETECT_LIMIT,
      temperature: DEFAULT_TEMPERATURE,
      include_bounding_box: true,
      label_prompt: None,
    }
  }
}

/// 用户的提示词设置
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptSettings {
  pub custom_prompt: String,
  pub options: AnalyzeOptions,
}

/// 内置模板
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
  pub id: &'static str,
  pub name: &'static str,
  pub template: &'static str,
  pub description: &'static str,
}

pub const TEMPLATES: [PromptTemplate; 3] = [
  PromptTemplate {
    id: "basic",
    name: "基础识别",
    template: "Identify objects in this image and provide their English names, Chinese translations, and phonetic symbols.",
    description: "识别图片中的物体并提供英文名称、中文翻译和音标",
  },
  PromptTemplate {
    id: "detailed",
    name: "详细描述",
    template: "Analyze this image in detail. For each visible object:\n1. English name\n2. Chinese translation\n3. IPA phonetic transcription\n4. Brief usage example",
    description: "详细分析图片中的物体，包括用法示例",
  },
  PromptTemplate {
    id: "educational",
    name: "教育场景",
    template: "Identify educational elements in this image. For each item:\n1. English term\n2. Chinese equivalent\n3. Pronunciation guide\n4. Educational context",
    description: "识别教育相关的元素并提供教学上下文",
  },
];

pub fn find_template(id: &str) -> Option<&'static PromptTemplate> {
  TEMPLATES.iter().find(|t| t.id == id)
}

fn coordinate_format(order: AxisOrder) -> &'static str {
  match order {
    AxisOrder::XyXy => "[x1, y1, x2, y2]",
    AxisOrder::YxYx => "[ymin, xmin, ymax, xmax]",
  }
}

/// 检测提示词
pub fn detection_prompt(user_prompt: &str, options: &AnalyzeOptions, order: AxisOrder) -> String {
  let mut prompt = format!(
    "Detect items, with no more than {} items. Output a json list where each entry contains the",
    options.detect_limit
  );
  if options.include_bounding_box {
    prompt.push_str(&format!(
      " 2D bounding box in \"box_2d\" as {} with coordinates normalized to 0-1000 and",
      coordinate_format(order)
    ));
  }
  prompt.push_str(" label in \"label\".");

  if let Some(label_prompt) = options.label_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
    prompt.push_str("\nFor each item: ");
    prompt.push_str(label_prompt.trim());
  }
  if !user_prompt.trim().is_empty() {
    prompt.push('\n');
    prompt.push_str(user_prompt.trim());
  }
  prompt
}

/// 标签翻译提示词
pub fn label_prompt(text: &str) -> String {
  format!(
    r#"Analyze the following item: "{text}"

Instructions:
1. Provide the standard English name
2. Provide the Chinese translation
3. Provide the IPA phonetic transcription

Requirements:
- Keep the English name simple and commonly used
- Use standard Mandarin Chinese for translation
- Use standard IPA symbols for phonetic transcription
- Return ONLY the JSON response in the following format:

{{
  "english": "exact English name",
  "chinese": "准确的中文翻译",
  "phonetic": "IPA音标"
}}"#
  )
}
