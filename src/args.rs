// 该文件是 Kanwu （看物） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::Parser;
use url::Url;

use crate::{
  detection::{Color, LabelStyle},
  projector::ContainerSize,
  prompt::{AnalyzeOptions, PromptSettings, find_template},
};

/// 标签样式与画布
#[derive(clap::Args, Debug, Clone)]
pub struct RenderArgs {
  /// 画布尺寸，如 1280x720；默认与原图一致
  #[arg(long, value_name = "WxH")]
  pub canvas: Option<ContainerSize>,
  /// TrueType 字体文件；不指定时使用内置点阵字体
  #[arg(long, value_name = "FONT", env = "KANWU_FONT")]
  pub font: Option<PathBuf>,
  /// 边框颜色
  #[arg(long, value_name = "#RRGGBB[AA]")]
  pub border_color: Option<Color>,
  /// 文字颜色
  #[arg(long, value_name = "#RRGGBB[AA]")]
  pub text_color: Option<Color>,
  /// 底色
  #[arg(long, value_name = "#RRGGBB[AA]")]
  pub shading_color: Option<Color>,
}

impl RenderArgs {
  pub fn style(&self) -> LabelStyle {
    let default = LabelStyle::default();
    LabelStyle {
      border_color: self.border_color.unwrap_or(default.border_color),
      text_color: self.text_color.unwrap_or(default.text_color),
      shading_color: self.shading_color.unwrap_or(default.shading_color),
    }
  }

  pub fn container(&self) -> ContainerSize {
    self.canvas.unwrap_or(ContainerSize::new(0, 0))
  }
}

/// Kanwu 看图识物
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// AI 服务，如 openai://api.openai.com/v1?model=gpt-4o 或 gemini://
  #[arg(long, value_name = "PROVIDER", env = "KANWU_PROVIDER")]
  pub provider: Url,
  /// 输入图像，如 image:///path/to/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，可重复：image://、json://、folder://
  #[arg(long, value_name = "OUTPUT", required = true)]
  pub output: Vec<Url>,
  /// 附加在检测提示词后的用户提示词
  #[arg(long, value_name = "PROMPT")]
  pub prompt: Option<String>,
  /// 内置提示词模板：basic、detailed、educational
  #[arg(long, value_name = "TEMPLATE", conflicts_with = "prompt")]
  pub template: Option<String>,
  /// 对每个物体的额外标注要求
  #[arg(long, value_name = "PROMPT")]
  pub label_prompt: Option<String>,
  /// 不要求模型返回边界框
  #[arg(long)]
  pub no_bounding_box: bool,
  #[command(flatten)]
  pub render: RenderArgs,
}

impl Args {
  /// 合并模板、提示词与服务配置中的检测参数
  pub fn prompt_settings(&self, options: AnalyzeOptions) -> anyhow::Result<PromptSettings> {
    let custom_prompt = match (&self.template, &self.prompt) {
      (Some(id), _) => find_template(id)
        .map(|t| t.template.to_string())
        .ok_or_else(|| anyhow::anyhow!("未知的提示词模板: {}", id))?,
      (None, Some(prompt)) => prompt.clone(),
      (None, None) => String::new(),
    };
    Ok(PromptSettings {
      custom_prompt,
      options: AnalyzeOptions {
        include_bounding_box: !self.no_bounding_box,
        label_prompt: self.label_prompt.clone(),
        ..options
      },
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_full_command_line() {
    let args = Args::try_parse_from([
      "kanwu",
      "--provider",
      "gemini://?model=gemini-1.5-flash",
      "--input",
      "image:///tmp/cat.jpg",
      "--output",
      "image:///tmp/out.png",
      "--output",
      "json:///tmp/out.json?image",
      "--template",
      "educational",
      "--canvas",
      "800x600",
      "--border-color",
      "#00FF00",
    ])
    .unwrap();

    assert_eq!(args.output.len(), 2);
    assert_eq!(args.render.container(), ContainerSize::new(800, 600));
    assert_eq!(args.render.style().border_color, Color::rgb(0, 0xFF, 0));
    assert_eq!(args.render.style().text_color, LabelStyle::default().text_color);

    let settings = args.prompt_settings(AnalyzeOptions::default()).unwrap();
    assert!(settings.custom_prompt.starts_with("Identify educational elements"));
    assert!(settings.options.include_bounding_box);
  }

  #[test]
  fn unknown_template_is_an_error() {
    let args = Args::try_parse_from([
      "kanwu",
      "--provider",
      "openai://",
      "--input",
      "image:///a.png",
      "--output",
      "image:///b.png",
      "--template",
      "nonsense",
    ])
    .unwrap();
    assert!(args.prompt_settings(AnalyzeOptions::default()).is_err());
  }

  #[test]
  fn bad_color_is_rejected_by_parser() {
    let result = Args::try_parse_from([
      "kanwu",
      "--provider",
      "openai://",
      "--input",
      "image:///a.png",
      "--output",
      "image:///b.png",
      "--text-color",
      "orange",
    ]);
    assert!(result.is_err());
  }
}
