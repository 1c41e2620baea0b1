// 该文件是 Kanwu （看物） 项目的一部分。
// src/bin/replay.rs - 重放模型响应
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

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use kanwu::{
  FromUrl,
  args::RenderArgs,
  canonical::AxisOrder,
  input::InputWrapper,
  output::{OutputList, OutputWrapper, draw::Draw},
  task::{ReplayTask, Task},
};

/// 把保存下来的模型响应画到图像上
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型原始响应文本
  #[arg(long, value_name = "FILE")]
  pub response: PathBuf,
  /// 输入图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，可重复
  #[arg(long, value_name = "OUTPUT", required = true)]
  pub output: Vec<Url>,
  /// 序列形式的框坐标顺序：xyxy 或 yxyx
  #[arg(long, default_value = "xyxy", value_name = "ORDER")]
  pub order: AxisOrder,
  #[command(flatten)]
  pub render: RenderArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("响应文件: {}", args.response.display());
  info!("输入来源: {}", args.input);

  let response = std::fs::read_to_string(&args.response)
    .with_context(|| format!("无法读取响应文件 {}", args.response.display()))?;
  let image = InputWrapper::from_url(&args.input)?.into_loaded();
  let draw = Arc::new(Draw::from_font_path(args.render.font.as_deref())?);
  let outputs = args
    .output
    .iter()
    .map(|url| Ok(OutputWrapper::from_url(url)?.with_draw(Arc::clone(&draw))))
    .collect::<Result<Vec<_>>>()?;

  ReplayTask::new(response, args.order, args.render.style())
    .with_container(args.render.container())
    .run_task(image, OutputList::from(outputs))
    .await
}
