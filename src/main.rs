// 该文件是 Kanwu （看物） 项目的一部分。
// src/main.rs - 项目主程序
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use kanwu::{
  FromUrl,
  args::Args,
  input::InputWrapper,
  output::{OutputList, OutputWrapper, draw::Draw},
  provider::{HttpTransport, ProviderRegistry, ProviderSettings},
  task::{AnalysisTask, Task},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("AI 服务: {}", args.provider);
  info!("输入来源: {}", args.input);
  for output in &args.output {
    info!("输出路径: {}", output);
  }

  let settings = ProviderSettings::from_url(&args.provider)?;
  let prompt = args.prompt_settings(settings.analyze_options())?;
  let mut registry = ProviderRegistry::new(HttpTransport::new()?);
  let provider = registry.get(&settings)?;

  let image = InputWrapper::from_url(&args.input)?.into_loaded();
  let draw = Arc::new(Draw::from_font_path(args.render.font.as_deref())?);
  let outputs = args
    .output
    .iter()
    .map(|url| Ok(OutputWrapper::from_url(url)?.with_draw(Arc::clone(&draw))))
    .collect::<Result<Vec<_>>>()?;

  AnalysisTask::new(provider.as_ref(), prompt, args.render.style())
    .with_container(args.render.container())
    .run_task(image, OutputList::from(outputs))
    .await
}
