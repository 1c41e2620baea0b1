// 该文件是 Kanwu （看物） 项目的一部分。
// src/task.rs - 分析任务
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

use std::time::Instant;

use futures::future::join_all;
use tracing::{error, info};

use crate::{
  canonical::AxisOrder,
  detection::{Detection, LabelInfo, LabelStyle, aggregate},
  input::{ImageUpload, LoadedImage},
  output::{Render, Scene},
  projector::ContainerSize,
  prompt::{AnalyzeOptions, PromptSettings},
  provider::{ProviderError, VisionProvider, extract_items},
  response::parse_response,
  state::{AnalysisTicket, AppState},
};

#[allow(async_fn_in_trait)]
pub trait Task<I, O>: Sized {
  type Error;
  async fn run_task(self, input: I, output: O) -> Result<(), Self::Error>;
}

/// 已登记但尚未完成的分析，不持有状态的借用
pub struct PendingAnalysis {
  ticket: AnalysisTicket,
  upload: ImageUpload,
  prompt: String,
  options: AnalyzeOptions,
  style: LabelStyle,
}

impl PendingAnalysis {
  /// 登记一次分析；没有图像或已有分析进行中时失败
  pub fn begin(state: &mut AppState) -> Result<Self, crate::state::StateError> {
    let ticket = state.begin_analysis()?;
    let upload = state
      .image()
      .map(|image| image.upload().clone())
      .ok_or(crate::state::StateError::NoImage)?;
    let settings = state.settings();
    Ok(PendingAnalysis {
      ticket,
      upload,
      prompt: settings.custom_prompt.clone(),
      options: settings.options.clone(),
      style: state.style(),
    })
  }

  pub fn ticket(&self) -> &AnalysisTicket {
    &self.ticket
  }

  /// 检测后并发处理每个标签，按索引对齐
  pub async fn run<P: VisionProvider>(&self, provider: &P) -> Result<Vec<Detection>, ProviderError> {
    let now = Instant::now();
    let items = provider
      .analyze_image(&self.upload, &self.prompt, &self.options)
      .await?;
    info!("检测完成，耗时: {:.2?}", now.elapsed());

    let labels = join_all(items.iter().map(|item| provider.process_label(&item.label))).await;
    info!("标签处理完成，耗时: {:.2?}", now.elapsed());

    Ok(aggregate(
      items.into_iter().map(|item| item.box_2d),
      labels,
      self.style,
      self.ticket.image_size(),
    ))
  }

  /// 写回状态；失败时释放进行中的标记
  pub fn finish(
    self,
    state: &mut AppState,
    result: Result<Vec<Detection>, ProviderError>,
  ) -> anyhow::Result<usize> {
    match result {
      Ok(detections) => Ok(state.commit(self.ticket, detections)?.len()),
      Err(e) => {
        error!("分析失败: {}", e);
        state.abort(self.ticket);
        Err(e.into())
      }
    }
  }
}

fn render_state<O: Render>(state: &AppState, container: ContainerSize, output: &O) -> anyhow::Result<()>
where
  O::Error: std::error::Error + Send + Sync + 'static,
{
  let image = state
    .image()
    .ok_or_else(|| anyhow::anyhow!("没有可渲染的图像"))?;
  let now = Instant::now();
  output.render_scene(&Scene::new(image, state.detections().items(), container))?;
  info!("渲染完成，耗时: {:.2?}", now.elapsed());
  Ok(())
}

/// 上传一张图片、分析、渲染
pub struct AnalysisTask<'p, P> {
  provider: &'p P,
  settings: PromptSettings,
  style: LabelStyle,
  container: ContainerSize,
}

impl<'p, P: VisionProvider> AnalysisTask<'p, P> {
  pub fn new(provider: &'p P, settings: PromptSettings, style: LabelStyle) -> Self {
    AnalysisTask {
      provider,
      settings,
      style,
      container: ContainerSize::new(0, 0),
    }
  }

  pub fn with_container(mut self, container: ContainerSize) -> Self {
    self.container = container;
    self
  }
}

impl<P: VisionProvider, O: Render> Task<LoadedImage, O> for AnalysisTask<'_, P>
where
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  async fn run_task(self, input: LoadedImage, output: O) -> Result<(), Self::Error> {
    info!("开始任务, 使用 {} 服务...", self.provider.kind());
    let mut state = AppState::new(self.style, self.settings);
    state.load_image(input);

    let pending = PendingAnalysis::begin(&mut state)?;
    let result = pending.run(self.provider).await;
    let count = pending.finish(&mut state, result)?;
    info!("得到 {} 个检测结果", count);

    render_state(&state, self.container, &output)
  }
}

/// 重放保存下来的模型原始响应，不访问网络
pub struct ReplayTask {
  response: String,
  order: AxisOrder,
  style: LabelStyle,
  container: ContainerSize,
}

impl ReplayTask {
  pub fn new(response: String, order: AxisOrder, style: LabelStyle) -> Self {
    ReplayTask {
      response,
      order,
      style,
      container: ContainerSize::new(0, 0),
    }
  }

  pub fn with_container(mut self, container: ContainerSize) -> Self {
    self.container = container;
    self
  }
}

impl<O: Render> Task<LoadedImage, O> for ReplayTask
where
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  async fn run_task(self, input: LoadedImage, output: O) -> Result<(), Self::Error> {
    let parsed = parse_response(&self.response)?;
    info!("响应解析成功 ({:?})", parsed.stage);
    let items = extract_items(&parsed.value, self.order);

    let mut state = AppState::new(self.style, PromptSettings::default());
    state.load_image(input);
    let ticket = state.begin_analysis()?;
    let detections = aggregate(
      items.iter().map(|item| item.box_2d),
      items.iter().map(|item| LabelInfo::untranslated(&item.label)),
      self.style,
      ticket.image_size(),
    );
    let count = state.commit(ticket, detections)?.len();
    info!("重放得到 {} 个检测结果", count);

    render_state(&state, self.container, &output)
  }
}
