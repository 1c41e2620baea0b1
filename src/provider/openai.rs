// 该文件是 Kanwu （看物） 项目的一部分。
// src/provider/openai.rs - OpenAI 视觉服务
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

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{
  canonical::AxisOrder,
  detection::LabelInfo,
  input::ImageUpload,
  prompt::{AnalyzeOptions, detection_prompt, label_prompt},
  provider::{
    AnalyzedItem, ProviderError, ProviderKind, ProviderSettings, VisionProvider, chat_content,
    extract_items, label_from_value,
    transport::{JsonRequest, Transport},
  },
};

const MAX_TOKENS: u32 = 4096;
const LIST_INSTRUCTION: &str = "\nReturn a JSON object whose \"objects\" field holds the list.";

pub struct OpenAiProvider<T> {
  transport: T,
  api_key: String,
  endpoint: String,
  model: String,
  temperature: f32,
}

impl<T: Transport> OpenAiProvider<T> {
  pub fn new(settings: &ProviderSettings, transport: T) -> Self {
    OpenAiProvider {
      transport,
      api_key: settings.api_key.clone(),
      endpoint: format!("{}/chat/completions", settings.resolved_base_url()),
      model: settings.resolved_model(),
      temperature: settings.temperature,
    }
  }

  async fn complete(&self, content: Value, temperature: f32) -> Result<Value, ProviderError> {
    let body = json!({
      "model": self.model,
      "messages": [{ "role": "user", "content": content }],
      "max_tokens": MAX_TOKENS,
      "temperature": temperature,
      "response_format": { "type": "json_object" },
    });
    let request = JsonRequest::new(&self.endpoint, body)
      .header("Authorization", format!("Bearer {}", self.api_key));
    let response = self.transport.post_json(request).await?;
    chat_content(&response)
  }
}

impl<T: Transport> VisionProvider for OpenAiProvider<T> {
  fn kind(&self) -> ProviderKind {
    ProviderKind::OpenAi
  }

  async fn analyze_image(
    &self,
    image: &ImageUpload,
    prompt: &str,
    options: &AnalyzeOptions,
  ) -> Result<Vec<AnalyzedItem>, ProviderError> {
    let mut text = detection_prompt(prompt, options, AxisOrder::XyXy);
    text.push_str(LIST_INSTRUCTION);
    debug!("OpenAI 检测提示词: {}", text);

    let content = json!([
      { "type": "text", "text": text },
      { "type": "image_url", "image_url": { "url": image.to_data_url(), "detail": "high" } },
    ]);
    let value = self.complete(content, options.temperature).await?;
    let items = extract_items(&value, AxisOrder::XyXy);
    info!("OpenAI 返回 {} 个检测项", items.len());
    Ok(items)
  }

  async fn translate_label(&self, text: &str) -> Result<LabelInfo, ProviderError> {
    let value = self
      .complete(Value::String(label_prompt(text)), self.temperature)
      .await?;
    Ok(label_from_value(&value, text))
  }
}
