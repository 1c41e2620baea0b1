// 该文件是 Kanwu （看物） 项目的一部分。
// src/provider/gemini.rs - Gemini 视觉服务
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
    AnalyzedItem, ProviderError, ProviderKind, ProviderSettings, VisionProvider, extract_items,
    label_from_value,
    transport::{JsonRequest, Transport},
  },
  response::parse_value,
};

const MAX_OUTPUT_TOKENS: u32 = 4096;
const TOP_K: u32 = 32;
const TOP_P: f32 = 1.0;

/// Gemini 的框坐标为 `[ymin, xmin, ymax, xmax]`
const NATIVE_ORDER: AxisOrder = AxisOrder::YxYx;

pub struct GeminiProvider<T> {
  transport: T,
  api_key: String,
  endpoint: String,
  temperature: f32,
}

impl<T: Transport> GeminiProvider<T> {
  pub fn new(settings: &ProviderSettings, transport: T) -> Self {
    GeminiProvider {
      transport,
      api_key: settings.api_key.clone(),
      endpoint: format!(
        "{}/models/{}:generateContent",
        settings.resolved_base_url(),
        settings.resolved_model()
      ),
      temperature: settings.temperature,
    }
  }

  async fn generate(&self, parts: Value, temperature: f32) -> Result<Value, ProviderError> {
    let body = json!({
      "contents": [{ "parts": parts }],
      "generationConfig": {
        "temperature": temperature,
        "topK": TOP_K,
        "topP": TOP_P,
        "maxOutputTokens": MAX_OUTPUT_TOKENS,
      },
    });
    let request = JsonRequest::new(&self.endpoint, body).header("x-goog-api-key", &self.api_key);
    let response = self.transport.post_json(request).await?;
    let text = candidate_text(&response)?;
    Ok(parse_value(&text)?)
  }
}

/// 拼接 `candidates[0].content.parts[*].text`
fn candidate_text(response: &Value) -> Result<String, ProviderError> {
  let parts = response
    .pointer("/candidates/0/content/parts")
    .and_then(Value::as_array)
    .ok_or_else(|| ProviderError::Envelope("缺少 candidates[0].content.parts".into()))?;
  let text: String = parts
    .iter()
    .filter_map(|p| p.get("text").and_then(Value::as_str))
    .collect();
  if text.trim().is_empty() {
    return Err(ProviderError::Envelope("候选结果没有文本".into()));
  }
  Ok(text)
}

impl<T: Transport> VisionProvider for GeminiProvider<T> {
  fn kind(&self) -> ProviderKind {
    ProviderKind::Gemini
  }

  async fn analyze_image(
    &self,
    image: &ImageUpload,
    prompt: &str,
    options: &AnalyzeOptions,
  ) -> Result<Vec<AnalyzedItem>, ProviderError> {
    let text = detection_prompt(prompt, options, NATIVE_ORDER);
    debug!("Gemini 检测提示词: {}", text);

    let parts = json!([
      { "text": text },
      { "inline_data": { "mime_type": image.mime, "data": image.to_base64() } },
    ]);
    let value = self.generate(parts, options.temperature).await?;
    let items = extract_items(&value, NATIVE_ORDER);
    info!("Gemini 返回 {} 个检测项", items.len());
    Ok(items)
  }

  async fn translate_label(&self, text: &str) -> Result<LabelInfo, ProviderError> {
    let parts = json!([{ "text": label_prompt(text) }]);
    let value = self.generate(parts, self.temperature).await?;
    Ok(label_from_value(&value, text))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{canonical::CanonicalBox, provider::transport::fake::FakeTransport};

  fn reply(parts: &[&str]) -> Value {
    let parts: Vec<Value> = parts.iter().map(|t| json!({ "text": t })).collect();
    json!({ "candidates": [{ "content": { "parts": parts, "role": "model" } }] })
  }

  #[tokio::test]
  async fn boxes_are_reordered_from_native_axes() {
    let transport = FakeTransport::with([Ok(reply(&[
      "```json\n[{\"box_2d\": [100, 50, 400, 300], ",
      "\"label\": \"dog\"},]\n```",
    ]))]);
    let settings = ProviderSettings {
      api_key: "g-key".into(),
      ..ProviderSettings::new(ProviderKind::Gemini)
    };
    let provider = GeminiProvider::new(&settings, &transport);
    let image = ImageUpload::new(vec![1u8, 2, 3], "image/jpeg");

    let items = provider
      .analyze_image(&image, "", &AnalyzeOptions::default())
      .await
      .unwrap();
    assert_eq!(
      items,
      vec![AnalyzedItem {
        box_2d: Some(CanonicalBox::new(50.0, 100.0, 300.0, 400.0)),
        label: "dog".into(),
      }]
    );

    let requests = transport.requests.borrow();
    assert_eq!(
      requests[0].url,
      "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent"
    );
    assert_eq!(requests[0].headers, vec![("x-goog-api-key", "g-key".to_string())]);
    let parts = &requests[0].body["contents"][0]["parts"];
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
    assert_eq!(parts[1]["inline_data"]["data"], "AQID");
    assert_eq!(requests[0].body["generationConfig"]["topK"], 32);
  }

  #[tokio::test]
  async fn empty_candidates_are_an_envelope_error() {
    let transport = FakeTransport::with([Ok(json!({ "candidates": [] }))]);
    let provider = GeminiProvider::new(&ProviderSettings::new(ProviderKind::Gemini), &transport);
    let result = provider.translate_label("apple").await;
    assert!(matches!(result, Err(ProviderError::Envelope(_))));
  }
}
