// 该文件是 Kanwu （看物） 项目的一部分。
// src/provider.rs - AI 服务商适配
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

use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl,
  canonical::{AxisOrder, CanonicalBox, normalize_value},
  detection::LabelInfo,
  input::ImageUpload,
  prompt::{AnalyzeOptions, DEFAULT_DETECT_LIMIT, DEFAULT_TEMPERATURE},
  response::{ParseFailure, parse_value},
};

mod custom;
mod gemini;
mod openai;
pub mod transport;

pub use self::custom::CustomProvider;
pub use self::gemini::GeminiProvider;
pub use self::openai::OpenAiProvider;
pub use self::transport::{HttpTransport, JsonRequest, Transport, TransportError};

const BOX_KEYS: [&str; 3] = ["bbox", "box_2d", "bounding_box"];
const LABEL_KEYS: [&str; 3] = ["label", "name", "text"];
const LIST_KEYS: [&str; 2] = ["objects", "items"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
  OpenAi,
  Gemini,
  Custom,
  Anthropic,
}

impl ProviderKind {
  pub fn id(&self) -> &'static str {
    match self {
      ProviderKind::OpenAi => "openai",
      ProviderKind::Gemini => "gemini",
      ProviderKind::Custom => "custom",
      ProviderKind::Anthropic => "anthropic",
    }
  }

  fn env_prefix(&self) -> String {
    format!("KANWU_{}", self.id().to_ascii_uppercase())
  }

  pub fn default_base_url(&self) -> &'static str {
    match self {
      ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
      ProviderKind::Anthropic => "https://api.anthropic.com/v1",
      ProviderKind::OpenAi | ProviderKind::Custom => "https://api.openai.com/v1",
    }
  }

  pub fn default_model(&self) -> &'static str {
    match self {
      ProviderKind::Gemini => "gemini-1.5-pro",
      ProviderKind::Anthropic => "claude-3-5-sonnet-latest",
      ProviderKind::OpenAi | ProviderKind::Custom => "gpt-4o",
    }
  }
}

impl std::fmt::Display for ProviderKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.id())
  }
}

impl std::str::FromStr for ProviderKind {
  type Err = SettingsError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "openai" => Ok(ProviderKind::OpenAi),
      "gemini" => Ok(ProviderKind::Gemini),
      "custom" => Ok(ProviderKind::Custom),
      "anthropic" => Ok(ProviderKind::Anthropic),
      other => Err(SettingsError::UnknownProvider(other.to_string())),
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
  #[error("不支持的 AI 服务商: {0}")]
  UnknownProvider(String),
  #[error("{0} 服务尚未实现")]
  Unsupported(ProviderKind),
  #[error("温度必须在 [0, 1] 之间: {0}")]
  Temperature(f32),
  #[error("检测数量上限必须大于 0")]
  DetectLimit,
  #[error("参数 {key} 无效: {value}")]
  InvalidQuery { key: String, value: String },
}

#[derive(Error, Debug)]
pub enum ProviderError {
  #[error("传输错误: {0}")]
  Transport(#[from] TransportError),
  #[error(transparent)]
  Parse(#[from] ParseFailure),
  #[error("响应结构异常: {0}")]
  Envelope(String),
}

/// 单个服务商的配置
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
  pub kind: ProviderKind,
  pub api_key: String,
  pub base_url: Option<String>,
  pub model_name: Option<String>,
  pub detect_limit: u32,
  pub temperature: f32,
}

impl ProviderSettings {
  pub fn new(kind: ProviderKind) -> Self {
    ProviderSettings {
      kind,
      api_key: String::new(),
      base_url: None,
      model_name: None,
      detect_limit: DEFAULT_DETECT_LIMIT,
      temperature: DEFAULT_TEMPERATURE,
    }
  }

  /// 读取 `KANWU_<KIND>_API_KEY` / `_BASE_URL` / `_MODEL_NAME`
  pub fn from_env(kind: ProviderKind) -> Self {
    let prefix = kind.env_prefix();
    let var = |suffix: &str| {
      std::env::var(format!("{prefix}_{suffix}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
    };
    ProviderSettings {
      api_key: var("API_KEY").unwrap_or_default(),
      base_url: var("BASE_URL"),
      model_name: var("MODEL_NAME"),
      ..ProviderSettings::new(kind)
    }
  }

  pub fn validate(self) -> Result<Self, SettingsError> {
    if !(0.0..=1.0).contains(&self.temperature) {
      return Err(SettingsError::Temperature(self.temperature));
    }
    if self.detect_limit == 0 {
      return Err(SettingsError::DetectLimit);
    }
    Ok(self)
  }

  pub fn resolved_base_url(&self) -> String {
    self
      .base_url
      .as_deref()
      .unwrap_or(self.kind.default_base_url())
      .trim_end_matches('/')
      .to_string()
  }

  pub fn resolved_model(&self) -> String {
    self
      .model_name
      .clone()
      .unwrap_or_else(|| self.kind.default_model().to_string())
  }

  pub fn analyze_options(&self) -> AnalyzeOptions {
    AnalyzeOptions {
      detect_limit: self.detect_limit,
      temperature: self.temperature,
      ..Default::default()
    }
  }
}

fn invalid_query(key: &str, value: &str) -> SettingsError {
  SettingsError::InvalidQuery {
    key: key.to_string(),
    value: value.to_string(),
  }
}

impl FromUrl for ProviderSettings {
  type Error = SettingsError;

  /// `openai://api.openai.com/v1?model=gpt-4o&limit=20&temperature=0.4&tls=true`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let kind: ProviderKind = url.scheme().parse()?;
    let mut settings = ProviderSettings::from_env(kind);
    let mut tls = true;

    for (key, value) in url.query_pairs() {
      match &*key {
        "model" => settings.model_name = Some(value.to_string()),
        "limit" => {
          settings.detect_limit = value.parse().map_err(|_| invalid_query(&key, &value))?;
        }
        "temperature" => {
          settings.temperature = value.parse().map_err(|_| invalid_query(&key, &value))?;
        }
        "tls" => tls = value.parse().map_err(|_| invalid_query(&key, &value))?,
        _ => warn!("忽略未知参数 {}={}", key, value),
      }
    }

    if let Some(host) = url.host_str().filter(|h| !h.is_empty()) {
      let protocol = if tls { "https" } else { "http" };
      let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
      let path = url.path().trim_end_matches('/');
      settings.base_url = Some(format!("{protocol}://{host}{port}{path}"));
    }

    settings.validate()
  }
}

/// 一个检测项：规范框（可能缺失）和原始标签
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedItem {
  pub box_2d: Option<CanonicalBox>,
  pub label: String,
}

/// 从解析后的响应中取出检测项
pub fn extract_items(value: &Value, order: AxisOrder) -> Vec<AnalyzedItem> {
  let list = LIST_KEYS
    .iter()
    .find_map(|k| value.get(*k).filter(|v| !v.is_null()))
    .unwrap_or(value);

  let items: Vec<&Value> = match list {
    Value::Array(items) => items.iter().collect(),
    single => vec![single],
  };

  items
    .into_iter()
    .map(|item| match item {
      Value::Object(map) => {
        let raw_box = BOX_KEYS
          .iter()
          .find_map(|k| map.get(*k).filter(|v| !v.is_null()));
        let label = LABEL_KEYS
          .iter()
          .find_map(|k| map.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
          .unwrap_or_default();
        AnalyzedItem {
          box_2d: normalize_value(raw_box, order),
          label: label.to_string(),
        }
      }
      Value::String(label) => AnalyzedItem {
        box_2d: None,
        label: label.clone(),
      },
      _ => AnalyzedItem {
        box_2d: None,
        label: String::new(),
      },
    })
    .collect()
}

/// 从翻译响应中取出标签字段
pub fn label_from_value(value: &Value, source: &str) -> LabelInfo {
  let field = |k: &str| value.get(k).and_then(Value::as_str).unwrap_or_default().to_string();
  LabelInfo {
    english: field("english"),
    chinese: field("chinese"),
    phonetic: field("phonetic"),
  }
  .or_source(source)
}

/// OpenAI 风格响应的 `choices[0].message.content`
pub(crate) fn chat_content(response: &Value) -> Result<Value, ProviderError> {
  let content = response
    .pointer("/choices/0/message/content")
    .ok_or_else(|| ProviderError::Envelope("缺少 choices[0].message.content".into()))?;
  match content {
    Value::String(text) => Ok(parse_value(text)?),
    Value::Null => Err(ProviderError::Envelope("消息内容为空".into())),
    structured => Ok(structured.clone()),
  }
}

#[allow(async_fn_in_trait)]
pub trait VisionProvider {
  fn kind(&self) -> ProviderKind;

  /// 失败直接向上传递：空间数据错了比没有更糟
  async fn analyze_image(
    &self,
    image: &ImageUpload,
    prompt: &str,
    options: &AnalyzeOptions,
  ) -> Result<Vec<AnalyzedItem>, ProviderError>;

  async fn translate_label(&self, text: &str) -> Result<LabelInfo, ProviderError>;

  /// 翻译失败时退化为原文
  async fn process_label(&self, text: &str) -> LabelInfo {
    match self.translate_label(text).await {
      Ok(info) => info.or_source(text),
      Err(e) => {
        warn!("标签 '{}' 处理失败, 使用原文: {}", text, e);
        LabelInfo::untranslated(text)
      }
    }
  }
}

pub enum ProviderWrapper<T = HttpTransport> {
  OpenAi(OpenAiProvider<T>),
  Gemini(GeminiProvider<T>),
  Custom(CustomProvider<T>),
}

impl ProviderWrapper<HttpTransport> {
  pub fn new(settings: &ProviderSettings) -> Result<Self, anyhow::Error> {
    let transport = HttpTransport::new()?;
    Ok(Self::with_transport(settings, transport)?)
  }
}

impl<T: Transport> ProviderWrapper<T> {
  pub fn with_transport(settings: &ProviderSettings, transport: T) -> Result<Self, SettingsError> {
    info!(
      "创建 {} 服务: {} ({})",
      settings.kind,
      settings.resolved_base_url(),
      settings.resolved_model()
    );
    match settings.kind {
      ProviderKind::OpenAi => Ok(ProviderWrapper::OpenAi(OpenAiProvider::new(settings, transport))),
      ProviderKind::Gemini => Ok(ProviderWrapper::Gemini(GeminiProvider::new(settings, transport))),
      ProviderKind::Custom => Ok(ProviderWrapper::Custom(CustomProvider::new(settings, transport))),
      ProviderKind::Anthropic => Err(SettingsError::Unsupported(ProviderKind::Anthropic)),
    }
  }
}

impl<T: Transport> VisionProvider for ProviderWrapper<T> {
  fn kind(&self) -> ProviderKind {
    match self {
      ProviderWrapper::OpenAi(p) => p.kind(),
      ProviderWrapper::Gemini(p) => p.kind(),
      ProviderWrapper::Custom(p) => p.kind(),
    }
  }

  async fn analyze_image(
    &self,
    image: &ImageUpload,
    prompt: &str,
    options: &AnalyzeOptions,
  ) -> Result<Vec<AnalyzedItem>, ProviderError> {
    match self {
      ProviderWrapper::OpenAi(p) => p.analyze_image(image, prompt, options).await,
      ProviderWrapper::Gemini(p) => p.analyze_image(image, prompt, options).await,
      ProviderWrapper::Custom(p) => p.analyze_image(image, prompt, options).await,
    }
  }

  async fn translate_label(&self, text: &str) -> Result<LabelInfo, ProviderError> {
    match self {
      ProviderWrapper::OpenAi(p) => p.translate_label(text).await,
      ProviderWrapper::Gemini(p) => p.translate_label(text).await,
      ProviderWrapper::Custom(p) => p.translate_label(text).await,
    }
  }
}

/// 按服务商缓存已构造的实例，由调用方显式持有
pub struct ProviderRegistry<T = HttpTransport> {
  transport: T,
  entries: HashMap<ProviderKind, (ProviderSettings, Arc<ProviderWrapper<T>>)>,
}

impl<T: Transport + Clone> ProviderRegistry<T> {
  pub fn new(transport: T) -> Self {
    ProviderRegistry {
      transport,
      entries: HashMap::new(),
    }
  }

  /// 配置未变时复用缓存实例，否则重新构造
  pub fn get(&mut self, settings: &ProviderSettings) -> Result<Arc<ProviderWrapper<T>>, SettingsError> {
    if let Some((cached, provider)) = self.entries.get(&settings.kind)
      && cached == settings
    {
      debug!("复用 {} 服务实例", settings.kind);
      return Ok(Arc::clone(provider));
    }

    let provider = Arc::new(ProviderWrapper::with_transport(
      settings,
      self.transport.clone(),
    )?);
    self
      .entries
      .insert(settings.kind, (settings.clone(), Arc::clone(&provider)));
    Ok(provider)
  }

  pub fn clear(&mut self, kind: ProviderKind) {
    self.entries.remove(&kind);
  }

  pub fn clear_all(&mut self) {
    self.entries.clear();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::transport::fake::FakeTransport;
  use super::*;
  use serde_json::json;

  #[test]
  fn settings_from_url() {
    let url = Url::parse("custom://localhost:8080/v1/?model=qwen-vl&limit=5&temperature=0.2&tls=false")
      .unwrap();
    let s = ProviderSettings::from_url(&url).unwrap();
    assert_eq!(s.kind, ProviderKind::Custom);
    assert_eq!(s.resolved_base_url(), "http://localhost:8080/v1");
    assert_eq!(s.resolved_model(), "qwen-vl");
    assert_eq!(s.detect_limit, 5);
    assert_eq!(s.temperature, 0.2);
  }

  #[test]
  fn settings_reject_bad_values() {
    let hot = Url::parse("openai://api.example.com/v1?temperature=1.5").unwrap();
    assert_eq!(
      ProviderSettings::from_url(&hot),
      Err(SettingsError::Temperature(1.5))
    );
    let none = Url::parse("openai://api.example.com/v1?limit=0").unwrap();
    assert_eq!(ProviderSettings::from_url(&none), Err(SettingsError::DetectLimit));
    let unknown = Url::parse("mystery://x").unwrap();
    assert!(matches!(
      ProviderSettings::from_url(&unknown),
      Err(SettingsError::UnknownProvider(_))
    ));
  }

  #[test]
  fn defaults_apply_without_overrides() {
    let s = ProviderSettings::new(ProviderKind::Gemini);
    assert_eq!(
      s.resolved_base_url(),
      "https://generativelanguage.googleapis.com/v1beta"
    );
    assert_eq!(s.resolved_model(), "gemini-1.5-pro");
  }

  #[test]
  fn items_are_found_under_any_list_key() {
    let v = json!({"items": [
      {"name": "cup", "bounding_box": {"x1": 1, "y1": 2, "x2": 3, "y2": 4}},
      {"text": "sky"},
      "tree",
    ]});
    let items = extract_items(&v, AxisOrder::XyXy);
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].label, "cup");
    assert_eq!(items[0].box_2d, Some(CanonicalBox::new(1.0, 2.0, 3.0, 4.0)));
    assert_eq!(items[1].box_2d, None);
    assert_eq!(items[2].label, "tree");
  }

  #[test]
  fn single_object_becomes_one_item() {
    let v = json!({"label": "dog", "box_2d": [100, 50, 400, 300]});
    let items = extract_items(&v, AxisOrder::YxYx);
    assert_eq!(
      items,
      vec![AnalyzedItem {
        box_2d: Some(CanonicalBox::new(50.0, 100.0, 300.0, 400.0)),
        label: "dog".into(),
      }]
    );
  }

  #[test]
  fn chat_content_accepts_text_and_structured() {
    let text = json!({"choices": [{"message": {"content": "```json\n{\"a\": 1,}\n```"}}]});
    assert_eq!(chat_content(&text).unwrap(), json!({"a": 1}));
    let structured = json!({"choices": [{"message": {"content": {"a": 2}}}]});
    assert_eq!(chat_content(&structured).unwrap(), json!({"a": 2}));
    assert!(matches!(
      chat_content(&json!({"choices": []})),
      Err(ProviderError::Envelope(_))
    ));
  }

  #[test]
  fn registry_caches_per_kind_until_settings_change() {
    let transport = FakeTransport::failing();
    let mut registry = ProviderRegistry::new(&transport);
    let settings = ProviderSettings::new(ProviderKind::OpenAi);

    let a = registry.get(&settings).unwrap();
    let b = registry.get(&settings).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let changed = ProviderSettings {
      model_name: Some("gpt-4o-mini".into()),
      ..settings.clone()
    };
    let c = registry.get(&changed).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(registry.len(), 1);

    registry.get(&ProviderSettings::new(ProviderKind::Gemini)).unwrap();
    assert_eq!(registry.len(), 2);
    registry.clear(ProviderKind::OpenAi);
    assert_eq!(registry.len(), 1);
    registry.clear_all();
    assert!(registry.is_empty());
  }

  #[test]
  fn anthropic_is_recognised_but_unsupported() {
    let transport = FakeTransport::failing();
    let mut registry = ProviderRegistry::new(&transport);
    assert!(matches!(
      registry.get(&ProviderSettings::new(ProviderKind::Anthropic)),
      Err(SettingsError::Unsupported(ProviderKind::Anthropic))
    ));
  }

  #[tokio::test]
  async fn failing_translation_degrades_to_source_text() {
    let transport = FakeTransport::failing();
    for kind in [ProviderKind::OpenAi, ProviderKind::Gemini, ProviderKind::Custom] {
      let provider = ProviderWrapper::with_transport(&ProviderSettings::new(kind), &transport).unwrap();
      assert_eq!(
        provider.process_label("apple").await,
        LabelInfo {
          english: "apple".into(),
          chinese: "apple".into(),
          phonetic: String::new(),
        }
      );
    }
  }
}
