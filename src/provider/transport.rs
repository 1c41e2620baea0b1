// 该文件是 Kanwu （看物） 项目的一部分。
// src/provider/transport.rs - HTTP 传输
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

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Error, Debug)]
pub enum TransportError {
  #[error("请求失败: {0}")]
  Request(#[from] reqwest::Error),
  #[error("服务返回 {status}: {body}")]
  Status { status: u16, body: String },
  #[error("响应不是合法 JSON: {0}")]
  Decode(String),
}

/// 一次 JSON POST 请求
#[derive(Debug, Clone)]
pub struct JsonRequest {
  pub url: String,
  pub headers: Vec<(&'static str, String)>,
  pub body: Value,
}

impl JsonRequest {
  pub fn new(url: impl Into<String>, body: Value) -> Self {
    JsonRequest {
      url: url.into(),
      headers: Vec::new(),
      body,
    }
  }

  pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
    self.headers.push((name, value.into()));
    self
  }
}

#[allow(async_fn_in_trait)]
pub trait Transport {
  async fn post_json(&self, request: JsonRequest) -> Result<Value, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: Client,
}

impl HttpTransport {
  pub fn new() -> Result<Self, TransportError> {
    let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    Ok(HttpTransport { client })
  }
}

impl Transport for HttpTransport {
  async fn post_json(&self, request: JsonRequest) -> Result<Value, TransportError> {
    debug!("POST {}", request.url);
    let mut builder = self.client.post(&request.url).json(&request.body);
    for (name, value) in &request.headers {
      builder = builder.header(*name, value);
    }

    let response = builder.send().await?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      error!("{} 返回错误状态 {}: {}", request.url, status, body);
      return Err(TransportError::Status {
        status: status.as_u16(),
        body,
      });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
  }
}

#[cfg(test)]
pub(crate) mod fake {
  use std::{cell::RefCell, collections::VecDeque};

  use super::*;

  /// 按顺序返回预设响应，并记录收到的请求
  #[derive(Default)]
  pub struct FakeTransport {
    responses: RefCell<VecDeque<Result<Value, TransportError>>>,
    pub requests: RefCell<Vec<JsonRequest>>,
  }

  impl FakeTransport {
    pub fn with(responses: impl IntoIterator<Item = Result<Value, TransportError>>) -> Self {
      FakeTransport {
        responses: RefCell::new(responses.into_iter().collect()),
        requests: RefCell::default(),
      }
    }

    pub fn failing() -> Self {
      FakeTransport::default()
    }
  }

  impl Transport for FakeTransport {
    async fn post_json(&self, request: JsonRequest) -> Result<Value, TransportError> {
      self.requests.borrow_mut().push(request);
      self
        .responses
        .borrow_mut()
        .pop_front()
        .unwrap_or(Err(TransportError::Status {
          status: 503,
          body: "unavailable".into(),
        }))
    }
  }

  impl Transport for &FakeTransport {
    async fn post_json(&self, request: JsonRequest) -> Result<Value, TransportError> {
      (**self).post_json(request).await
    }
  }
}
