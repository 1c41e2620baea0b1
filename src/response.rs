// 该文件是 Kanwu （看物） 项目的一部分。
// src/response.rs - 模型响应文本解析与修复
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

//! 模型输出不一定是纯 JSON：可能包在 markdown 代码块里，夹杂说明文字，
//! 或者带有多余的尾随逗号。这里按固定顺序逐级尝试修复。

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const FENCE: &str = "```";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("响应解析失败: {reason}")]
pub struct ParseFailure {
  pub reason: String,
}

impl ParseFailure {
  pub fn unrecognized() -> Self {
    ParseFailure {
      reason: "unrecognized response format".to_string(),
    }
  }
}

/// 修复阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStage {
  Strict,
  Unfenced,
  ExtractedSpan,
  Failed,
}

impl RepairStage {
  fn next(self) -> RepairStage {
    match self {
      RepairStage::Strict => RepairStage::Unfenced,
      RepairStage::Unfenced => RepairStage::ExtractedSpan,
      RepairStage::ExtractedSpan | RepairStage::Failed => RepairStage::Failed,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
  pub value: Value,
  pub stage: RepairStage,
}

/// 解析模型返回的文本，第一个成功的阶段胜出
pub fn parse_response(text: &str) -> Result<Parsed, ParseFailure> {
  let mut stage = RepairStage::Strict;
  let unfenced = strip_fences(text);

  loop {
    let attempt = match stage {
      RepairStage::Strict => serde_json::from_str::<Value>(text).ok(),
      RepairStage::Unfenced => serde_json::from_str::<Value>(&clean_text(text)).ok(),
      // 字符串状态从片段开头算起，前面说明文字里的引号不影响
      RepairStage::ExtractedSpan => extract_span(&unfenced)
        .and_then(|span| serde_json::from_str::<Value>(&strip_trailing_commas(span)).ok()),
      RepairStage::Failed => {
        debug!("所有修复阶段均失败，响应长度 {}", text.len());
        return Err(ParseFailure::unrecognized());
      }
    };

    if let Some(value) = attempt {
      debug!("响应在 {:?} 阶段解析成功", stage);
      return Ok(Parsed { value, stage });
    }
    stage = stage.next();
  }
}

/// 只关心结果值
pub fn parse_value(text: &str) -> Result<Value, ParseFailure> {
  parse_response(text).map(|p| p.value)
}

/// 去掉代码块标记与尾随逗号
pub fn clean_text(text: &str) -> String {
  strip_trailing_commas(strip_fences(text).trim())
}

fn strip_fences(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut rest = text;
  while let Some(pos) = rest.find(FENCE) {
    out.push_str(&rest[..pos]);
    rest = &rest[pos + FENCE.len()..];
    if rest.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
      rest = &rest[4..];
    }
  }
  out.push_str(rest);
  out
}

/// 删除紧邻 `}` / `]` 之前的逗号，字符串字面量内部不动
fn strip_trailing_commas(text: &str) -> String {
  let chars: Vec<char> = text.chars().collect();
  let mut out = String::with_capacity(text.len());
  let mut in_string = false;
  let mut escaped = false;

  for (i, &ch) in chars.iter().enumerate() {
    if in_string {
      out.push(ch);
      if escaped {
        escaped = false;
      } else if ch == '\\' {
        escaped = true;
      } else if ch == '"' {
        in_string = false;
      }
      continue;
    }

    match ch {
      '"' => {
        in_string = true;
        out.push(ch);
      }
      ',' => {
        let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
        if !matches!(next, Some('}') | Some(']')) {
          out.push(ch);
        }
      }
      _ => out.push(ch),
    }
  }
  out
}

/// 最靠前的 `{...}` 或 `[...]` 片段，取到最后一个对应的闭合符
fn extract_span(text: &str) -> Option<&str> {
  let last_brace = text.rfind('}');
  let last_bracket = text.rfind(']');

  text.char_indices().find_map(|(start, ch)| {
    let end = match ch {
      '{' => last_brace,
      '[' => last_bracket,
      _ => None,
    }?;
    (end > start).then(|| &text[start..=end])
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn plain_json_parses_strictly() {
    let parsed = parse_response(r#"[{"label": "cat", "box_2d": [1, 2, 3, 4]}]"#).unwrap();
    assert_eq!(parsed.stage, RepairStage::Strict);
    assert_eq!(parsed.value, json!([{"label": "cat", "box_2d": [1, 2, 3, 4]}]));
  }

  #[test]
  fn fenced_and_trailing_comma_payloads_match_plain() {
    let plain = r#"{"objects": [{"label": "cup", "bbox": [10, 20, 30, 40]}]}"#;
    let expected = parse_value(plain).unwrap();

    let fenced = format!("```json\n{plain}\n```");
    let trailing = r#"{"objects": [{"label": "cup", "bbox": [10, 20, 30, 40],},],}"#;
    let both = format!("```JSON\n{trailing}\n```");

    for text in [fenced.as_str(), trailing, both.as_str()] {
      let parsed = parse_response(text).unwrap();
      assert_eq!(parsed.stage, RepairStage::Unfenced, "{text}");
      assert_eq!(parsed.value, expected, "{text}");
    }
  }

  #[test]
  fn prose_wrapped_json_is_extracted() {
    let text = "Sure! Here are the objects I found:\n[{\"label\": \"dog\"}]\nLet me know if you need more.";
    let parsed = parse_response(text).unwrap();
    assert_eq!(parsed.stage, RepairStage::ExtractedSpan);
    assert_eq!(parsed.value, json!([{"label": "dog"}]));
  }

  #[test]
  fn extraction_is_greedy_over_outer_braces() {
    let text = "result: {\"a\": {\"b\": 1}} done";
    assert_eq!(parse_value(text).unwrap(), json!({"a": {"b": 1}}));
  }

  #[test]
  fn commas_inside_strings_survive() {
    let text = r#"{"label": "a,]", "n": [1, 2,],}"#;
    assert_eq!(parse_value(text).unwrap(), json!({"label": "a,]", "n": [1, 2]}));
  }

  #[test]
  fn stray_quote_in_prose_does_not_hide_trailing_commas() {
    let text = "The monitor is 27\" wide. Result: {\"objects\": [{\"label\": \"tv\",},],}";
    let parsed = parse_response(text).unwrap();
    assert_eq!(parsed.stage, RepairStage::ExtractedSpan);
    assert_eq!(parsed.value, json!({"objects": [{"label": "tv"}]}));
  }

  #[test]
  fn span_commas_inside_strings_survive_after_prose_quote() {
    let text = "a 5\" cup: {\"label\": \"x,}\", \"n\": [1,],}";
    assert_eq!(parse_value(text).unwrap(), json!({"label": "x,}", "n": [1]}));
  }

  #[test]
  fn prose_without_json_fails() {
    let err = parse_response("The cat sat on the mat.").unwrap_err();
    assert_eq!(err, ParseFailure::unrecognized());
    assert_eq!(err.reason, "unrecognized response format");
  }

  #[test]
  fn broken_span_fails_instead_of_panicking() {
    assert!(parse_response("look: { not json at all }").is_err());
    assert!(parse_response("").is_err());
    assert!(parse_response("}{").is_err());
  }
}
