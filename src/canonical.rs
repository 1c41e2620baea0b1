// 该文件是 Kanwu （看物） 项目的一部分。
// src/canonical.rs - 规范坐标空间与边界框归一化
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

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// 规范坐标空间的边长（0–1000 正方形）
pub const CANONICAL_EXTENT: f64 = 1000.0;

/// 规范空间中的边界框
///
/// 每个坐标独立截断到 `[0, 1000]`。`x1 <= x2` 不做保证，
/// 倒置的框原样保留，交给投影阶段判断。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanonicalBox {
  pub x1: f64,
  pub y1: f64,
  pub x2: f64,
  pub y2: f64,
}

impl CanonicalBox {
  /// 整幅图像
  pub const FULL_FRAME: CanonicalBox = CanonicalBox {
    x1: 0.0,
    y1: 0.0,
    x2: CANONICAL_EXTENT,
    y2: CANONICAL_EXTENT,
  };

  pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
    Self { x1, y1, x2, y2 }
  }

  /// 各坐标独立截断，不重新排序
  pub fn clamped(self) -> Self {
    Self {
      x1: clamp_coordinate(self.x1),
      y1: clamp_coordinate(self.y1),
      x2: clamp_coordinate(self.x2),
      y2: clamp_coordinate(self.y2),
    }
  }

  pub fn is_inverted(&self) -> bool {
    self.x1 > self.x2 || self.y1 > self.y2
  }

  pub fn to_array(&self) -> [f64; 4] {
    [self.x1, self.y1, self.x2, self.y2]
  }
}

fn clamp_coordinate(v: f64) -> f64 {
  v.clamp(0.0, CANONICAL_EXTENT)
}

/// 四元数组的坐标顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisOrder {
  /// `[x1, y1, x2, y2]`
  #[default]
  XyXy,
  /// `[ymin, xmin, ymax, xmax]`
  YxYx,
}

impl std::str::FromStr for AxisOrder {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "xyxy" => Ok(AxisOrder::XyXy),
      "yxyx" => Ok(AxisOrder::YxYx),
      other => Err(format!("未知的坐标顺序: {other}")),
    }
  }
}

/// 服务商返回的原始框
#[derive(Debug, Clone, PartialEq)]
pub enum RawDetection {
  Sequence([f64; 4]),
  MinMax {
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
  },
  Corners {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
  },
  Unrecognized,
}

impl RawDetection {
  /// 从 JSON 值识别框的形状，`null` 视为缺失
  pub fn from_value(value: &Value) -> Option<RawDetection> {
    match value {
      Value::Null => None,
      Value::Array(items) => Some(Self::from_sequence(items)),
      Value::Object(map) => Some(Self::from_object(map)),
      _ => Some(RawDetection::Unrecognized),
    }
  }

  fn from_sequence(items: &[Value]) -> RawDetection {
    if items.len() < 4 {
      return RawDetection::Unrecognized;
    }
    let mut coords = [0.0; 4];
    for (slot, item) in coords.iter_mut().zip(items) {
      match coordinate(item) {
        Some(v) => *slot = v,
        None => return RawDetection::Unrecognized,
      }
    }
    RawDetection::Sequence(coords)
  }

  fn from_object(map: &Map<String, Value>) -> RawDetection {
    let lookup = |name: &str| {
      map
        .iter()
        .find(|(k, _)| normalize_key(k) == name)
        .map(|(_, v)| v)
    };

    if lookup("xmin").is_some() && lookup("ymin").is_some() {
      return match ["xmin", "ymin", "xmax", "ymax"].map(|k| lookup(k).and_then(coordinate)) {
        [Some(xmin), Some(ymin), Some(xmax), Some(ymax)] => RawDetection::MinMax {
          xmin,
          ymin,
          xmax,
          ymax,
        },
        _ => RawDetection::Unrecognized,
      };
    }

    if lookup("x1").is_some() && lookup("y1").is_some() {
      return match ["x1", "y1", "x2", "y2"].map(|k| lookup(k).and_then(coordinate)) {
        [Some(x1), Some(y1), Some(x2), Some(y2)] => RawDetection::Corners { x1, y1, x2, y2 },
        _ => RawDetection::Unrecognized,
      };
    }

    RawDetection::Unrecognized
  }
}

fn normalize_key(key: &str) -> String {
  key
    .chars()
    .filter(|c| *c != '_' && *c != '-')
    .flat_map(char::to_lowercase)
    .collect()
}

fn coordinate(value: &Value) -> Option<f64> {
  let v = match value {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s.trim().parse::<f64>().ok()?,
    _ => return None,
  };
  v.is_finite().then_some(v)
}

/// 按默认 `[x1, y1, x2, y2]` 顺序归一化
pub fn normalize_box(raw: Option<&RawDetection>) -> Option<CanonicalBox> {
  normalize_box_with(raw, AxisOrder::XyXy)
}

/// 归一化原始框；仅当输入缺失时返回 `None`
pub fn normalize_box_with(raw: Option<&RawDetection>, order: AxisOrder) -> Option<CanonicalBox> {
  let raw = raw?;
  let mapped = match *raw {
    RawDetection::Sequence([a, b, c, d]) => match order {
      AxisOrder::XyXy => CanonicalBox::new(a, b, c, d),
      AxisOrder::YxYx => CanonicalBox::new(b, a, d, c),
    },
    RawDetection::MinMax {
      xmin,
      ymin,
      xmax,
      ymax,
    } => CanonicalBox::new(xmin, ymin, xmax, ymax),
    RawDetection::Corners { x1, y1, x2, y2 } => CanonicalBox::new(x1, y1, x2, y2),
    RawDetection::Unrecognized => {
      debug!("无法识别的框格式，退化为整幅图像");
      CanonicalBox::FULL_FRAME
    }
  };
  Some(mapped.clamped())
}

/// 直接从 JSON 值归一化
pub fn normalize_value(value: Option<&Value>, order: AxisOrder) -> Option<CanonicalBox> {
  let raw = value.and_then(RawDetection::from_value);
  normalize_box_with(raw.as_ref(), order)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn in_range(b: &CanonicalBox) -> bool {
    b.to_array().iter().all(|v| (0.0..=CANONICAL_EXTENT).contains(v))
  }

  #[test]
  fn sequence_maps_positions_in_order() {
    let b = normalize_value(Some(&json!([10, 20, 300, 400])), AxisOrder::XyXy).unwrap();
    assert_eq!(b, CanonicalBox::new(10.0, 20.0, 300.0, 400.0));
  }

  #[test]
  fn yxyx_sequence_swaps_axes() {
    let b = normalize_value(Some(&json!([20, 10, 400, 300])), AxisOrder::YxYx).unwrap();
    assert_eq!(b, CanonicalBox::new(10.0, 20.0, 300.0, 400.0));
  }

  #[test]
  fn min_max_and_corner_objects() {
    let minmax = json!({"ymin": 5, "xmin": 6, "ymax": 700, "xmax": 800});
    assert_eq!(
      normalize_value(Some(&minmax), AxisOrder::XyXy),
      Some(CanonicalBox::new(6.0, 5.0, 800.0, 700.0))
    );

    let corners = json!({"x1": 1, "y1": 2, "x2": 3, "y2": 4});
    assert_eq!(
      normalize_value(Some(&corners), AxisOrder::YxYx),
      Some(CanonicalBox::new(1.0, 2.0, 3.0, 4.0))
    );
  }

  #[test]
  fn key_spelling_variants_are_accepted() {
    let v = json!({"x_min": "12", "yMin": 13, "X_MAX": 14.5, "y-max": 15});
    assert_eq!(
      normalize_value(Some(&v), AxisOrder::XyXy),
      Some(CanonicalBox::new(12.0, 13.0, 14.5, 15.0))
    );
  }

  #[test]
  fn absent_box_is_none() {
    assert_eq!(normalize_box(None), None);
    assert_eq!(normalize_value(Some(&Value::Null), AxisOrder::XyXy), None);
    assert_eq!(normalize_value(None, AxisOrder::XyXy), None);
  }

  #[test]
  fn unknown_shapes_fall_back_to_full_frame() {
    for v in [
      json!({"left": 1, "top": 2}),
      json!([1, 2, 3]),
      json!(["a", "b", "c", "d"]),
      json!("box"),
      json!({"x1": 1, "y1": 2, "x2": "wide"}),
    ] {
      assert_eq!(
        normalize_value(Some(&v), AxisOrder::XyXy),
        Some(CanonicalBox::FULL_FRAME),
        "{v}"
      );
    }
  }

  #[test]
  fn out_of_range_values_are_clamped_independently() {
    let b = normalize_value(Some(&json!([-50, 1500, 2000, -1])), AxisOrder::XyXy).unwrap();
    assert_eq!(b, CanonicalBox::new(0.0, 1000.0, 1000.0, 0.0));
    assert!(in_range(&b));
    // 截断后倒置的框保持原样
    assert!(b.is_inverted());
  }

  #[test]
  fn every_representation_lands_in_range() {
    let inputs = [
      json!([-10, 500, 999, 1200]),
      json!({"xmin": -3, "ymin": 4, "xmax": 5000, "ymax": 6}),
      json!({"x1": 1e9, "y1": -1e9, "x2": 0, "y2": 1000}),
      json!({"nothing": true}),
    ];
    for v in inputs {
      let b = normalize_value(Some(&v), AxisOrder::XyXy).unwrap();
      assert!(in_range(&b), "{v} -> {b:?}");
    }
  }

  #[test]
  fn axis_order_parses_case_insensitively() {
    assert_eq!("YXYX".parse::<AxisOrder>(), Ok(AxisOrder::YxYx));
    assert!("xy".parse::<AxisOrder>().is_err());
  }
}
