// 该文件是 Kanwu （看物） 项目的一部分。
// src/projector.rs - 规范坐标到显示区域的几何投影
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
use thiserror::Error;

use crate::canonical::{CANONICAL_EXTENT, CanonicalBox};

/// 原始图像像素尺寸，图像解码时确定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
  pub width: u32,
  pub height: u32,
}

impl ImageSize {
  pub fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }
}

/// 显示容器尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSize {
  pub width: u32,
  pub height: u32,
}

impl ContainerSize {
  pub fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }
}

impl From<ImageSize> for ContainerSize {
  fn from(size: ImageSize) -> Self {
    ContainerSize::new(size.width, size.height)
  }
}

impl std::str::FromStr for ContainerSize {
  type Err = String;

  /// 形如 `1280x720`
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (w, h) = s
      .split_once(['x', 'X'])
      .ok_or_else(|| format!("容器尺寸格式应为 WxH: {s}"))?;
    let width = w.trim().parse().map_err(|e| format!("宽度无效 {w}: {e}"))?;
    let height = h.trim().parse().map_err(|e| format!("高度无效 {h}: {e}"))?;
    Ok(ContainerSize::new(width, height))
  }
}

/// 容器内的像素矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayBox {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl DisplayBox {
  pub fn width(&self) -> i32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> i32 {
    self.y2 - self.y1
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
  pub x: i32,
  pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
  pub display: DisplayBox,
  pub anchor: Anchor,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unrenderable {
  #[error("容器尚未测量")]
  EmptyContainer,
  #[error("原始图像尺寸为零")]
  EmptyImage,
  #[error("检测结果没有边界框")]
  MissingBox,
  #[error("边界框坐标倒置")]
  InvertedBox,
}

/// 图像以 contain 方式放入容器后的尺寸与偏移
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fit {
  pub displayed_width: f64,
  pub displayed_height: f64,
  pub offset_x: f64,
  pub offset_y: f64,
  pub scale: f64,
}

impl Fit {
  pub fn contain(image: &ImageSize, container: &ContainerSize) -> Result<Fit, Unrenderable> {
    if container.is_empty() {
      return Err(Unrenderable::EmptyContainer);
    }
    if image.width == 0 || image.height == 0 {
      return Err(Unrenderable::EmptyImage);
    }

    let (iw, ih) = (image.width as f64, image.height as f64);
    let (cw, ch) = (container.width as f64, container.height as f64);
    let image_aspect = iw / ih;
    let container_aspect = cw / ch;

    let (displayed_width, displayed_height, offset_x, offset_y) = if image_aspect > container_aspect {
      // 图片较宽，上下留边
      let dh = cw / image_aspect;
      (cw, dh, 0.0, (ch - dh) / 2.0)
    } else {
      let dw = ch * image_aspect;
      (dw, ch, (cw - dw) / 2.0, 0.0)
    };

    Ok(Fit {
      displayed_width,
      displayed_height,
      offset_x,
      offset_y,
      scale: displayed_width / iw,
    })
  }

  fn place(&self, x: f64, y: f64) -> (i32, i32) {
    (
      round_half_up(x * self.scale + self.offset_x),
      round_half_up(y * self.scale + self.offset_y),
    )
  }
}

fn round_half_up(v: f64) -> i32 {
  (v + 0.5).floor() as i32
}

/// 规范坐标到原始像素坐标
pub fn to_original_pixels(b: &CanonicalBox, image: &ImageSize) -> [f64; 4] {
  let (w, h) = (image.width as f64, image.height as f64);
  [
    b.x1 / CANONICAL_EXTENT * w,
    b.y1 / CANONICAL_EXTENT * h,
    b.x2 / CANONICAL_EXTENT * w,
    b.y2 / CANONICAL_EXTENT * h,
  ]
}

/// 纯函数，每次渲染都可以调用
pub fn project(
  canonical: Option<&CanonicalBox>,
  image: &ImageSize,
  container: &ContainerSize,
) -> Result<Projection, Unrenderable> {
  let canonical = canonical.ok_or(Unrenderable::MissingBox)?;
  let fit = Fit::contain(image, container)?;
  if canonical.is_inverted() {
    return Err(Unrenderable::InvertedBox);
  }

  let [ox1, oy1, ox2, oy2] = to_original_pixels(canonical, image);
  let (x1, y1) = fit.place(ox1, oy1);
  let (x2, y2) = fit.place(ox2, oy2);
  let display = DisplayBox { x1, y1, x2, y2 };

  let anchor = Anchor {
    x: round_half_up((x1 + x2) as f64 / 2.0),
    y: round_half_up((y1 + y2) as f64 / 2.0),
  };

  Ok(Projection { display, anchor })
}
