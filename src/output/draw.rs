// 该文件是 Kanwu （看物） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage, imageops};
use imageproc::drawing::{draw_text_mut, text_size};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  detection::{Color, Detection},
  output::Scene,
  projector::{DisplayBox, Fit, project},
};

const BACKGROUND: Rgb<u8> = Rgb([0x2d, 0x2d, 0x2d]);
const BORDER_THICKNESS: i32 = 2;
/// 框内底色透明度
const BOX_SHADING_ALPHA: u8 = 0x1a;
/// 标签底色透明度
const LABEL_SHADING_ALPHA: u8 = 0xdd;
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_PADDING: i32 = 6;
const LINE_SPACING: i32 = 2;
const GLYPH_SIZE: i32 = 8;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(String),
}

/// 标签字体：TrueType 字体或内置点阵字体
pub enum LabelFont {
  Vector(FontVec),
  Bitmap,
}

impl LabelFont {
  pub fn load(path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data)
      .map_err(|e| DrawError::InvalidFont(format!("{}: {}", path.display(), e)))?;
    info!("载入字体: {}", path.display());
    Ok(LabelFont::Vector(font))
  }

  fn text_size(&self, text: &str, font_size: f32) -> (i32, i32) {
    match self {
      LabelFont::Vector(font) => {
        let (w, h) = text_size(PxScale::from(font_size), font, text);
        (w as i32, h as i32)
      }
      LabelFont::Bitmap => {
        let scale = bitmap_scale(font_size);
        (
          text.chars().count() as i32 * GLYPH_SIZE * scale,
          GLYPH_SIZE * scale,
        )
      }
    }
  }

  fn draw_text(&self, canvas: &mut RgbImage, color: Color, x: i32, y: i32, text: &str, font_size: f32) {
    match self {
      LabelFont::Vector(font) => {
        let [r, g, b, _] = color.0;
        draw_text_mut(canvas, Rgb([r, g, b]), x, y, PxScale::from(font_size), font, text);
      }
      LabelFont::Bitmap => draw_bitmap_text(canvas, color, x, y, text, bitmap_scale(font_size)),
    }
  }
}

fn bitmap_scale(font_size: f32) -> i32 {
  ((font_size / GLYPH_SIZE as f32).round() as i32).max(1)
}

fn draw_bitmap_text(canvas: &mut RgbImage, color: Color, x: i32, y: i32, text: &str, scale: i32) {
  let mut cursor_x = x;
  for ch in text.chars() {
    let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
      cursor_x += GLYPH_SIZE * scale;
      continue;
    };
    for (row_idx, row) in glyph.iter().enumerate() {
      for col_idx in 0..GLYPH_SIZE {
        if (row >> col_idx) & 1 == 0 {
          continue;
        }
        let px = cursor_x + col_idx * scale;
        let py = y + row_idx as i32 * scale;
        fill_rect(canvas, px, py, scale, scale, color);
      }
    }
    cursor_x += GLYPH_SIZE * scale;
  }
}

fn blend(dst: Rgb<u8>, color: Color) -> Rgb<u8> {
  let [r, g, b, a] = color.0;
  let a = a as u32;
  let mix = |d: u8, s: u8| ((s as u32 * a + d as u32 * (255 - a) + 127) / 255) as u8;
  Rgb([mix(dst[0], r), mix(dst[1], g), mix(dst[2], b)])
}

/// 按 alpha 混合填充矩形，超出画布部分裁掉
fn fill_rect(canvas: &mut RgbImage, x: i32, y: i32, width: i32, height: i32, color: Color) {
  let (cw, ch) = (canvas.width() as i32, canvas.height() as i32);
  let (x0, y0) = (x.max(0), y.max(0));
  let (x1, y1) = ((x + width).min(cw), (y + height).min(ch));
  for py in y0..y1 {
    for px in x0..x1 {
      let pixel = canvas.get_pixel_mut(px as u32, py as u32);
      *pixel = blend(*pixel, color);
    }
  }
}

fn stroke_rect(canvas: &mut RgbImage, x: i32, y: i32, width: i32, height: i32, color: Color) {
  let t = BORDER_THICKNESS;
  fill_rect(canvas, x, y, width, t, color);
  fill_rect(canvas, x, y + height - t, width, t, color);
  fill_rect(canvas, x, y + t, t, height - 2 * t, color);
  fill_rect(canvas, x + width - t, y + t, t, height - 2 * t, color);
}

pub struct Draw {
  font: LabelFont,
  font_size: f32,
}

impl Default for Draw {
  fn default() -> Self {
    Draw {
      font: LabelFont::Bitmap,
      font_size: LABEL_FONT_SIZE,
    }
  }
}

impl Draw {
  pub fn new(font: LabelFont, font_size: f32) -> Self {
    Draw { font, font_size }
  }

  /// `--font` 未指定时使用点阵字体
  pub fn from_font_path(path: Option<&Path>) -> Result<Self, DrawError> {
    let font = match path {
      Some(path) => LabelFont::load(path)?,
      None => LabelFont::Bitmap,
    };
    Ok(Draw::new(font, LABEL_FONT_SIZE))
  }

  /// 按 contain 方式把图像放入画布，再叠加检测框和标签
  pub fn draw_scene(&self, scene: &Scene) -> RgbImage {
    let container = scene.container;
    let mut canvas = RgbImage::from_pixel(container.width, container.height, BACKGROUND);

    let fit = match Fit::contain(&scene.image.size(), &container) {
      Ok(fit) => fit,
      Err(reason) => {
        debug!("无法放置图像: {}", reason);
        return canvas;
      }
    };
    let width = (fit.displayed_width.round() as u32).max(1);
    let height = (fit.displayed_height.round() as u32).max(1);
    let resized = imageops::resize(
      scene.image.pixels(),
      width,
      height,
      imageops::FilterType::Triangle,
    );
    imageops::overlay(
      &mut canvas,
      &resized,
      fit.offset_x.round() as i64,
      fit.offset_y.round() as i64,
    );

    for detection in scene.detections {
      self.draw_detection(&mut canvas, detection, scene);
    }
    canvas
  }

  fn draw_detection(&self, canvas: &mut RgbImage, detection: &Detection, scene: &Scene) {
    let projection = match project(
      detection.box_2d.as_ref(),
      &detection.image_size,
      &scene.container,
    ) {
      Ok(projection) => projection,
      Err(reason) => {
        debug!("跳过 {}: {}", detection.id, reason);
        return;
      }
    };

    let style = detection.style;
    let DisplayBox { x1, y1, .. } = projection.display;
    let (w, h) = (projection.display.width(), projection.display.height());
    fill_rect(canvas, x1, y1, w, h, style.shading_color.with_alpha(BOX_SHADING_ALPHA));
    stroke_rect(canvas, x1, y1, w, h, style.border_color);

    let lines: Vec<&str> = [
      detection.label.english.as_str(),
      detection.label.phonetic.as_str(),
      detection.label.chinese.as_str(),
    ]
    .into_iter()
    .filter(|line| !line.is_empty())
    .collect();
    if lines.is_empty() {
      return;
    }

    let sizes: Vec<(i32, i32)> = lines
      .iter()
      .map(|line| self.font.text_size(line, self.font_size))
      .collect();
    let text_width = sizes.iter().map(|(w, _)| *w).max().unwrap_or_default();
    let text_height =
      sizes.iter().map(|(_, h)| *h).sum::<i32>() + LINE_SPACING * (sizes.len() as i32 - 1);

    let label_width = text_width + 2 * LABEL_PADDING;
    let label_height = text_height + 2 * LABEL_PADDING;
    let label_x = projection.anchor.x - label_width / 2;
    let label_y = projection.anchor.y - label_height / 2;

    fill_rect(
      canvas,
      label_x,
      label_y,
      label_width,
      label_height,
      style.shading_color.with_alpha(LABEL_SHADING_ALPHA),
    );
    stroke_rect(canvas, label_x, label_y, label_width, label_height, style.border_color);

    let mut y = label_y + LABEL_PADDING;
    for (line, (w, h)) in lines.iter().zip(&sizes) {
      let x = projection.anchor.x - w / 2;
      self.font.draw_text(canvas, style.text_color, x, y, line, self.font_size);
      y += h + LINE_SPACING;
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::{
    canonical::CanonicalBox,
    detection::{LabelInfo, LabelStyle},
    input::LoadedImage,
    projector::ContainerSize,
  };

  fn detection(box_2d: Option<CanonicalBox>, image: &LoadedImage) -> Detection {
    Detection {
      id: "label-0".into(),
      box_2d,
      label: LabelInfo::untranslated("cat"),
      style: LabelStyle::default(),
      image_size: image.shared_size(),
    }
  }

  #[test]
  fn image_is_letterboxed_into_container() {
    let image = LoadedImage::from_rgb(RgbImage::from_pixel(1000, 500, Rgb([255, 255, 255])));
    let scene = Scene::new(&image, &[], ContainerSize::new(400, 400));
    let canvas = Draw::default().draw_scene(&scene);

    assert_eq!(canvas.dimensions(), (400, 400));
    assert_eq!(*canvas.get_pixel(200, 50), BACKGROUND);
    assert_eq!(*canvas.get_pixel(200, 350), BACKGROUND);
    assert_eq!(*canvas.get_pixel(200, 150), Rgb([255, 255, 255]));
  }

  #[test]
  fn border_is_drawn_at_projected_box() {
    let image = LoadedImage::from_rgb(RgbImage::from_pixel(100, 100, Rgb([0, 0, 0])));
    let detections = [detection(Some(CanonicalBox::new(100.0, 100.0, 900.0, 900.0)), &image)];
    let scene = Scene::new(&image, &detections, ContainerSize::new(100, 100));
    let canvas = Draw::default().draw_scene(&scene);

    assert_eq!(*canvas.get_pixel(10, 50), Rgb([0xFF, 0x98, 0x00]));
    assert_eq!(*canvas.get_pixel(5, 50), Rgb([0, 0, 0]));
  }

  #[test]
  fn unrenderable_detections_are_skipped() {
    let image = LoadedImage::from_rgb(RgbImage::from_pixel(50, 50, Rgb([0, 0, 0])));
    let detections = [
      detection(None, &image),
      detection(Some(CanonicalBox::new(900.0, 0.0, 100.0, 1000.0)), &image),
      Detection {
        image_size: Arc::new(crate::projector::ImageSize::new(0, 0)),
        ..detection(Some(CanonicalBox::FULL_FRAME), &image)
      },
    ];
    let scene = Scene::new(&image, &detections, ContainerSize::new(50, 50));
    let canvas = Draw::default().draw_scene(&scene);
    assert!(canvas.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn blending_respects_alpha() {
    let white = Color::rgb(255, 255, 255);
    assert_eq!(blend(Rgb([0, 0, 0]), white), Rgb([255, 255, 255]));
    assert_eq!(blend(Rgb([0, 0, 0]), white.with_alpha(0)), Rgb([0, 0, 0]));
    assert_eq!(blend(Rgb([0, 0, 0]), white.with_alpha(0x80)), Rgb([128, 128, 128]));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    let result = Draw::from_font_path(Some(Path::new("/nonexistent/font.ttf")));
    assert!(matches!(result, Err(DrawError::IoError(_))));
  }
}
