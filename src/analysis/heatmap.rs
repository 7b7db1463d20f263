// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/analysis/heatmap.rs - 置信度热力图
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

use std::{fmt, str::FromStr};

use image::{ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use serde::Serialize;

use crate::{
  analysis::{AnalysisError, ColorMap},
  frame::ImageFrame,
  model::Detection,
};

pub const DEFAULT_KERNEL_SIZE: u32 = 31;
pub const DEFAULT_ALPHA: f32 = 0.5;

const RANGE_EPSILON: f32 = 1e-6;

/// 单通道浮点热力场
pub type HeatField = ImageBuffer<Luma<f32>, Vec<f32>>;

/// 累加后、模糊前的归一化方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatmapNormalization {
  /// 截断到 `[0, 1]`，重叠区域会饱和
  Clip,
  /// 线性拉伸到 `[0, 1]`，与置信度量纲无关
  #[default]
  MinMax,
}

impl HeatmapNormalization {
  pub fn name(&self) -> &'static str {
    match self {
      HeatmapNormalization::Clip => "clip",
      HeatmapNormalization::MinMax => "minmax",
    }
  }
}

impl fmt::Display for HeatmapNormalization {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for HeatmapNormalization {
  type Err = AnalysisError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "clip" => Ok(HeatmapNormalization::Clip),
      "minmax" | "min-max" => Ok(HeatmapNormalization::MinMax),
      other => Err(AnalysisError::Configuration(format!(
        "未知的归一化方式: {}",
        other
      ))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatmapConfig {
  /// 高斯核边长，须为奇数；0 或 1 表示不做模糊
  pub kernel_size: u32,
  /// 叠加不透明度
  pub alpha: f32,
  pub normalization: HeatmapNormalization,
  pub colormap: ColorMap,
}

impl Default for HeatmapConfig {
  fn default() -> Self {
    Self {
      kernel_size: DEFAULT_KERNEL_SIZE,
      alpha: DEFAULT_ALPHA,
      normalization: HeatmapNormalization::default(),
      colormap: ColorMap::default(),
    }
  }
}

impl HeatmapConfig {
  pub fn validate(&self) -> Result<(), AnalysisError> {
    if self.kernel_size > 1 && self.kernel_size % 2 == 0 {
      return Err(AnalysisError::Configuration(format!(
        "高斯核边长必须为奇数: {}",
        self.kernel_size
      )));
    }
    if !(0.0..=1.0).contains(&self.alpha) {
      return Err(AnalysisError::Configuration(format!(
        "叠加不透明度超出 [0, 1]: {}",
        self.alpha
      )));
    }
    Ok(())
  }

  /// 由核边长推出 sigma，与 OpenCV 在 sigma 为 0 时的取法一致
  pub fn sigma(&self) -> Option<f32> {
    if self.kernel_size <= 1 {
      return None;
    }
    let k = self.kernel_size as f32;
    Some(0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8)
  }
}

/// 在零初始化的热力场上，把每个框的置信度累加到框内所有像素。
///
/// 框须已裁剪到图像范围内。
pub fn accumulate(width: u32, height: u32, detections: &[Detection]) -> HeatField {
  let mut field = HeatField::new(width, height);

  for det in detections {
    let [x_min, y_min, x_max, y_max] = det.bbox();
    let score = det.score();
    for y in y_min.max(0) as u32..(y_max.max(0) as u32).min(height) {
      for x in x_min.max(0) as u32..(x_max.max(0) as u32).min(width) {
        field.get_pixel_mut(x, y)[0] += score;
      }
    }
  }

  field
}

pub fn normalize(field: &mut HeatField, normalization: HeatmapNormalization) {
  match normalization {
    HeatmapNormalization::Clip => {
      for p in field.pixels_mut() {
        p[0] = p[0].clamp(0.0, 1.0);
      }
    }
    HeatmapNormalization::MinMax => {
      let (min, max) = field
        .pixels()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
          (lo.min(p[0]), hi.max(p[0]))
        });
      let range = max - min;
      for p in field.pixels_mut() {
        p[0] = if range > RANGE_EPSILON {
          (p[0] - min) / range
        } else if max > 0.0 {
          // 整幅图被同一强度覆盖
          1.0
        } else {
          0.0
        };
      }
    }
  }
}

pub fn smooth(field: &HeatField, config: &HeatmapConfig) -> HeatField {
  match config.sigma() {
    Some(sigma) => gaussian_blur_f32(field, sigma),
    None => field.clone(),
  }
}

pub fn colorize(field: &HeatField, colormap: ColorMap) -> RgbImage {
  ImageBuffer::from_fn(field.width(), field.height(), |x, y| {
    colormap.apply(field.get_pixel(x, y)[0])
  })
}

/// `(1 - alpha) * base + alpha * overlay`，两图尺寸须一致
pub fn composite(base: &RgbImage, overlay: &RgbImage, alpha: f32) -> RgbImage {
  let alpha = alpha.clamp(0.0, 1.0);
  ImageBuffer::from_fn(base.width(), base.height(), |x, y| {
    let b = base.get_pixel(x, y);
    let o = overlay.get_pixel(x, y);
    let mix = |i: usize| ((1.0 - alpha) * b[i] as f32 + alpha * o[i] as f32).round() as u8;
    Rgb([mix(0), mix(1), mix(2)])
  })
}

/// 生成叠加在原图上的热力图，原图不被修改
pub fn render_overlay(
  frame: &ImageFrame,
  detections: &[Detection],
  config: &HeatmapConfig,
) -> RgbImage {
  let (width, height) = frame.dimensions();
  let mut field = accumulate(width, height, detections);
  normalize(&mut field, config.normalization);
  let field = smooth(&field, config);
  let colored = colorize(&field, config.colormap);
  composite(frame.as_rgb_image(), &colored, config.alpha)
}
