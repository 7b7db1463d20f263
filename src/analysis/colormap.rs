// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/analysis/colormap.rs - 热力图配色
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

use image::Rgb;
use serde::Serialize;

use crate::analysis::AnalysisError;

/// 由冷到热的配色方案
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMap {
  #[default]
  Jet,
  Turbo,
  Inferno,
  Grayscale,
}

impl ColorMap {
  pub const ALL: [ColorMap; 4] = [
    ColorMap::Jet,
    ColorMap::Turbo,
    ColorMap::Inferno,
    ColorMap::Grayscale,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      ColorMap::Jet => "jet",
      ColorMap::Turbo => "turbo",
      ColorMap::Inferno => "inferno",
      ColorMap::Grayscale => "grayscale",
    }
  }

  /// 将 `[0, 1]` 内的值映射为颜色，越界值先截断
  pub fn apply(&self, value: f32) -> Rgb<u8> {
    let t = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };

    let (r, g, b) = match self {
      ColorMap::Jet => jet(t),
      ColorMap::Turbo => turbo(t),
      ColorMap::Inferno => inferno(t),
      ColorMap::Grayscale => (t, t, t),
    };

    Rgb([to_u8(r), to_u8(g), to_u8(b)])
  }
}

fn to_u8(v: f32) -> u8 {
  (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

// 深蓝 -> 青 -> 黄 -> 深红
fn jet(t: f32) -> (f32, f32, f32) {
  let r = 1.5 - (4.0 * t - 3.0).abs();
  let g = 1.5 - (4.0 * t - 2.0).abs();
  let b = 1.5 - (4.0 * t - 1.0).abs();
  (r, g, b)
}

// 近似 Turbo: 蓝 -> 青 -> 绿 -> 黄 -> 红
fn turbo(t: f32) -> (f32, f32, f32) {
  let r = (6.0 * t - 3.0) * t * t + 0.2 * t;
  let g = -4.0 * (t - 0.5).powi(2) + 1.0;
  let b = (-6.0 * t + 3.0) * (1.0 - t);
  (r, g, b)
}

// 近似 Inferno: 黑 -> 暗红 -> 橙 -> 黄
fn inferno(t: f32) -> (f32, f32, f32) {
  let r = (3.5 * t - 1.0) * t + 0.05;
  let g = ((4.0 * t - 3.5) * t + 0.5) * t;
  let b = (10.0 * t - 7.0) * t + 0.1;
  (r, g, b)
}

impl fmt::Display for ColorMap {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for ColorMap {
  type Err = AnalysisError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ColorMap::ALL
      .into_iter()
      .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| AnalysisError::Configuration(format!("未知的配色方案: {}", s)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn jet_runs_cold_to_hot() {
    let cold = ColorMap::Jet.apply(0.0);
    let hot = ColorMap::Jet.apply(1.0);
    assert_eq!(cold, Rgb([0, 0, 128]));
    assert_eq!(hot, Rgb([128, 0, 0]));
    assert_eq!(ColorMap::Jet.apply(0.5), Rgb([128, 255, 128]));
  }

  #[test]
  fn grayscale_is_linear() {
    assert_eq!(ColorMap::Grayscale.apply(0.0), Rgb([0, 0, 0]));
    assert_eq!(ColorMap::Grayscale.apply(1.0), Rgb([255, 255, 255]));
  }

  #[test]
  fn out_of_range_values_are_clamped() {
    for map in ColorMap::ALL {
      assert_eq!(map.apply(-3.0), map.apply(0.0));
      assert_eq!(map.apply(7.0), map.apply(1.0));
      assert_eq!(map.apply(f32::NAN), map.apply(0.0));
    }
  }

  #[test]
  fn names_round_trip_through_from_str() {
    for map in ColorMap::ALL {
      assert_eq!(map.name().parse::<ColorMap>().unwrap(), map);
    }
    assert!("rainbow".parse::<ColorMap>().is_err());
  }
}
