// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/model.rs - 检测结果与检测器接口
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

use serde::Serialize;

use crate::analysis::AnalysisError;

/// 外部检测器。
///
/// 任何能对一帧图像给出裂缝框与置信度的组件都可以实现该接口。
/// 检测器由调用方显式构造并持有，分析器本身不持有任何检测器。
pub trait Detector {
  type Input;
  type Error;

  fn detect(&self, input: &Self::Input) -> Result<DetectResult, Self::Error>;
}

/// 单个检测框，构造后不可修改
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
  bbox: [i32; 4], // [x_min, y_min, x_max, y_max]，像素坐标，右/下边界不含
  score: f32,
}

impl Detection {
  pub fn new(bbox: [i32; 4], score: f32) -> Self {
    Self { bbox, score }
  }

  pub fn bbox(&self) -> [i32; 4] {
    self.bbox
  }

  pub fn score(&self) -> f32 {
    self.score
  }

  pub fn width(&self) -> u64 {
    (self.bbox[2] as i64 - self.bbox[0] as i64).max(0) as u64
  }

  pub fn height(&self) -> u64 {
    (self.bbox[3] as i64 - self.bbox[1] as i64).max(0) as u64
  }

  pub fn area(&self) -> u64 {
    self.width() * self.height()
  }

  /// 倒置的框或越界的置信度视为无效输入
  pub fn validate(&self) -> Result<(), AnalysisError> {
    let [x_min, y_min, x_max, y_max] = self.bbox;
    if x_max < x_min || y_max < y_min {
      return Err(AnalysisError::InvalidInput(format!(
        "检测框坐标倒置: ({}, {}, {}, {})",
        x_min, y_min, x_max, y_max
      )));
    }
    if !(0.0..=1.0).contains(&self.score) {
      return Err(AnalysisError::InvalidInput(format!(
        "置信度超出 [0, 1]: {}",
        self.score
      )));
    }
    Ok(())
  }

  /// 框有面积但与 `width x height` 的图像没有任何交集
  pub fn lies_outside(&self, width: u32, height: u32) -> bool {
    self.area() > 0 && self.clamp_to(width, height).area() == 0
  }

  /// 将框裁剪到 `width x height` 的图像范围内
  pub fn clamp_to(&self, width: u32, height: u32) -> Self {
    let (w, h) = (width.min(i32::MAX as u32) as i32, height.min(i32::MAX as u32) as i32);
    let bbox = [
      self.bbox[0].clamp(0, w),
      self.bbox[1].clamp(0, h),
      self.bbox[2].clamp(0, w),
      self.bbox[3].clamp(0, h),
    ];
    Self {
      bbox,
      score: self.score,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl AsRef<[Detection]> for DetectResult {
  fn as_ref(&self) -> &[Detection] {
    &self.items
  }
}
