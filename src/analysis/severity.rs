// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/analysis/severity.rs - 裂缝覆盖率与严重度评分
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

use serde::Serialize;

use crate::{analysis::AnalysisError, model::Detection};

const SEVERITY_MAX: f32 = 100.0;
const MEDIUM_RISK_FROM: f32 = 20.0;
const HIGH_RISK_FROM: f32 = 50.0;

/// 严重度评分策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeverityPolicy {
  /// `min(100, 覆盖率 * 平均置信度 * 10)`
  ConfidenceWeighted,
  /// `min(100, 覆盖率 * 2)`
  #[default]
  CoverageLinear,
}

impl SeverityPolicy {
  pub const ALL: [SeverityPolicy; 2] = [
    SeverityPolicy::ConfidenceWeighted,
    SeverityPolicy::CoverageLinear,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      SeverityPolicy::ConfidenceWeighted => "confidence-weighted",
      SeverityPolicy::CoverageLinear => "coverage-linear",
    }
  }

  /// 计算严重度，结果总在 `[0, 100]` 内
  pub fn score(&self, coverage_percent: f32, mean_confidence: f32) -> f32 {
    let raw = match self {
      SeverityPolicy::ConfidenceWeighted => coverage_percent * mean_confidence * 10.0,
      SeverityPolicy::CoverageLinear => coverage_percent * 2.0,
    };
    raw.clamp(0.0, SEVERITY_MAX)
  }
}

impl fmt::Display for SeverityPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for SeverityPolicy {
  type Err = AnalysisError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    SeverityPolicy::ALL
      .into_iter()
      .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| AnalysisError::Configuration(format!("未知的严重度策略: {}", s)))
  }
}

/// 风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskLevel {
  Low,
  Medium,
  High,
}

impl RiskLevel {
  pub fn from_score(severity: f32) -> Self {
    if severity >= HIGH_RISK_FROM {
      RiskLevel::High
    } else if severity >= MEDIUM_RISK_FROM {
      RiskLevel::Medium
    } else {
      RiskLevel::Low
    }
  }
}

impl fmt::Display for RiskLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      RiskLevel::Low => "Low",
      RiskLevel::Medium => "Medium",
      RiskLevel::High => "High",
    };
    f.write_str(name)
  }
}

/// 检测框面积之和占图像面积的百分比。
///
/// 重叠部分会被重复计入，这是有意保留的近似。
pub fn coverage_percent(detections: &[Detection], frame_area: u64) -> f32 {
  if detections.is_empty() || frame_area == 0 {
    return 0.0;
  }
  let total: u64 = detections.iter().map(Detection::area).sum();
  (100.0 * total as f64 / frame_area as f64) as f32
}

pub fn mean_confidence(detections: &[Detection]) -> f32 {
  if detections.is_empty() {
    return 0.0;
  }
  let sum: f64 = detections.iter().map(|d| d.score() as f64).sum();
  (sum / detections.len() as f64) as f32
}

pub fn max_confidence(detections: &[Detection]) -> f32 {
  detections
    .iter()
    .map(Detection::score)
    .fold(0.0, f32::max)
}
