// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/analysis.rs - 裂缝严重度分析
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

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::ImageFrame,
  model::{DetectResult, Detection},
};

mod colormap;
pub mod heatmap;
mod severity;

pub use self::colormap::ColorMap;
pub use self::heatmap::{HeatmapConfig, HeatmapNormalization};
pub use self::severity::{
  RiskLevel, SeverityPolicy, coverage_percent, max_confidence, mean_confidence,
};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
  #[error("无效输入: {0}")]
  InvalidInput(String),
  #[error("配置错误: {0}")]
  Configuration(String),
}

/// 单次分析的结果，每次调用都重新生成
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
  pub crack_coverage_percent: f32,
  pub severity_score: f32,
  pub risk_level: RiskLevel,
  pub policy: SeverityPolicy,
  /// 通过阈值过滤并裁剪到图像内的检测框
  pub kept: DetectResult,
  pub mean_confidence: f32,
  pub max_confidence: f32,
  #[serde(skip)]
  pub heatmap_overlay: RgbImage,
}

/// 严重度分析器。
///
/// 只持有不可变配置，可在多个线程间共享；每次调用独立分配全部缓冲区。
#[derive(Debug, Clone, PartialEq)]
pub struct SeverityAnalyzer {
  confidence_threshold: f32,
  policy: SeverityPolicy,
  heatmap: HeatmapConfig,
}

impl Default for SeverityAnalyzer {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      policy: SeverityPolicy::default(),
      heatmap: HeatmapConfig::default(),
    }
  }
}

impl SeverityAnalyzer {
  pub fn builder() -> SeverityAnalyzerBuilder {
    SeverityAnalyzerBuilder::default()
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn policy(&self) -> SeverityPolicy {
    self.policy
  }

  pub fn heatmap_config(&self) -> &HeatmapConfig {
    &self.heatmap
  }

  /// 对一帧及其检测结果做分析。
  ///
  /// 倒置的框与越界的置信度直接报错，超出图像的框被裁剪到图像内；
  /// 完全落在图像外的框被丢弃，不参与置信度统计。
  pub fn analyze(
    &self,
    frame: &ImageFrame,
    detections: &[Detection],
  ) -> Result<AnalysisResult, AnalysisError> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
      return Err(AnalysisError::InvalidInput(format!(
        "图像面积为零: {}x{}",
        width, height
      )));
    }
    for det in detections {
      det.validate()?;
    }

    let kept: Vec<Detection> = detections
      .iter()
      .filter(|d| d.score() >= self.confidence_threshold)
      .filter(|d| !d.lies_outside(width, height))
      .map(|d| d.clamp_to(width, height))
      .collect();
    debug!(
      "阈值 {:.2} 过滤后保留 {}/{} 个检测框",
      self.confidence_threshold,
      kept.len(),
      detections.len()
    );

    let coverage = coverage_percent(&kept, frame.area());
    let mean = mean_confidence(&kept);
    let severity = self.policy.score(coverage, mean);
    let risk_level = RiskLevel::from_score(severity);
    let heatmap_overlay = heatmap::render_overlay(frame, &kept, &self.heatmap);
    let max = max_confidence(&kept);

    Ok(AnalysisResult {
      crack_coverage_percent: coverage,
      severity_score: severity,
      risk_level,
      policy: self.policy,
      mean_confidence: mean,
      max_confidence: max,
      kept: DetectResult::from(kept),
      heatmap_overlay,
    })
  }
}

#[derive(Debug, Clone, Default)]
pub struct SeverityAnalyzerBuilder {
  inner: SeverityAnalyzer,
}

impl SeverityAnalyzerBuilder {
  pub fn confidence_threshold(mut self, threshold: f32) -> Self {
    self.inner.confidence_threshold = threshold;
    self
  }

  pub fn policy(mut self, policy: SeverityPolicy) -> Self {
    self.inner.policy = policy;
    self
  }

  pub fn kernel_size(mut self, kernel_size: u32) -> Self {
    self.inner.heatmap.kernel_size = kernel_size;
    self
  }

  pub fn alpha(mut self, alpha: f32) -> Self {
    self.inner.heatmap.alpha = alpha;
    self
  }

  pub fn normalization(mut self, normalization: HeatmapNormalization) -> Self {
    self.inner.heatmap.normalization = normalization;
    self
  }

  pub fn colormap(mut self, colormap: ColorMap) -> Self {
    self.inner.heatmap.colormap = colormap;
    self
  }

  pub fn heatmap(mut self, heatmap: HeatmapConfig) -> Self {
    self.inner.heatmap = heatmap;
    self
  }

  pub fn build(self) -> Result<SeverityAnalyzer, AnalysisError> {
    let threshold = self.inner.confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
      return Err(AnalysisError::Configuration(format!(
        "置信度阈值超出 [0, 1]: {}",
        threshold
      )));
    }
    self.inner.heatmap.validate()?;
    Ok(self.inner)
  }
}

impl FromUrlWithScheme for SeverityAnalyzerBuilder {
  const SCHEME: &'static str = "severity";
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AnalysisError> {
  value
    .trim()
    .parse()
    .map_err(|_| AnalysisError::Configuration(format!("参数 {} 的值无效: {}", key, value)))
}

impl FromUrl for SeverityAnalyzerBuilder {
  type Error = AnalysisError;

  /// `severity://?policy=coverage-linear&threshold=0.25&kernel=31&alpha=0.5&normalize=minmax&colormap=jet`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(AnalysisError::Configuration(format!(
        "期望配置方式 '{}', 实际配置方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = SeverityAnalyzerBuilder::default();
    for (key, value) in url.query_pairs() {
      builder = match &*key {
        "policy" => builder.policy(value.parse()?),
        "threshold" | "conf" => builder.confidence_threshold(parse_value(&key, &value)?),
        "kernel" => builder.kernel_size(parse_value(&key, &value)?),
        "alpha" => builder.alpha(parse_value(&key, &value)?),
        "normalize" => builder.normalization(value.parse()?),
        "colormap" => builder.colormap(value.parse()?),
        other => {
          warn!("忽略未知的分析参数: {}={}", other, value);
          builder
        }
      };
    }

    Ok(builder)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn frame(width: u32, height: u32) -> ImageFrame {
    ImageFrame::try_from(RgbImage::from_pixel(width, height, Rgb([90, 90, 90]))).unwrap()
  }

  fn analyzer(policy: SeverityPolicy) -> SeverityAnalyzer {
    SeverityAnalyzer::builder().policy(policy).build().unwrap()
  }

  #[test]
  fn single_box_scenario() {
    let frame = frame(100, 100);
    let dets = [Detection::new([10, 10, 60, 60], 0.8)];

    let linear = analyzer(SeverityPolicy::CoverageLinear)
      .analyze(&frame, &dets)
      .unwrap();
    assert_eq!(linear.crack_coverage_percent, 25.0);
    assert_eq!(linear.severity_score, 50.0);
    assert_eq!(linear.risk_level, RiskLevel::High);

    let weighted = analyzer(SeverityPolicy::ConfidenceWeighted)
      .analyze(&frame, &dets)
      .unwrap();
    assert_eq!(weighted.crack_coverage_percent, 25.0);
    assert_eq!(weighted.severity_score, 100.0);
    assert_eq!(weighted.risk_level, RiskLevel::High);
    assert_eq!(weighted.kept.len(), 1);
    assert_eq!(weighted.max_confidence, 0.8);
  }

  #[test]
  fn no_detections_is_low_risk() {
    for policy in SeverityPolicy::ALL {
      let result = analyzer(policy).analyze(&frame(32, 32), &[]).unwrap();
      assert_eq!(result.crack_coverage_percent, 0.0);
      assert_eq!(result.severity_score, 0.0);
      assert_eq!(result.risk_level, RiskLevel::Low);
      assert!(result.kept.is_empty());
    }
  }

  #[test]
  fn low_confidence_boxes_are_filtered() {
    let frame = frame(100, 100);
    let dets = [Detection::new([0, 0, 100, 100], 0.1)];
    let filtered = SeverityAnalyzer::default().analyze(&frame, &dets).unwrap();
    let empty = SeverityAnalyzer::default().analyze(&frame, &[]).unwrap();
    assert_eq!(filtered, empty);
  }

  #[test]
  fn threshold_is_inclusive() {
    let dets = [Detection::new([0, 0, 10, 10], 0.25)];
    let result = SeverityAnalyzer::default().analyze(&frame(20, 20), &dets).unwrap();
    assert_eq!(result.kept.len(), 1);
    assert_eq!(result.crack_coverage_percent, 25.0);
  }

  #[test]
  fn overlapping_boxes_double_count_coverage() {
    let dets = [
      Detection::new([0, 0, 50, 50], 0.9),
      Detection::new([25, 25, 75, 75], 0.9),
    ];
    let result = SeverityAnalyzer::default().analyze(&frame(100, 100), &dets).unwrap();
    assert_eq!(result.crack_coverage_percent, 50.0);
  }

  #[test]
  fn out_of_frame_boxes_are_clamped() {
    let dets = [Detection::new([-50, -50, 50, 50], 0.9)];
    let result = SeverityAnalyzer::default().analyze(&frame(100, 100), &dets).unwrap();
    assert_eq!(result.crack_coverage_percent, 25.0);
    assert_eq!(result.kept.items[0].bbox(), [0, 0, 50, 50]);
  }

  #[test]
  fn boxes_outside_the_frame_do_not_raise_risk() {
    let frame = frame(10, 10);
    let inside = Detection::new([0, 0, 10, 1], 0.3);
    let outside = Detection::new([20, 20, 30, 30], 1.0);
    let analyzer = analyzer(SeverityPolicy::ConfidenceWeighted);

    let alone = analyzer.analyze(&frame, &[inside]).unwrap();
    assert_eq!(alone.crack_coverage_percent, 10.0);
    assert_eq!(alone.risk_level, RiskLevel::Medium);

    let with_outside = analyzer.analyze(&frame, &[inside, outside]).unwrap();
    assert_eq!(with_outside, alone);
    assert_eq!(with_outside.kept.len(), 1);
    assert_eq!(with_outside.mean_confidence, 0.3);

    let only_outside = analyzer.analyze(&frame, &[outside]).unwrap();
    assert!(only_outside.kept.is_empty());
    assert_eq!(only_outside.mean_confidence, 0.0);
    assert_eq!(only_outside.max_confidence, 0.0);
  }

  #[test]
  fn inverted_boxes_are_rejected() {
    let dets = [
      Detection::new([0, 0, 10, 10], 0.9),
      Detection::new([60, 10, 50, 20], 0.9),
    ];
    let err = SeverityAnalyzer::default()
      .analyze(&frame(100, 100), &dets)
      .unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidInput(_)));
  }

  #[test]
  fn rejected_even_below_threshold() {
    let dets = [Detection::new([0, 0, 10, 10], 1.5)];
    let err = SeverityAnalyzer::builder()
      .confidence_threshold(1.0)
      .build()
      .unwrap()
      .analyze(&frame(10, 10), &dets)
      .unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidInput(_)));
  }

  #[test]
  fn heatmap_matches_frame_dimensions() {
    let dets = [Detection::new([3, 4, 30, 17], 0.7)];
    let result = SeverityAnalyzer::default().analyze(&frame(37, 21), &dets).unwrap();
    assert_eq!(result.heatmap_overlay.dimensions(), (37, 21));
  }

  #[test]
  fn analysis_is_deterministic() {
    let frame = frame(64, 64);
    let dets = [
      Detection::new([5, 5, 30, 40], 0.55),
      Detection::new([20, 10, 60, 25], 0.95),
      Detection::new([0, 50, 64, 64], 0.3),
    ];
    let analyzer = analyzer(SeverityPolicy::ConfidenceWeighted);
    let a = analyzer.analyze(&frame, &dets).unwrap();
    let b = analyzer.analyze(&frame, &dets).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn shared_analyzer_across_threads() {
    let analyzer = SeverityAnalyzer::default();
    let frames: Vec<ImageFrame> = (1..=4).map(|i| frame(16 * i, 16)).collect();
    std::thread::scope(|s| {
      let handles: Vec<_> = frames
        .iter()
        .map(|f| {
          let analyzer = &analyzer;
          s.spawn(move || analyzer.analyze(f, &[Detection::new([0, 0, 8, 8], 0.9)]))
        })
        .collect();
      for (handle, f) in handles.into_iter().zip(&frames) {
        let result = handle.join().unwrap().unwrap();
        assert_eq!(result.heatmap_overlay.dimensions(), f.dimensions());
      }
    });
  }

  #[test]
  fn builder_rejects_bad_threshold() {
    for threshold in [-0.01, 1.01, f32::NAN] {
      let err = SeverityAnalyzer::builder()
        .confidence_threshold(threshold)
        .build()
        .unwrap_err();
      assert!(matches!(err, AnalysisError::Configuration(_)));
    }
  }

  #[test]
  fn builder_from_url() {
    let url = Url::parse(
      "severity://?policy=confidence-weighted&threshold=0.4&kernel=15&alpha=0.4&normalize=clip&colormap=turbo&unknown=1",
    )
    .unwrap();
    let analyzer = SeverityAnalyzerBuilder::from_url(&url).unwrap().build().unwrap();
    assert_eq!(analyzer.policy(), SeverityPolicy::ConfidenceWeighted);
    assert_eq!(analyzer.confidence_threshold(), 0.4);
    assert_eq!(analyzer.heatmap_config().kernel_size, 15);
    assert_eq!(analyzer.heatmap_config().alpha, 0.4);
    assert_eq!(analyzer.heatmap_config().normalization, HeatmapNormalization::Clip);
    assert_eq!(analyzer.heatmap_config().colormap, ColorMap::Turbo);
  }

  #[test]
  fn builder_from_url_errors() {
    let wrong_scheme = Url::parse("image:///tmp/a.png").unwrap();
    assert!(SeverityAnalyzerBuilder::from_url(&wrong_scheme).is_err());

    let bad_policy = Url::parse("severity://?policy=quadratic").unwrap();
    assert!(matches!(
      SeverityAnalyzerBuilder::from_url(&bad_policy),
      Err(AnalysisError::Configuration(_))
    ));

    let bad_number = Url::parse("severity://?threshold=high").unwrap();
    assert!(matches!(
      SeverityAnalyzerBuilder::from_url(&bad_number),
      Err(AnalysisError::Configuration(_))
    ));
  }
}
