// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/task.rs - 分析任务
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

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{info, warn};

use crate::{
  analysis::{AnalysisResult, RiskLevel, SeverityAnalyzer},
  frame::ImageFrame,
  model::Detector,
  output::Render,
};

pub trait Task<I, D, O>: Sized {
  type Error;
  fn run_task(
    self,
    input: I,
    detector: D,
    analyzer: &SeverityAnalyzer,
    output: O,
  ) -> Result<TaskSummary, Self::Error>;
}

/// 任务结束时的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSummary {
  pub frames: usize,
  pub detections: usize,
  pub risk_counts: BTreeMap<RiskLevel, usize>,
  pub max_severity: f32,
}

impl TaskSummary {
  fn add(&mut self, result: &AnalysisResult) {
    self.frames += 1;
    self.detections += result.kept.len();
    *self.risk_counts.entry(result.risk_level).or_default() += 1;
    self.max_severity = self.max_severity.max(result.severity_score);
  }

  pub fn count(&self, risk: RiskLevel) -> usize {
    self.risk_counts.get(&risk).copied().unwrap_or(0)
  }

  fn log(&self) {
    info!(
      "共处理 {} 帧, 保留 {} 个检测框, 最高严重度 {:.1}",
      self.frames, self.detections, self.max_severity
    );
    info!(
      "风险分布: Low {} / Medium {} / High {}",
      self.count(RiskLevel::Low),
      self.count(RiskLevel::Medium),
      self.count(RiskLevel::High)
    );
  }
}

fn process_frame<F, D, O>(
  frame: &F,
  detector: &D,
  analyzer: &SeverityAnalyzer,
  output: &O,
) -> anyhow::Result<AnalysisResult>
where
  F: AsRef<ImageFrame>,
  D: Detector<Input = F>,
  D::Error: std::error::Error + Sync + Send + 'static,
  O: Render<F, AnalysisResult>,
  O::Error: std::error::Error + Sync + Send + 'static,
{
  let now = Instant::now();
  let detections = detector.detect(frame)?;
  let detected = now.elapsed();
  let result = analyzer.analyze(frame.as_ref(), detections.as_ref())?;
  let analysed = now.elapsed();
  output.render_result(frame, &result)?;
  info!(
    "覆盖率 {:.2}%, 严重度 {:.1}, 风险 {}, 耗时: {:.2?} / {:.2?} / {:.2?}",
    result.crack_coverage_percent,
    result.severity_score,
    result.risk_level,
    detected,
    analysed,
    now.elapsed()
  );
  Ok(result)
}

pub struct OneShotTask;

impl<
  F: AsRef<ImageFrame>,
  DE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  D: Detector<Input = F, Error = DE>,
  O: Render<F, AnalysisResult, Error = RE>,
> Task<I, D, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    detector: D,
    analyzer: &SeverityAnalyzer,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始分析...");
    let result = process_frame(&frame, &detector, analyzer, &output)?;

    let mut summary = TaskSummary::default();
    summary.add(&result);
    summary.log();
    Ok(summary)
  }
}

#[derive(Default, Debug)]
pub struct BatchTask {
  frame_number: Option<usize>,
  interruptible: bool,
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static INTERRUPT_HANDLER: OnceLock<Result<(), String>> = OnceLock::new();

/// 进程内只安装一次 Ctrl-C 处理，之后的调用复用同一个标志
fn install_interrupt_handler() -> anyhow::Result<()> {
  INTERRUPT_HANDLER
    .get_or_init(|| {
      ctrlc::set_handler(|| {
        info!("收到中断信号，准备退出...");
        INTERRUPTED.store(true, Ordering::SeqCst);
      })
      .map_err(|e| e.to_string())
    })
    .clone()
    .map_err(|e| anyhow::anyhow!("安装中断处理失败: {}", e))
}

impl BatchTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 收到 Ctrl-C 后在当前帧结束时退出。
  ///
  /// 处理函数在进程内只安装一次，可以依次运行多个可中断的任务；
  /// 每个任务开始时清除之前残留的信号。
  pub fn with_interrupt(mut self, interruptible: bool) -> Self {
    self.interruptible = interruptible;
    self
  }
}

impl<
  F: AsRef<ImageFrame>,
  DE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  D: Detector<Input = F, Error = DE>,
  O: Render<F, AnalysisResult, Error = RE>,
> Task<I, D, O> for BatchTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    detector: D,
    analyzer: &SeverityAnalyzer,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    if self.interruptible {
      install_interrupt_handler()?;
      INTERRUPTED.store(false, Ordering::SeqCst);
    }

    let mut summary = TaskSummary::default();
    for (index, frame) in input.enumerate() {
      info!("处理第 {} 帧图像", index + 1);
      let result = process_frame(&frame, &detector, analyzer, &output)?;
      summary.add(&result);

      if self.frame_number.map(|n| summary.frames >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", summary.frames);
        break;
      }
      if self.interruptible && INTERRUPTED.swap(false, Ordering::SeqCst) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    summary.log();
    info!("任务完成，退出");
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectResult, Detection};
  use image::RgbImage;
  use std::cell::RefCell;
  use std::convert::Infallible;

  struct FixedDetector(Vec<Detection>);

  impl Detector for FixedDetector {
    type Input = ImageFrame;
    type Error = Infallible;

    fn detect(&self, _input: &ImageFrame) -> Result<DetectResult, Infallible> {
      Ok(DetectResult::from(self.0.clone()))
    }
  }

  #[derive(Default)]
  struct Collect(RefCell<Vec<AnalysisResult>>);

  impl Render<ImageFrame, AnalysisResult> for &Collect {
    type Error = Infallible;

    fn render_result(&self, _frame: &ImageFrame, result: &AnalysisResult) -> Result<(), Infallible> {
      self.0.borrow_mut().push(result.clone());
      Ok(())
    }
  }

  fn frames(n: usize) -> Vec<ImageFrame> {
    (0..n)
      .map(|_| ImageFrame::try_from(RgbImage::new(100, 100)).unwrap())
      .collect()
  }

  #[test]
  fn one_shot_uses_first_frame_only() {
    let collect = Collect::default();
    let detector = FixedDetector(vec![Detection::new([10, 10, 60, 60], 0.8)]);
    let summary = OneShotTask
      .run_task(
        frames(3).into_iter(),
        detector,
        &SeverityAnalyzer::default(),
        &collect,
      )
      .unwrap();
    assert_eq!(summary.frames, 1);
    assert_eq!(summary.count(RiskLevel::High), 1);
    assert_eq!(collect.0.borrow().len(), 1);
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let collect = Collect::default();
    let result = OneShotTask.run_task(
      frames(0).into_iter(),
      FixedDetector(vec![]),
      &SeverityAnalyzer::default(),
      &collect,
    );
    assert!(result.is_err());
  }

  #[test]
  fn batch_respects_frame_limit() {
    let collect = Collect::default();
    let detector = FixedDetector(vec![Detection::new([0, 0, 10, 10], 0.9)]);
    let summary = BatchTask::default()
      .with_frame_number(Some(2))
      .run_task(
        frames(5).into_iter(),
        detector,
        &SeverityAnalyzer::default(),
        &collect,
      )
      .unwrap();
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.detections, 2);
    assert_eq!(summary.count(RiskLevel::Low), 2);
    assert_eq!(summary.max_severity, 2.0);
    assert_eq!(collect.0.borrow().len(), 2);
  }

  #[test]
  fn batch_stops_on_invalid_detections() {
    let collect = Collect::default();
    let detector = FixedDetector(vec![Detection::new([10, 10, 0, 0], 0.9)]);
    let result = BatchTask::default().run_task(
      frames(2).into_iter(),
      detector,
      &SeverityAnalyzer::default(),
      &collect,
    );
    assert!(result.is_err());
    assert!(collect.0.borrow().is_empty());
  }

  #[test]
  fn interruptible_batches_can_run_back_to_back() {
    for _ in 0..2 {
      let collect = Collect::default();
      let detector = FixedDetector(vec![Detection::new([0, 0, 10, 10], 0.9)]);
      let summary = BatchTask::default()
        .with_interrupt(true)
        .run_task(
          frames(3).into_iter(),
          detector,
          &SeverityAnalyzer::default(),
          &collect,
        )
        .unwrap();
      assert_eq!(summary.frames, 3);
      assert_eq!(collect.0.borrow().len(), 3);
    }
  }
}
