// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  analysis::AnalysisResult,
  frame::SourcedFrame,
  output::{
    Render,
    draw::{AnalysisRecord, Draw},
  },
  utils::{file_stem, url_to_path},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 一帧写出的三个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPaths {
  pub heatmap: PathBuf,
  pub annotated: PathBuf,
  pub record: PathBuf,
}

/// 按日期分目录保存热力图、标注图与 JSON 分析记录
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(url_to_path(uri)).with_always(always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      draw: Draw::default(),
      frame_counter: AtomicU16::new(0),
      always: false,
    }
  }

  /// 没有保留检测框的帧也写出
  pub fn with_always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_base(&self, source: &Path) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{}-{:04X}",
      file_stem(source),
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  /// 写出一帧，未写出时返回 `None`
  pub fn record(
    &self,
    frame: &SourcedFrame,
    result: &AnalysisResult,
  ) -> Result<Option<RecordPaths>, DirectoryRecordOutputError> {
    if !self.always && result.kept.is_empty() {
      debug!("{} 没有检测框, 跳过记录", frame.path.display());
      return Ok(None);
    }

    let base = self.frame_base(&frame.path)?;
    let with_suffix = |suffix: &str| {
      let mut name = base.as_os_str().to_owned();
      name.push(suffix);
      PathBuf::from(name)
    };
    let paths = RecordPaths {
      heatmap: with_suffix("-heatmap.png"),
      annotated: with_suffix("-annotated.png"),
      record: with_suffix(".json"),
    };

    result.heatmap_overlay.save(&paths.heatmap)?;
    self
      .draw
      .draw_detection(&frame.frame, result.kept.as_ref())
      .save(&paths.annotated)?;
    AnalysisRecord::new(frame, result).write(&paths.record)?;
    info!("记录已写入: {}", paths.record.display());

    Ok(Some(paths))
  }
}

impl Render<SourcedFrame, AnalysisResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &SourcedFrame, result: &AnalysisResult) -> Result<(), Self::Error> {
    self.record(frame, result).map(|_| ())
  }
}
