// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/detector/label_file.rs - 从 YOLO 标注文件读取检测结果
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

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::SourcedFrame,
  model::{DetectResult, Detection, Detector},
  utils::{file_stem, url_to_path},
};

#[derive(Error, Debug)]
pub enum LabelFileError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("标注路径不存在: {0}")]
  NotFound(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标注文件 {path} 第 {line} 行格式错误: {reason}")]
  Parse {
    path: PathBuf,
    line: usize,
    reason: String,
  },
}

#[derive(Debug, Clone)]
enum LabelSource {
  /// 所有帧共用同一个标注文件
  File(PathBuf),
  /// 按图像文件名查找 `<dir>/<stem>.txt`
  Directory(PathBuf),
}

/// 读取 YOLO 格式标注的检测器。
///
/// 每行为 `class cx cy w h [conf]`，坐标按图像宽高归一化；缺省置信度为 1.0。
#[derive(Debug, Clone)]
pub struct LabelFileDetector {
  source: LabelSource,
}

impl FromUrlWithScheme for LabelFileDetector {
  const SCHEME: &'static str = "labels";
}

impl FromUrl for LabelFileDetector {
  type Error = LabelFileError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(LabelFileError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = url_to_path(url);
    let source = if path.is_dir() {
      LabelSource::Directory(path)
    } else if path.is_file() {
      LabelSource::File(path)
    } else {
      return Err(LabelFileError::NotFound(path));
    };

    Ok(Self { source })
  }
}

impl LabelFileDetector {
  pub fn with_file(path: impl Into<PathBuf>) -> Self {
    Self {
      source: LabelSource::File(path.into()),
    }
  }

  pub fn with_directory(path: impl Into<PathBuf>) -> Self {
    Self {
      source: LabelSource::Directory(path.into()),
    }
  }

  fn label_path(&self, image_path: &Path) -> PathBuf {
    match &self.source {
      LabelSource::File(path) => path.clone(),
      LabelSource::Directory(dir) => dir.join(format!("{}.txt", file_stem(image_path))),
    }
  }
}

impl Detector for LabelFileDetector {
  type Input = SourcedFrame;
  type Error = LabelFileError;

  fn detect(&self, input: &Self::Input) -> Result<DetectResult, Self::Error> {
    let path = self.label_path(&input.path);
    if matches!(self.source, LabelSource::Directory(_)) && !path.exists() {
      // 没有标注文件即没有裂缝
      debug!("未找到标注文件 {}, 视为无检测", path.display());
      return Ok(DetectResult::default());
    }

    let text = std::fs::read_to_string(&path)?;
    let (width, height) = input.frame.dimensions();
    let items = parse_yolo_labels(&text, width, height).map_err(|(line, reason)| {
      LabelFileError::Parse {
        path: path.clone(),
        line,
        reason,
      }
    })?;
    debug!("从 {} 读取 {} 个检测框", path.display(), items.len());

    Ok(DetectResult::from(items))
  }
}

/// 解析 YOLO 标注文本并换算为像素坐标。
///
/// 出错时返回 `(行号, 原因)`，行号从 1 开始；空行和 `#` 开头的行被跳过。
pub fn parse_yolo_labels(
  text: &str,
  width: u32,
  height: u32,
) -> Result<Vec<Detection>, (usize, String)> {
  let (w, h) = (width as f32, height as f32);
  let mut items = Vec::new();

  for (index, line) in text.lines().enumerate() {
    let line_no = index + 1;
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 5 && fields.len() != 6 {
      return Err((line_no, format!("期望 5 或 6 列, 实际 {} 列", fields.len())));
    }

    let _class: u32 = fields[0]
      .parse()
      .map_err(|_| (line_no, format!("类别编号无效: {}", fields[0])))?;
    let mut values = [0.0f32; 5];
    values[4] = 1.0;
    for (slot, field) in values.iter_mut().zip(&fields[1..]) {
      *slot = field
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| (line_no, format!("数值无效: {}", field)))?;
    }

    let [cx, cy, bw, bh, score] = values;
    if bw < 0.0 || bh < 0.0 {
      return Err((line_no, format!("宽高不能为负: {} {}", bw, bh)));
    }

    let bbox = [
      ((cx - bw / 2.0) * w).round() as i32,
      ((cy - bh / 2.0) * h).round() as i32,
      ((cx + bw / 2.0) * w).round() as i32,
      ((cy + bh / 2.0) * h).round() as i32,
    ];
    items.push(Detection::new(bbox, score));
  }

  Ok(items)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::ImageFrame;
  use image::RgbImage;

  #[test]
  fn full_frame_label_covers_everything() {
    let dets = parse_yolo_labels("0 0.5 0.5 1.0 1.0\n", 640, 480).unwrap();
    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].bbox(), [0, 0, 640, 480]);
    assert_eq!(dets[0].score(), 1.0);
  }

  #[test]
  fn optional_confidence_column() {
    let text = "# crack labels\n\n0 0.35 0.35 0.5 0.5 0.8\n";
    let dets = parse_yolo_labels(text, 100, 100).unwrap();
    assert_eq!(dets[0].bbox(), [10, 10, 60, 60]);
    assert_eq!(dets[0].score(), 0.8);
  }

  #[test]
  fn malformed_lines_report_line_numbers() {
    let (line, _) = parse_yolo_labels("0 0.5 0.5 1 1\n0 0.5 0.5\n", 10, 10).unwrap_err();
    assert_eq!(line, 2);
    let (line, _) = parse_yolo_labels("crack 0.5 0.5 1 1", 10, 10).unwrap_err();
    assert_eq!(line, 1);
    let (line, _) = parse_yolo_labels("0 0.5 0.5 nan 1", 10, 10).unwrap_err();
    assert_eq!(line, 1);
    let (line, _) = parse_yolo_labels("0 0.5 0.5 -0.2 1", 10, 10).unwrap_err();
    assert_eq!(line, 1);
  }

  #[test]
  fn directory_source_without_label_means_no_detections() {
    let dir = tempfile::tempdir().unwrap();
    let detector = LabelFileDetector::with_directory(dir.path());
    let frame = ImageFrame::try_from(RgbImage::new(8, 8)).unwrap();
    let input = SourcedFrame::new(dir.path().join("wall.jpg"), frame);
    assert!(detector.detect(&input).unwrap().is_empty());

    std::fs::write(dir.path().join("wall.txt"), "0 0.5 0.5 0.5 0.5 0.9\n").unwrap();
    let result = detector.detect(&input).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].bbox(), [2, 2, 6, 6]);
  }

  #[test]
  fn parse_errors_carry_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let label = dir.path().join("bad.txt");
    std::fs::write(&label, "0 0.5\n").unwrap();
    let detector = LabelFileDetector::with_file(&label);
    let frame = ImageFrame::try_from(RgbImage::new(8, 8)).unwrap();
    let err = detector
      .detect(&SourcedFrame::new("any.png", frame))
      .unwrap_err();
    match err {
      LabelFileError::Parse { path, line, .. } => {
        assert_eq!(path, label);
        assert_eq!(line, 1);
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn from_url_requires_existing_path() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::from_directory_path(dir.path()).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "labels", 1)).unwrap();
    assert!(LabelFileDetector::from_url(&url).is_ok());

    let missing = Url::parse("labels:///definitely/not/here.txt").unwrap();
    assert!(matches!(
      LabelFileDetector::from_url(&missing),
      Err(LabelFileError::NotFound(_))
    ));
  }
}
