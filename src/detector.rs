// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/detector.rs - 检测器实现
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

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::SourcedFrame,
  model::{DetectResult, Detector},
};

mod label_file;
pub use self::label_file::{LabelFileDetector, LabelFileError, parse_yolo_labels};

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("标注文件检测器错误: {0}")]
  LabelFileError(#[from] LabelFileError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum DetectorWrapper {
  LabelFile(LabelFileDetector),
}

impl FromUrl for DetectorWrapper {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LabelFileDetector::SCHEME => Ok(DetectorWrapper::LabelFile(LabelFileDetector::from_url(url)?)),
      _ => Err(DetectorError::SchemeMismatch),
    }
  }
}

impl Detector for DetectorWrapper {
  type Input = SourcedFrame;
  type Error = DetectorError;

  fn detect(&self, input: &Self::Input) -> Result<DetectResult, Self::Error> {
    match self {
      DetectorWrapper::LabelFile(detector) => detector.detect(input).map_err(DetectorError::from),
    }
  }
}
