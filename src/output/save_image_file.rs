// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  analysis::AnalysisResult,
  frame::SourcedFrame,
  output::{Render, draw::Draw},
  utils::url_to_path,
};

/// 要保存的图层
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageLayer {
  #[default]
  Heatmap,
  Annotated,
}

pub struct SaveImageFileOutput {
  path: PathBuf,
  layer: ImageLayer,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let mut layer = ImageLayer::default();
    for (k, v) in uri.query_pairs() {
      if k == "layer" {
        layer = match &*v {
          "annotated" => ImageLayer::Annotated,
          "heatmap" => ImageLayer::Heatmap,
          other => {
            warn!("未知图层 '{}', 使用热力图", other);
            ImageLayer::Heatmap
          }
        };
      }
    }

    Ok(SaveImageFileOutput::new(url_to_path(uri)).with_layer(layer))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      layer: ImageLayer::default(),
      draw: Draw::default(),
    }
  }

  pub fn with_layer(mut self, layer: ImageLayer) -> Self {
    self.layer = layer;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: &image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;

    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<SourcedFrame, AnalysisResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &SourcedFrame, result: &AnalysisResult) -> Result<(), Self::Error> {
    match self.layer {
      ImageLayer::Heatmap => self.save_image(&result.heatmap_overlay),
      ImageLayer::Annotated => {
        let image = self.draw.draw_detection(&frame.frame, result.kept.as_ref());
        self.save_image(&image)
      }
    }
  }
}
