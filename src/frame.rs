// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/frame.rs - 图像帧定义
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

use std::path::PathBuf;

use image::{DynamicImage, GrayImage, RgbImage};

use crate::analysis::AnalysisError;

const RGB_CHANNELS: usize = 3;

/// 待分析的源图像。
///
/// 宽高恒为正数；分析过程只读取该帧，叠加图总是新分配的图像。
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
  image: RgbImage,
}

impl ImageFrame {
  /// 从 HWC 排列的 RGB 字节构造帧
  pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, AnalysisError> {
    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(AnalysisError::InvalidInput(format!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        expected,
        data.len()
      )));
    }

    RgbImage::from_raw(width, height, data)
      .ok_or_else(|| AnalysisError::InvalidInput("无法从原始数据构造图像".to_string()))
      .and_then(Self::try_from)
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.image.dimensions()
  }

  /// 像素总数
  pub fn area(&self) -> u64 {
    self.width() as u64 * self.height() as u64
  }

  pub fn as_rgb_image(&self) -> &RgbImage {
    &self.image
  }
}

impl TryFrom<RgbImage> for ImageFrame {
  type Error = AnalysisError;

  fn try_from(image: RgbImage) -> Result<Self, Self::Error> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(AnalysisError::InvalidInput(format!(
        "图像面积为零: {}x{}",
        width, height
      )));
    }
    Ok(Self { image })
  }
}

// 单通道灰度图按三通道复制
impl TryFrom<GrayImage> for ImageFrame {
  type Error = AnalysisError;

  fn try_from(image: GrayImage) -> Result<Self, Self::Error> {
    Self::try_from(DynamicImage::ImageLuma8(image))
  }
}

impl TryFrom<DynamicImage> for ImageFrame {
  type Error = AnalysisError;

  fn try_from(image: DynamicImage) -> Result<Self, Self::Error> {
    Self::try_from(image.to_rgb8())
  }
}

/// 带来源路径的帧，检测器和输出据此派生文件名
#[derive(Debug, Clone)]
pub struct SourcedFrame {
  pub path: PathBuf,
  pub frame: ImageFrame,
}

impl SourcedFrame {
  pub fn new(path: impl Into<PathBuf>, frame: ImageFrame) -> Self {
    Self {
      path: path.into(),
      frame,
    }
  }
}

impl AsRef<ImageFrame> for SourcedFrame {
  fn as_ref(&self) -> &ImageFrame {
    &self.frame
  }
}

impl AsRef<ImageFrame> for ImageFrame {
  fn as_ref(&self) -> &ImageFrame {
    self
  }
}
