// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/input/image_directory.rs - 图像目录输入
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

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use super::read_image_file::read_frame;
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::SourcedFrame,
  utils::{is_image_file, url_to_path},
};

#[derive(Error, Debug)]
pub enum ImageDirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("不是目录: {0}")]
  NotADirectory(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按文件名顺序逐个读取目录下的图像，无法解码的文件记录警告后跳过
pub struct ImageDirectoryInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageDirectoryInputError::SchemeMismatch);
    }
    Self::open(url_to_path(url))
  }
}

impl ImageDirectoryInput {
  pub fn open(dir: impl AsRef<Path>) -> Result<Self, ImageDirectoryInputError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
      return Err(ImageDirectoryInputError::NotADirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
      let path = entry?.path();
      if path.is_file() && is_image_file(&path) {
        files.push(path);
      }
    }
    files.sort();
    info!("目录 {} 中共有 {} 张图像", dir.display(), files.len());

    Ok(Self {
      pending: files.into(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

impl Iterator for ImageDirectoryInput {
  type Item = SourcedFrame;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.pending.pop_front() {
      match read_frame(&path) {
        Ok(frame) => return Some(SourcedFrame::new(path, frame)),
        Err(e) => warn!("跳过 {}: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn iterates_images_in_name_order_and_skips_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]))
      .save(dir.path().join("b.png"))
      .unwrap();
    RgbImage::from_pixel(6, 3, Rgb([0, 0, 0]))
      .save(dir.path().join("a.png"))
      .unwrap();
    std::fs::write(dir.path().join("c.jpg"), b"broken").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let input = ImageDirectoryInput::open(dir.path()).unwrap();
    assert_eq!(input.remaining(), 3);

    let frames: Vec<SourcedFrame> = input.collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].path.file_name().unwrap(), "a.png");
    assert_eq!(frames[0].frame.dimensions(), (6, 3));
    assert_eq!(frames[1].path.file_name().unwrap(), "b.png");
  }

  #[test]
  fn rejects_plain_files() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("x.png");
    std::fs::write(&file, b"").unwrap();
    assert!(matches!(
      ImageDirectoryInput::open(&file),
      Err(ImageDirectoryInputError::NotADirectory(_))
    ));
  }
}
