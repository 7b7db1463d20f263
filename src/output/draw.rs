// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/output/draw.rs - 检测结果可视化与分析记录
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

use std::{fs::File, io::BufWriter, path::Path};

use chrono::Utc;
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use serde::Serialize;

use crate::{
  analysis::AnalysisResult,
  frame::{ImageFrame, SourcedFrame},
  model::Detection,
};

const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const BOX_THICKNESS: u32 = 2;
const DETECTED_CLASS: &str = "crack";

/// 在原图副本上绘制检测框
#[derive(Debug, Clone)]
pub struct Draw {
  box_color: [u8; 3],
  thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      box_color: BOX_COLOR,
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  /// 返回新的标注图像，输入帧保持不变
  pub fn draw_detection(&self, frame: &ImageFrame, detections: &[Detection]) -> RgbImage {
    let mut image = frame.as_rgb_image().clone();
    for det in detections {
      self.draw_bbox(&mut image, det);
    }
    image
  }

  fn draw_bbox(&self, image: &mut RgbImage, det: &Detection) {
    let det = det.clamp_to(image.width(), image.height());
    let [x_min, y_min, _, _] = det.bbox();
    let (w, h) = (det.width() as u32, det.height() as u32);

    // 由外向内逐层绘制，加粗边框
    for t in 0..self.thickness {
      let (Some(inner_w), Some(inner_h)) = (w.checked_sub(2 * t), h.checked_sub(2 * t)) else {
        break;
      };
      if inner_w == 0 || inner_h == 0 {
        break;
      }
      let rect = Rect::at(x_min + t as i32, y_min + t as i32).of_size(inner_w, inner_h);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }
  }
}

/// 单帧的分析记录，写为 JSON
#[derive(Debug, Serialize)]
pub struct AnalysisRecord<'a> {
  pub source: String,
  pub width: u32,
  pub height: u32,
  pub detected_class: &'static str,
  pub generated_at: String,
  #[serde(flatten)]
  pub analysis: &'a AnalysisResult,
}

impl<'a> AnalysisRecord<'a> {
  pub fn new(frame: &SourcedFrame, analysis: &'a AnalysisResult) -> Self {
    let (width, height) = frame.frame.dimensions();
    Self {
      source: frame.path.display().to_string(),
      width,
      height,
      detected_class: DETECTED_CLASS,
      generated_at: Utc::now().to_rfc3339(),
      analysis,
    }
  }

  pub fn write(&self, path: &Path) -> Result<(), std::io::Error> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, self)?;
    Ok(())
  }
}
