// 该文件是 CrackScan （裂缝扫描） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像分析
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use crackscan::{
  FromUrl,
  analysis::SeverityAnalyzerBuilder,
  detector::DetectorWrapper,
  input::InputWrapper,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// 对单张图像做裂缝严重度分析
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像，例如 image:///data/wall.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 检测结果来源，例如 labels:///data/wall.txt
  #[arg(long, value_name = "DETECTOR")]
  pub detector: Url,
  /// 输出路径，例如 image:///out/wall.png?layer=annotated 或 folder:///out?always
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 分析参数
  #[arg(long, value_name = "ANALYZER", default_value = "severity://")]
  pub analyzer: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("检测结果: {}", args.detector);
  info!("输出路径: {}", args.output);
  info!("分析参数: {}", args.analyzer);

  let input = InputWrapper::from_url(&args.input)?;
  let detector = DetectorWrapper::from_url(&args.detector)?;
  let analyzer = SeverityAnalyzerBuilder::from_url(&args.analyzer)?.build()?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask.run_task(input, detector, &analyzer, output)?;

  Ok(())
}
