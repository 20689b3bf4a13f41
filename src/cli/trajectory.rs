//! # trajectory 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/trajectory.rs`

use clap::Args;
use std::path::PathBuf;

/// trajectory 子命令参数
#[derive(Args, Debug)]
pub struct TrajectoryArgs {
    /// Trajectory file written by `relax --trajectory-dir`
    pub file: PathBuf,

    /// Export the per-step table to CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,
}
