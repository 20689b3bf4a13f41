//! # evaluate 子命令 CLI 定义
//!
//! 对目录下每个结构做单点计算（不弛豫）。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/evaluate.rs`

use super::CalculatorArgs;
use crate::batch::DEFAULT_PATTERN;

use clap::Args;
use std::path::PathBuf;

/// evaluate 子命令参数
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Input directory (searched recursively) or a single structure file
    #[arg(short, long)]
    pub input: PathBuf,

    #[command(flatten)]
    pub calculator: CalculatorArgs,

    /// File name pattern(s), comma separated
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Output JSON file (name -> potential energy and forces)
    #[arg(short, long, default_value = "evaluation.json")]
    pub output: PathBuf,
}
