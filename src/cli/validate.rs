//! # validate-cif 子命令 CLI 定义
//!
//! 由输出校验在子进程中调用，不在帮助中显示。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/validate.rs`

use clap::Args;
use std::path::PathBuf;

/// validate-cif 子命令参数
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// CIF file to parse and check
    pub path: PathBuf,
}
