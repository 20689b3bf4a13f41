//! # validate-cif 命令实现
//!
//! 解析并检查单个 CIF 文件。成功时静默退出，失败时把原因写到 stderr
//! 并以非零状态退出，供父进程的输出校验读取。
//!
//! ## 依赖关系
//! - 使用 `cli/validate.rs` 定义的参数
//! - 使用 `parsers/cif.rs`

use crate::cli::validate::ValidateArgs;
use crate::error::Result;
use crate::parsers::cif;

use tracing::debug;

/// 执行 validate-cif 命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    let crystal = cif::read_checked(&args.path)?;
    debug!("{}: {} sites, {}", args.path.display(), crystal.len(), crystal.formula());
    Ok(())
}
