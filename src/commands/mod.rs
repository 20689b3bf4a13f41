//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `batch/`, `db/`, `relax/`, `utils/`
//! - 子模块: evaluate, query, relax, trajectory, validate

pub mod evaluate;
pub mod query;
pub mod relax;
pub mod trajectory;
pub mod validate;

use crate::cli::Commands;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Relax(args) => relax::execute(args),
        Commands::Evaluate(args) => evaluate::execute(args),
        Commands::Query(args) => query::execute(args),
        Commands::Trajectory(args) => trajectory::execute(args),
        Commands::ValidateCif(args) => validate::execute(args),
    }
}
