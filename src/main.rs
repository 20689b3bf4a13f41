//! # lam-optimize - 晶体结构批量弛豫与新颖性筛选
//!
//! 用经典势函数弛豫一批候选结构，剔除未收敛和已知的结构，
//! 把新结构写出并在隔离的子进程中校验。
//!
//! ## 子命令
//! - `relax` - 批量弛豫、收敛性检查、查重与输出校验
//! - `evaluate` - 单点能量与受力
//! - `query` - 查询远程结构库
//! - `trajectory` - 查看弛豫轨迹
//! - `validate-cif` - 校验单个 CIF（内部使用）
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── batch/       (批量流程、输出校验)
//!   │     ├── relax/       (优化器、轨迹)
//!   │     ├── analysis/    (收敛性、查重、结构匹配)
//!   │     ├── db/          (远程结构库)
//!   │     ├── calculators/ (势函数)
//!   │     ├── parsers/     (CIF / pymatgen JSON)
//!   │     └── models/      (数据模型)
//!   ├── utils/      (输出、进度条、日志)
//!   └── error.rs    (错误处理)
//! ```

mod analysis;
mod batch;
mod calculators;
mod cli;
mod commands;
mod db;
mod error;
mod models;
mod parsers;
mod relax;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = utils::logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
