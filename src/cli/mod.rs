//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `relax`: 批量弛豫、收敛性检查与查重
//! - `evaluate`: 单点能量与受力计算
//! - `query`: 查询远程结构库
//! - `trajectory`: 查看弛豫轨迹文件
//! - `validate-cif`: 校验单个 CIF 文件（隐藏，供子进程校验使用）
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: evaluate, query, relax, trajectory, validate

pub mod evaluate;
pub mod query;
pub mod relax;
pub mod trajectory;
pub mod validate;

use crate::calculators::{BuiltinPotential, CalculatorSpec};
use crate::db::client::{
    DbConfig, ACCESS_KEY_ENV, DEFAULT_ITERATE_URL, DEFAULT_QUERY_URL, ITERATE_URL_ENV,
    QUERY_URL_ENV, REQUEST_TIMEOUT_SECS,
};
use crate::db::DEFAULT_LIMIT;
use crate::error::Result;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// lam-optimize - 晶体结构批量弛豫与新颖性筛选
#[derive(Parser)]
#[command(name = "lamopt")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Batch relaxation and novelty screening of crystal structures", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Silence all log output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write log output to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Relax every structure in a directory and classify the results
    Relax(relax::RelaxArgs),

    /// Evaluate energy and forces of every structure without relaxing
    Evaluate(evaluate::EvaluateArgs),

    /// Query the remote structure database
    Query(query::QueryArgs),

    /// Print a per-step summary of a relaxation trajectory file
    Trajectory(trajectory::TrajectoryArgs),

    /// Parse and sanity-check one CIF file (used by output validation)
    #[command(name = "validate-cif", hide = true)]
    ValidateCif(validate::ValidateArgs),
}

// ─────────────────────────────────────────────────────────────
// 计算器参数（relax / evaluate 共用）
// ─────────────────────────────────────────────────────────────

/// 计算器选择
#[derive(Args, Debug)]
pub struct CalculatorArgs {
    /// Pair-potential model file (JSON); takes precedence over --potential
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Built-in potential name (lennard-jones, morse)
    #[arg(short, long, default_value = "lennard-jones")]
    pub potential: String,
}

impl CalculatorArgs {
    /// 未知的势函数名在这里直接报错
    pub fn spec(&self) -> Result<CalculatorSpec> {
        match &self.model {
            Some(path) => Ok(CalculatorSpec::Model(path.clone())),
            None => CalculatorSpec::from_potential_name(&self.potential),
        }
    }
}

impl Default for CalculatorArgs {
    fn default() -> Self {
        CalculatorArgs {
            model: None,
            potential: BuiltinPotential::LennardJones.as_str().to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 远程结构库参数（relax / query 共用）
// ─────────────────────────────────────────────────────────────

/// 远程结构库连接参数
#[derive(Args, Debug)]
pub struct DbArgs {
    /// Access key for the structure database
    #[arg(long, env = ACCESS_KEY_ENV, hide_env_values = true)]
    pub access_key: Option<String>,

    /// Cursor-based query endpoint
    #[arg(long, env = ITERATE_URL_ENV, default_value = DEFAULT_ITERATE_URL)]
    pub iterate_url: String,

    /// Page-number query endpoint (deprecated protocol)
    #[arg(long, env = QUERY_URL_ENV, default_value = DEFAULT_QUERY_URL)]
    pub query_url: String,

    /// Records requested per page
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    pub page_limit: u32,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,
}

impl DbArgs {
    pub fn config(&self) -> DbConfig {
        DbConfig {
            access_key: self.access_key.clone().filter(|k| !k.is_empty()),
            iterate_url: self.iterate_url.clone(),
            query_url: self.query_url.clone(),
            timeout: Duration::from_secs(self.request_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_unknown_potential_rejected_at_startup() {
        let args = CalculatorArgs {
            model: None,
            potential: "mace".to_string(),
        };
        assert!(args.spec().is_err());
        assert!(matches!(
            CalculatorArgs::default().spec().unwrap(),
            CalculatorSpec::Builtin(BuiltinPotential::LennardJones)
        ));
    }

    #[test]
    fn test_global_flags_parse() {
        let cli = Cli::try_parse_from(["lamopt", "-vv", "trajectory", "run.traj"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }
}
