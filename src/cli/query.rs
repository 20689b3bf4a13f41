//! # query 子命令 CLI 定义
//!
//! 按化学式、能量区间与提交时间查询远程结构库。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/query.rs`

use super::DbArgs;
use crate::db::record::parse_submission_time;
use crate::db::StructureQuery;

use chrono::{DateTime, Utc};
use clap::Args;
use std::path::PathBuf;

/// query 子命令参数
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Chemical formula to match (reduced, e.g. NaCl)
    #[arg(long)]
    pub formula: Option<String>,

    /// Lower bound of the total energy (eV)
    #[arg(long, allow_negative_numbers = true)]
    pub min_energy: Option<f64>,

    /// Upper bound of the total energy (eV)
    #[arg(long, allow_negative_numbers = true)]
    pub max_energy: Option<f64>,

    /// Earliest submission time (RFC 3339 or 'YYYY-MM-DD HH:MM:SS', UTC)
    #[arg(long, value_parser = parse_time)]
    pub min_submission_time: Option<DateTime<Utc>>,

    /// Latest submission time (RFC 3339 or 'YYYY-MM-DD HH:MM:SS', UTC)
    #[arg(long, value_parser = parse_time)]
    pub max_submission_time: Option<DateTime<Utc>>,

    /// Fetch a single page with the deprecated page-number protocol
    #[arg(long)]
    pub page: Option<u32>,

    /// Stop after printing this many records
    #[arg(long, default_value_t = 20)]
    pub top_n: usize,

    /// Save every fetched record as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub db: DbArgs,
}

impl QueryArgs {
    pub fn query(&self) -> StructureQuery {
        StructureQuery {
            formula: self.formula.clone(),
            min_energy: self.min_energy,
            max_energy: self.max_energy,
            min_submission_time: self.min_submission_time,
            max_submission_time: self.max_submission_time,
        }
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_submission_time(raw).map_err(|e| e.to_string())
}
