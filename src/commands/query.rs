//! # query 命令实现
//!
//! 查询远程结构库并以表格打印，可选保存为 JSON。
//!
//! ## 依赖关系
//! - 使用 `cli/query.rs` 定义的参数
//! - 使用 `db/`
//! - 使用 `utils/output.rs`, `utils/progress.rs`

use crate::cli::query::QueryArgs;
use crate::db::{query_all, CrystalRecord, OpenLamClient, StructureSource};
use crate::error::{LamOptError, Result};
use crate::parsers::pymatgen::StructureDict;
use crate::utils::{output, progress};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tabled::{Table, Tabled};

/// 查询结果表行
#[derive(Debug, Clone, Tabled)]
struct RecordRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Formula")]
    formula: String,
    #[tabled(rename = "Sites")]
    sites: usize,
    #[tabled(rename = "Energy (eV)")]
    energy: String,
    #[tabled(rename = "E/atom (eV)")]
    energy_per_atom: String,
    #[tabled(rename = "Submitted")]
    submitted: String,
}

/// JSON 输出中的一条记录
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordEntry {
    formula: String,
    energy: f64,
    submission_time: DateTime<Utc>,
    structure: StructureDict,
}

/// 执行 query 命令
pub fn execute(args: QueryArgs) -> Result<()> {
    output::print_header("Structure Database Query");

    let client = OpenLamClient::new(args.db.config())?;
    let query = args.query();

    let spinner = progress::create_spinner("Querying structure database...");
    #[allow(deprecated)]
    let fetched = match args.page {
        Some(page) => client.page(&query, page).map(|p| p.items),
        None => query_all(&client, &query, args.db.page_limit),
    };
    spinner.finish_and_clear();
    let records = fetched?;

    if records.is_empty() {
        output::print_warning("No matching records.");
    } else {
        let rows: Vec<RecordRow> = records
            .iter()
            .take(args.top_n)
            .enumerate()
            .map(|(i, r)| RecordRow {
                index: i + 1,
                formula: r.formula.clone(),
                sites: r.structure.len(),
                energy: format!("{:.6}", r.energy),
                energy_per_atom: format!("{:.6}", r.energy_per_atom()),
                submitted: r.submission_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            })
            .collect();
        println!("{}", Table::new(&rows));
    }

    if let Some(path) = &args.output {
        save_records_json(&records, path)?;
        output::print_written("Records", &path.display().to_string());
    }

    output::print_done(&format!("{} records fetched", records.len()));
    Ok(())
}

fn save_records_json(records: &[CrystalRecord], output_path: &Path) -> Result<()> {
    let entries: Vec<RecordEntry> = records
        .iter()
        .map(|r| RecordEntry {
            formula: r.formula.clone(),
            energy: r.energy,
            submission_time: r.submission_time,
            structure: StructureDict::from_crystal(&r.structure),
        })
        .collect();
    let json = serde_json::to_string_pretty(&entries)?;
    fs::write(output_path, json).map_err(|e| LamOptError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })
}
