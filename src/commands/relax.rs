//! # relax 命令实现
//!
//! 批量弛豫并分类一个目录下的全部结构。
//!
//! ## 功能
//! - 启动时构建计算器，未知势函数直接报错
//! - 按需连接远程结构库做查重
//! - 结果表写为 JSON（可选 CSV），并打印汇总表
//!
//! ## 依赖关系
//! - 使用 `cli/relax.rs` 定义的参数
//! - 使用 `batch/`, `relax/`, `analysis/`, `db/`
//! - 使用 `utils/output.rs`

use crate::analysis::{ConvergenceCriteria, DuplicateCriteria, ReferenceEnergies};
use crate::batch::{BatchSummary, RelaxPipeline, ResultTable, RunOptions, ValidationGuard};
use crate::cli::relax::RelaxArgs;
use crate::db::OpenLamClient;
use crate::error::{LamOptError, Result};
use crate::parsers::pymatgen::StructureDict;
use crate::relax::Relaxer;
use crate::utils::output;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing::debug;

/// 结果 JSON 中的一项
#[derive(Debug, Serialize)]
struct ResultEntry {
    initial_structure: StructureDict,
    final_structure: StructureDict,
    final_energy: f64,
    steps: usize,
    source: String,
    converged: Option<bool>,
    duplicate: Option<bool>,
    formation_energy_per_atom: Option<f64>,
    max_force: Option<f64>,
}

/// 汇总表行
#[derive(Debug, Clone, Tabled)]
struct SummaryRow {
    #[tabled(rename = "Structure")]
    name: String,
    #[tabled(rename = "Formula")]
    formula: String,
    #[tabled(rename = "Energy (eV)")]
    energy: String,
    #[tabled(rename = "Steps")]
    steps: usize,
    #[tabled(rename = "E_form (eV/atom)")]
    formation_energy: String,
    #[tabled(rename = "Fmax (eV/Å)")]
    max_force: String,
    #[tabled(rename = "Converged")]
    converged: String,
    #[tabled(rename = "Duplicate")]
    duplicate: String,
}

/// 执行 relax 命令
pub fn execute(args: RelaxArgs) -> Result<()> {
    output::print_header("Batch Relaxation");

    let spec = args.calculator.spec()?;
    let relaxer = Relaxer::new(&spec, args.optimizer.into(), !args.fix_cell)?;
    output::print_setting("calculator", &spec.to_string());
    output::print_setting("optimizer", relaxer.optimizer().as_str());
    output::print_setting("relax cell", &relaxer.relax_cell().to_string());
    output::print_setting("fmax", &format!("{} eV/Å, {} steps", args.fmax, args.steps));

    let options = RunOptions {
        fmax: args.fmax,
        steps: args.steps,
        timeout: args.timeout.map(seconds).transpose()?,
        check_convergence: !args.skip_check_convergence,
        check_duplicate: !args.skip_check_duplicate,
        validate_output: !args.skip_validation,
        trajectory_dir: args.trajectory_dir.clone(),
        pattern: args.pattern.clone(),
        output_dir: args.output_dir.clone(),
    };

    let client = if options.check_duplicate {
        let config = args.db.config();
        if config.access_key.is_none() {
            output::print_warning("No database access key set, remote queries may be refused");
        }
        debug!("Structure database: {}", config.iterate_url);
        Some(OpenLamClient::new(config)?)
    } else {
        None
    };

    let reference = match &args.reference {
        Some(path) => ReferenceEnergies::load(path)?,
        None => ReferenceEnergies::default(),
    };

    let mut pipeline = RelaxPipeline::new(&relaxer, options)
        .with_reference(reference)
        .with_convergence_criteria(ConvergenceCriteria {
            max_formation_energy: args.max_formation_energy,
            max_force: args.force_threshold,
        })
        .with_duplicate_criteria(DuplicateCriteria {
            energy_tolerance: args.energy_tolerance,
            page_limit: args.db.page_limit,
            ..Default::default()
        });
    if let Some(client) = &client {
        pipeline = pipeline.with_source(client);
    }
    if !args.skip_validation {
        pipeline = pipeline.with_guard(ValidationGuard::for_current_exe(seconds(
            args.validation_timeout,
        )?)?);
    }

    output::print_info(&format!("Scanning '{}'...", args.input.display()));
    let report = pipeline.run(&args.input)?;
    output::print_success(&format!(
        "Relaxed {} of {} structures",
        report.summary.relaxed, report.summary.discovered
    ));

    if report.table.is_empty() {
        output::print_warning("No structure was relaxed.");
    } else {
        print_table(&report.table);
    }

    save_results_json(&report.table, &args.output)?;
    output::print_written("Results", &args.output.display().to_string());
    if let Some(csv_path) = &args.csv {
        save_results_csv(&report.table, csv_path)?;
        output::print_written("CSV summary", &csv_path.display().to_string());
    }

    print_summary(&report.summary, &args.output_dir);
    Ok(())
}

fn seconds(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| LamOptError::InvalidArgument(format!("invalid duration: {} s", value)))
}

fn flag(value: Option<bool>) -> String {
    match value {
        Some(true) => "yes".to_string(),
        Some(false) => "no".to_string(),
        None => "-".to_string(),
    }
}

fn number(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "-".to_string())
}

fn print_table(table: &ResultTable) {
    let rows: Vec<SummaryRow> = table
        .iter()
        .map(|(name, row)| SummaryRow {
            name: name.clone(),
            formula: row.final_structure.formula(),
            energy: format!("{:.6}", row.final_energy),
            steps: row.steps,
            formation_energy: number(row.formation_energy_per_atom, 4),
            max_force: number(row.max_force, 4),
            converged: flag(row.converged),
            duplicate: flag(row.duplicate),
        })
        .collect();

    output::print_header("Relaxation Results");
    println!("{}", Table::new(&rows));
}

fn print_summary(summary: &BatchSummary, output_dir: &Path) {
    output::print_header("Summary");
    if summary.failed() > 0 {
        output::print_warning(&format!("{} structures skipped", summary.failed()));
    }
    for (path, reason) in &summary.failures {
        output::print_skipped(path, reason);
    }
    if summary.unconverged > 0 {
        output::print_info(&format!("{} unconverged", summary.unconverged));
    }
    if summary.duplicate_check_aborted {
        output::print_warning("Duplicate check aborted, no relaxed structures were written");
    } else if summary.duplicates > 0 {
        output::print_info(&format!("{} duplicates of known structures", summary.duplicates));
    }
    if summary.rejected_by_validation > 0 {
        output::print_warning(&format!(
            "{} outputs failed validation and were removed",
            summary.rejected_by_validation
        ));
    }
    output::print_done(&format!(
        "{} new structures written under '{}'",
        summary.written,
        output_dir.display()
    ));
}

/// 保存结果表到 JSON
fn save_results_json(table: &ResultTable, output_path: &Path) -> Result<()> {
    let entries: BTreeMap<&String, ResultEntry> = table
        .iter()
        .map(|(name, row)| {
            (
                name,
                ResultEntry {
                    initial_structure: StructureDict::from_crystal(&row.initial_structure),
                    final_structure: StructureDict::from_crystal(&row.final_structure),
                    final_energy: row.final_energy,
                    steps: row.steps,
                    source: row.source.display().to_string(),
                    converged: row.converged,
                    duplicate: row.duplicate,
                    formation_energy_per_atom: row.formation_energy_per_atom,
                    max_force: row.max_force,
                },
            )
        })
        .collect();

    let json = serde_json::to_string_pretty(&entries)?;
    fs::write(output_path, json).map_err(|e| LamOptError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })
}

/// 保存结果表到 CSV
fn save_results_csv(table: &ResultTable, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;
    wtr.write_record([
        "structure",
        "formula",
        "final_energy_eV",
        "steps",
        "formation_energy_eV_per_atom",
        "max_force_eV_per_A",
        "converged",
        "duplicate",
    ])?;

    for (name, row) in table {
        wtr.write_record([
            name.clone(),
            row.final_structure.formula(),
            format!("{:.10}", row.final_energy),
            row.steps.to_string(),
            row.formation_energy_per_atom
                .map(|e| format!("{:.10}", e))
                .unwrap_or_default(),
            row.max_force.map(|f| format!("{:.10}", f)).unwrap_or_default(),
            row.converged.map(|c| c.to_string()).unwrap_or_default(),
            row.duplicate.map(|d| d.to_string()).unwrap_or_default(),
        ])?;
    }

    wtr.flush().map_err(|e| LamOptError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })
}
