//! # 批量弛豫流程
//!
//! 单线程顺序执行：
//! 1. 递归收集输入文件，逐个解析、弛豫（可选每个结构的截止时间）
//!    - 解析失败、弛豫失败（含超时）只记录日志并跳过该结构
//!    - 结果按文件名（不含目录与扩展名）索引，同名后者覆盖前者
//! 2. 收敛性检查：未收敛结构的初始构型写入 `unconverged/`
//! 3. 查重：远程查询失败时终止查重阶段，查重标记保持为空，本次不写 `relaxed/`
//! 4. 收敛且不重复的终态结构写入 `relaxed/`，可选子进程校验，未通过的文件被删除
//!
//! 分类结果只影响输出目录，返回的结果表包含全部成功弛豫的结构。
//!
//! ## 依赖关系
//! - 被 `commands/relax.rs`, `commands/evaluate.rs` 调用
//! - 使用 `batch/collector.rs`, `batch/validation.rs`, `relax/`, `analysis/`, `db/`
//! - 使用 `utils/progress.rs` 显示进度

use super::collector::{FileCollector, DEFAULT_PATTERN};
use super::validation::{ValidationGuard, DEFAULT_VALIDATION_TIMEOUT};
use crate::analysis::{
    ConvergenceChecker, ConvergenceCriteria, DuplicateChecker, DuplicateCriteria,
    ReferenceEnergies,
};
use crate::calculators::Calculator;
use crate::db::StructureSource;
use crate::error::{LamOptError, Result};
use crate::models::Crystal;
use crate::parsers::{cif::to_cif_string, parse_structure_file};
use crate::relax::{Deadline, RelaxOptions, Relaxer, DEFAULT_FMAX, DEFAULT_STEPS};
use crate::utils::progress;

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// 未收敛结构输出子目录
pub const UNCONVERGED_DIR: &str = "unconverged";

/// 收敛且不重复的结构输出子目录
pub const RELAXED_DIR: &str = "relaxed";

/// 批量运行参数
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub fmax: f64,
    pub steps: usize,
    /// 每个结构的弛豫时限
    pub timeout: Option<Duration>,
    pub check_convergence: bool,
    pub check_duplicate: bool,
    pub validate_output: bool,
    /// 轨迹输出目录，文件名为 `<name>.traj`
    pub trajectory_dir: Option<PathBuf>,
    pub pattern: String,
    /// `unconverged/` 与 `relaxed/` 的父目录
    pub output_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            fmax: DEFAULT_FMAX,
            steps: DEFAULT_STEPS,
            timeout: None,
            check_convergence: true,
            check_duplicate: true,
            validate_output: true,
            trajectory_dir: None,
            pattern: DEFAULT_PATTERN.to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// 结果表中的一行
#[derive(Debug, Clone)]
pub struct RelaxRow {
    pub initial_structure: Crystal,
    pub final_structure: Crystal,
    pub final_energy: f64,
    pub steps: usize,
    pub source: PathBuf,
    /// 未做收敛性检查时为 None
    pub converged: Option<bool>,
    /// 未做查重（或查重被终止）时为 None
    pub duplicate: Option<bool>,
    pub formation_energy_per_atom: Option<f64>,
    pub max_force: Option<f64>,
}

/// 结果表：名称 -> 行
pub type ResultTable = BTreeMap<String, RelaxRow>;

/// 批量运行统计
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub discovered: usize,
    pub relaxed: usize,
    pub unconverged: usize,
    pub duplicates: usize,
    pub written: usize,
    pub rejected_by_validation: usize,
    /// 远程查询失败导致查重阶段终止
    pub duplicate_check_aborted: bool,
    /// 被跳过的输入（路径, 原因）
    pub failures: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// 一次批量运行的结果
#[derive(Debug)]
pub struct RunReport {
    pub table: ResultTable,
    pub summary: BatchSummary,
}

/// 单点计算结果
#[derive(Debug, Clone, Serialize)]
pub struct SinglePoint {
    pub potential_energy: f64,
    pub forces: Vec<[f64; 3]>,
}

/// 批量弛豫流程
pub struct RelaxPipeline<'a> {
    relaxer: &'a Relaxer,
    options: RunOptions,
    reference: ReferenceEnergies,
    convergence: ConvergenceCriteria,
    duplicate: DuplicateCriteria,
    source: Option<&'a dyn StructureSource>,
    guard: Option<ValidationGuard>,
}

impl<'a> RelaxPipeline<'a> {
    pub fn new(relaxer: &'a Relaxer, options: RunOptions) -> Self {
        RelaxPipeline {
            relaxer,
            options,
            reference: ReferenceEnergies::default(),
            convergence: ConvergenceCriteria::default(),
            duplicate: DuplicateCriteria::default(),
            source: None,
            guard: None,
        }
    }

    pub fn with_reference(mut self, reference: ReferenceEnergies) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_convergence_criteria(mut self, criteria: ConvergenceCriteria) -> Self {
        self.convergence = criteria;
        self
    }

    pub fn with_duplicate_criteria(mut self, criteria: DuplicateCriteria) -> Self {
        self.duplicate = criteria;
        self
    }

    /// 查重使用的远程结构来源
    pub fn with_source(mut self, source: &'a dyn StructureSource) -> Self {
        self.source = Some(source);
        self
    }

    /// 输出文件校验器；未设置时使用当前可执行文件
    pub fn with_guard(mut self, guard: ValidationGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// 弛豫并分类
    pub fn run(&self, input: &Path) -> Result<RunReport> {
        if self.options.check_duplicate && self.source.is_none() {
            return Err(LamOptError::InvalidArgument(
                "duplicate checking requires a structure database".to_string(),
            ));
        }

        let mut summary = BatchSummary::default();
        let mut table = self.relax_all(input, &mut summary)?;
        self.classify(&mut table, &mut summary)?;
        Ok(RunReport { table, summary })
    }

    /// 阶段一：逐个解析与弛豫
    pub fn relax_all(&self, input: &Path, summary: &mut BatchSummary) -> Result<ResultTable> {
        let files = FileCollector::new(input)
            .with_pattern(&self.options.pattern)
            .collect()?;
        summary.discovered = files.len();

        if let Some(dir) = &self.options.trajectory_dir {
            create_dir(dir)?;
        }

        let pb = progress::create_progress_bar(files.len() as u64, "Relaxing");
        let mut table = ResultTable::new();

        for path in &files {
            let name = stem(path);
            match self.relax_one(path, &name) {
                Ok(row) => {
                    if let Some(previous) = table.insert(name.clone(), row) {
                        pb.suspend(|| {
                            warn!(
                                "{}: result from {} replaced by {}",
                                name,
                                previous.source.display(),
                                path.display()
                            )
                        });
                    }
                }
                Err(e) => {
                    pb.suspend(|| warn!("Skipping {}: {}", path.display(), e));
                    summary.failures.push((path.display().to_string(), e.to_string()));
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        summary.relaxed = table.len();
        Ok(table)
    }

    fn relax_one(&self, path: &Path, name: &str) -> Result<RelaxRow> {
        let initial = parse_structure_file(path)?;
        let options = RelaxOptions {
            fmax: self.options.fmax,
            steps: self.options.steps,
            trajectory: self
                .options
                .trajectory_dir
                .as_ref()
                .map(|dir| dir.join(format!("{}.traj", name))),
            deadline: self.options.timeout.map(Deadline::after),
        };

        let outcome = self.relaxer.relax(&initial, &options)?;
        let final_energy = outcome
            .final_energy()
            .ok_or_else(|| LamOptError::Diverged(format!("{}: empty trajectory", name)))?;

        Ok(RelaxRow {
            initial_structure: initial,
            final_structure: outcome.final_structure,
            final_energy,
            steps: outcome.steps,
            source: path.to_path_buf(),
            converged: None,
            duplicate: None,
            formation_energy_per_atom: None,
            max_force: None,
        })
    }

    /// 阶段二：收敛性检查、查重、写出与校验
    pub fn classify(&self, table: &mut ResultTable, summary: &mut BatchSummary) -> Result<()> {
        let unconverged_dir = self.options.output_dir.join(UNCONVERGED_DIR);
        let relaxed_dir = self.options.output_dir.join(RELAXED_DIR);
        create_dir(&unconverged_dir)?;
        create_dir(&relaxed_dir)?;

        let mut accepted: Vec<String> = Vec::new();
        let mut unconverged_names = HashSet::new();

        if self.options.check_convergence {
            let checker = ConvergenceChecker::new(
                self.relaxer.calculator(),
                self.reference.clone(),
                self.convergence,
            );
            for (name, row) in table.iter_mut() {
                let verdict = checker.check(&row.final_structure, row.final_energy)?;
                row.converged = Some(verdict.converged());
                row.formation_energy_per_atom = verdict.formation_energy_per_atom;
                row.max_force = Some(verdict.max_force);

                match &verdict.rejection {
                    None => accepted.push(name.clone()),
                    Some(reason) => {
                        info!("{} is unconverged: {}", name, reason);
                        summary.unconverged += 1;
                        write_cif(&unconverged_dir, &row.initial_structure, &mut unconverged_names)?;
                    }
                }
            }
        } else {
            accepted.extend(table.keys().cloned());
        }

        if self.options.check_duplicate {
            if let Some(source) = self.source {
                if !self.tag_duplicates(source, table, &accepted, summary) {
                    return Ok(());
                }
            }
        }

        let guard = if self.options.validate_output {
            Some(match &self.guard {
                Some(guard) => guard.clone(),
                None => ValidationGuard::for_current_exe(DEFAULT_VALIDATION_TIMEOUT)?,
            })
        } else {
            None
        };

        let mut relaxed_names = HashSet::new();
        for name in &accepted {
            let row = match table.get(name) {
                Some(row) if row.duplicate != Some(true) => row,
                _ => continue,
            };
            let path = write_cif(&relaxed_dir, &row.final_structure, &mut relaxed_names)?;
            if let Some(guard) = &guard {
                let outcome = guard.guard(&path);
                if !outcome.is_accepted() {
                    warn!("{}: output {} {}", name, path.display(), outcome);
                    summary.rejected_by_validation += 1;
                    continue;
                }
            }
            summary.written += 1;
        }
        Ok(())
    }

    /// 为已接受的结构打上查重标记；远程查询失败时清空标记并返回 false
    fn tag_duplicates(
        &self,
        source: &dyn StructureSource,
        table: &mut ResultTable,
        accepted: &[String],
        summary: &mut BatchSummary,
    ) -> bool {
        let checker = DuplicateChecker::new(source, self.duplicate);
        let mut tags = Vec::with_capacity(accepted.len());
        for name in accepted {
            let row = match table.get(name) {
                Some(row) => row,
                None => continue,
            };
            match checker.check(&row.final_structure, row.final_energy) {
                Ok(verdict) => tags.push((name.clone(), verdict.is_duplicate())),
                Err(e) => {
                    warn!("Duplicate check aborted: {}", e);
                    summary.duplicate_check_aborted = true;
                    return false;
                }
            }
        }

        for (name, duplicate) in tags {
            if let Some(row) = table.get_mut(&name) {
                row.duplicate = Some(duplicate);
                if duplicate {
                    info!("{} duplicates a known structure", name);
                    summary.duplicates += 1;
                }
            }
        }
        true
    }
}

/// 不弛豫，只计算每个结构的能量与受力
pub fn single_point(
    calculator: &dyn Calculator,
    input: &Path,
    pattern: &str,
) -> Result<BTreeMap<String, SinglePoint>> {
    let files = FileCollector::new(input).with_pattern(pattern).collect()?;
    let pb = progress::create_progress_bar(files.len() as u64, "Evaluating");
    let mut results = BTreeMap::new();

    for path in &files {
        pb.inc(1);
        let crystal = match parse_structure_file(path) {
            Ok(crystal) => crystal,
            Err(e) => {
                pb.suspend(|| warn!("Skipping {}: {}", path.display(), e));
                continue;
            }
        };
        let calc = calculator.calculate(&crystal)?;
        results.insert(
            stem(path),
            SinglePoint {
                potential_energy: calc.energy,
                forces: calc.forces,
            },
        );
    }
    pb.finish_and_clear();
    Ok(results)
}

/// 文件名去掉目录与扩展名
fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| LamOptError::FileWriteError {
        path: dir.display().to_string(),
        source: e,
    })
}

/// 以化学式命名写出 CIF，同一次运行中重名时追加 `-1`, `-2`, ...
fn write_cif(dir: &Path, crystal: &Crystal, taken: &mut HashSet<String>) -> Result<PathBuf> {
    let formula = crystal.formula().replace(char::is_whitespace, "");
    let mut file_name = format!("{}.cif", formula);
    let mut n = 0;
    while taken.contains(&file_name) {
        n += 1;
        file_name = format!("{}-{}.cif", formula, n);
    }
    taken.insert(file_name.clone());

    let path = dir.join(&file_name);
    fs::write(&path, to_cif_string(crystal)).map_err(|e| LamOptError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(path)
}
