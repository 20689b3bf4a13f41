//! # relax 子命令 CLI 定义
//!
//! 批量弛豫一个目录下的全部结构，并做收敛性检查、查重与输出校验。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/relax.rs`

use super::{CalculatorArgs, DbArgs};
use crate::analysis::convergence::{FORCE_THRESHOLD, FORMATION_ENERGY_THRESHOLD};
use crate::analysis::duplicate::ENERGY_TOLERANCE;
use crate::batch::DEFAULT_PATTERN;
use crate::relax::{OptimizerKind, DEFAULT_FMAX, DEFAULT_STEPS};

use clap::{Args, ValueEnum};
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────
// 优化器选择
// ─────────────────────────────────────────────────────────────

/// 优化器
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum OptimizerArg {
    /// Fast inertial relaxation engine
    Fire,
    /// Quasi-Newton with a dense Hessian
    #[default]
    Bfgs,
    /// Limited-memory BFGS
    Lbfgs,
    /// BFGS with backtracking line search
    BfgsLineSearch,
    /// L-BFGS with backtracking line search
    LbfgsLineSearch,
    /// Velocity-projected molecular dynamics minimiser
    MdMin,
}

impl From<OptimizerArg> for OptimizerKind {
    fn from(arg: OptimizerArg) -> Self {
        match arg {
            OptimizerArg::Fire => OptimizerKind::Fire,
            OptimizerArg::Bfgs => OptimizerKind::Bfgs,
            OptimizerArg::Lbfgs => OptimizerKind::Lbfgs,
            OptimizerArg::BfgsLineSearch => OptimizerKind::BfgsLineSearch,
            OptimizerArg::LbfgsLineSearch => OptimizerKind::LbfgsLineSearch,
            OptimizerArg::MdMin => OptimizerKind::MdMin,
        }
    }
}

impl std::fmt::Display for OptimizerArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", OptimizerKind::from(*self))
    }
}

// ─────────────────────────────────────────────────────────────
// relax 参数
// ─────────────────────────────────────────────────────────────

/// relax 子命令参数
#[derive(Args, Debug)]
pub struct RelaxArgs {
    /// Input directory (searched recursively) or a single structure file
    #[arg(short, long)]
    pub input: PathBuf,

    #[command(flatten)]
    pub calculator: CalculatorArgs,

    /// Optimization algorithm
    #[arg(long, value_enum, default_value_t = OptimizerArg::Bfgs)]
    pub optimizer: OptimizerArg,

    /// Keep the lattice fixed and relax atomic positions only
    #[arg(long, default_value_t = false)]
    pub fix_cell: bool,

    /// Force convergence criterion (eV/A)
    #[arg(long, default_value_t = DEFAULT_FMAX)]
    pub fmax: f64,

    /// Maximum optimizer steps per structure
    #[arg(long, default_value_t = DEFAULT_STEPS)]
    pub steps: usize,

    /// Per-structure relaxation time limit in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// File name pattern(s), comma separated
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Write one trajectory file per structure into this directory
    #[arg(long)]
    pub trajectory_dir: Option<PathBuf>,

    /// Skip the formation-energy / residual-force check
    #[arg(long, default_value_t = false)]
    pub skip_check_convergence: bool,

    /// Skip the duplicate check against the structure database
    #[arg(long, default_value_t = false)]
    pub skip_check_duplicate: bool,

    /// Skip re-parsing written structures in a child process
    #[arg(long, default_value_t = false)]
    pub skip_validation: bool,

    /// Time limit for validating one output file, in seconds
    #[arg(long, default_value_t = 3.0)]
    pub validation_timeout: f64,

    /// Elemental reference energies (JSON object, eV/atom) overriding the built-in table
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Maximum formation energy per atom accepted as converged (eV/atom)
    #[arg(long, default_value_t = FORMATION_ENERGY_THRESHOLD, allow_negative_numbers = true)]
    pub max_formation_energy: f64,

    /// Maximum residual force accepted as converged (eV/A)
    #[arg(long, default_value_t = FORCE_THRESHOLD)]
    pub force_threshold: f64,

    /// Relative per-atom energy difference below which database records are compared
    #[arg(long, default_value_t = ENERGY_TOLERANCE)]
    pub energy_tolerance: f64,

    /// Directory receiving the relaxed/ and unconverged/ folders
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Result table (JSON, keyed by structure name)
    #[arg(short, long, default_value = "results.json")]
    pub output: PathBuf,

    /// Also write a CSV summary
    #[arg(long)]
    pub csv: Option<PathBuf>,

    #[command(flatten)]
    pub db: DbArgs,
}

#[cfg(test)]
mod tests {
    use super::super::{Cli, Commands};
    use super::*;
    use clap::Parser;

    #[test]
    fn test_relax_defaults() {
        let cli = Cli::try_parse_from(["lamopt", "relax", "-i", "cifs"]).unwrap();
        let args = match cli.command {
            Commands::Relax(args) => args,
            _ => panic!("expected relax"),
        };
        assert_eq!(args.optimizer, OptimizerArg::Bfgs);
        assert!(!args.fix_cell);
        assert_eq!(args.fmax, DEFAULT_FMAX);
        assert_eq!(args.steps, DEFAULT_STEPS);
        assert_eq!(args.output, PathBuf::from("results.json"));
        assert_eq!(args.pattern, "*.cif");
        assert!(!args.skip_check_duplicate);
    }

    #[test]
    fn test_optimizer_names() {
        let cli = Cli::try_parse_from([
            "lamopt",
            "relax",
            "-i",
            "cifs",
            "--optimizer",
            "lbfgs-line-search",
            "--skip-check-duplicate",
        ])
        .unwrap();
        match cli.command {
            Commands::Relax(args) => {
                assert_eq!(
                    OptimizerKind::from(args.optimizer),
                    OptimizerKind::LbfgsLineSearch
                );
                assert!(args.skip_check_duplicate);
            }
            _ => panic!("expected relax"),
        }
    }
}
