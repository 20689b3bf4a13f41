//! # 弛豫器
//!
//! 构造时选定计算器与优化策略；`relax` 驱动优化循环并记录轨迹。
//!
//! ## 循环
//! 1. 检查截止时间
//! 2. 计算广义力，max |F_i| < fmax 或已走满 steps 步则停止
//! 3. 优化器走一步，观察者记录一帧
//!
//! 循环结束后总会再记录一帧终态，因此轨迹长度 = 实际步数 + 1。
//!
//! ## 依赖关系
//! - 被 `batch/pipeline.rs` 使用
//! - 使用 `calculators/`, `relax/atoms.rs`, `relax/optimizers.rs`, `relax/trajectory.rs`

use super::atoms::{max_row_norm, Atoms, CellFilter, Optimizable};
use super::deadline::Deadline;
use super::optimizers::OptimizerKind;
use super::trajectory::{Trajectory, TrajectoryObserver};
use crate::calculators::{Calculator, CalculatorSpec};
use crate::error::{LamOptError, Result};
use crate::models::Crystal;

use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// 默认力收敛阈值 (eV/Å)
pub const DEFAULT_FMAX: f64 = 1e-4;

/// 默认最大步数
pub const DEFAULT_STEPS: usize = 200;

/// 单次弛豫参数
#[derive(Debug, Clone)]
pub struct RelaxOptions {
    pub fmax: f64,
    pub steps: usize,
    /// 轨迹输出路径
    pub trajectory: Option<PathBuf>,
    pub deadline: Option<Deadline>,
}

impl Default for RelaxOptions {
    fn default() -> Self {
        RelaxOptions {
            fmax: DEFAULT_FMAX,
            steps: DEFAULT_STEPS,
            trajectory: None,
            deadline: None,
        }
    }
}

/// 弛豫结果
#[derive(Debug, Clone)]
pub struct RelaxOutcome {
    /// 去掉晶胞包装后的终态结构，`energy` 为终态能量
    pub final_structure: Crystal,
    pub trajectory: Trajectory,
    /// 实际走过的优化步数
    pub steps: usize,
}

impl RelaxOutcome {
    pub fn final_energy(&self) -> Option<f64> {
        self.trajectory.last_energy()
    }
}

/// 弛豫器
pub struct Relaxer {
    calculator: Arc<dyn Calculator>,
    optimizer: OptimizerKind,
    relax_cell: bool,
}

impl Relaxer {
    /// 构造计算器；模型文件无效时立即失败
    pub fn new(spec: &CalculatorSpec, optimizer: OptimizerKind, relax_cell: bool) -> Result<Self> {
        Ok(Relaxer::with_calculator(spec.build()?, optimizer, relax_cell))
    }

    pub fn with_calculator(
        calculator: Arc<dyn Calculator>,
        optimizer: OptimizerKind,
        relax_cell: bool,
    ) -> Self {
        Relaxer {
            calculator,
            optimizer,
            relax_cell,
        }
    }

    pub fn calculator(&self) -> Arc<dyn Calculator> {
        Arc::clone(&self.calculator)
    }

    pub fn optimizer(&self) -> OptimizerKind {
        self.optimizer
    }

    pub fn relax_cell(&self) -> bool {
        self.relax_cell
    }

    /// 弛豫一个结构
    pub fn relax(&self, crystal: &Crystal, options: &RelaxOptions) -> Result<RelaxOutcome> {
        let atoms = Atoms::new(crystal.clone(), self.calculator());
        let mut observer = TrajectoryObserver::new(&atoms);
        let mut target: Box<dyn Optimizable> = if self.relax_cell {
            Box::new(CellFilter::new(atoms)?)
        } else {
            Box::new(atoms)
        };
        let mut optimizer = self.optimizer.build();

        let mut steps = 0;
        loop {
            if let Some(deadline) = &options.deadline {
                deadline.check()?;
            }

            let forces = target.get_forces()?;
            let fmax = max_row_norm(&forces);
            if !fmax.is_finite() {
                return Err(LamOptError::Diverged(format!(
                    "non-finite forces at step {}",
                    steps
                )));
            }
            if fmax < options.fmax || steps >= options.steps {
                debug!(
                    "{}: stopped after {} steps (fmax {:.3e})",
                    crystal.name, steps, fmax
                );
                break;
            }

            optimizer.step(target.as_mut(), &forces)?;
            steps += 1;
            observer.observe(target.atoms_mut())?;
        }
        observer.observe(target.atoms_mut())?;

        if let Some(path) = &options.trajectory {
            observer.save(path)?;
        }

        let trajectory = observer.into_trajectory();
        let mut final_structure = target.into_atoms().into_crystal();
        final_structure.energy = trajectory.last_energy();

        Ok(RelaxOutcome {
            final_structure,
            trajectory,
            steps,
        })
    }
}
