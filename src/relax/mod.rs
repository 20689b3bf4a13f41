//! # 结构弛豫模块
//!
//! 在计算器给出的势能面上用经典优化器弛豫原子位置（可选同时弛豫晶胞），
//! 并记录完整轨迹。
//!
//! ## 依赖关系
//! - 被 `batch/pipeline.rs`, `commands/` 使用
//! - 使用 `calculators/`, `models/`
//! - 子模块: atoms, deadline, optimizers, relaxer, trajectory

pub mod atoms;
pub mod deadline;
pub mod optimizers;
pub mod relaxer;
pub mod trajectory;

pub use atoms::{Atoms, CellFilter, Optimizable};
pub use deadline::Deadline;
pub use optimizers::OptimizerKind;
pub use relaxer::{RelaxOptions, RelaxOutcome, Relaxer, DEFAULT_FMAX, DEFAULT_STEPS};
pub use trajectory::{Trajectory, TrajectoryObserver};
