//! # 弛豫结果分析模块
//!
//! 对弛豫后的结构做两类判断：
//! - 收敛性：形成能与残余受力
//! - 新颖性：与远程结构库比对是否重复
//!
//! ## 依赖关系
//! - 被 `batch/pipeline.rs`, `commands/` 使用
//! - 使用 `calculators/`, `db/`, `models/`
//! - 子模块: convergence, duplicate, matcher, reference

pub mod convergence;
pub mod duplicate;
pub mod matcher;
pub mod reference;

pub use convergence::{ConvergenceChecker, ConvergenceCriteria, ConvergenceVerdict, Rejection};
pub use duplicate::{DuplicateChecker, DuplicateCriteria, DuplicateVerdict};
pub use matcher::StructureMatcher;
pub use reference::ReferenceEnergies;
