//! # 批量处理模块
//!
//! 对一个目录下的全部结构执行弛豫、分类与输出校验。
//!
//! ## 功能
//! - 收集匹配文件列表（递归、glob 模式）
//! - 顺序弛豫，单个结构失败不影响整批
//! - 收敛性检查与查重，结果写入不同目录
//! - 子进程隔离的输出文件校验
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `indicatif` 显示进度
//! - 子模块: collector, pipeline, validation

pub mod collector;
pub mod pipeline;
pub mod validation;

pub use collector::{FileCollector, DEFAULT_PATTERN};
pub use pipeline::{
    single_point, BatchSummary, RelaxPipeline, RelaxRow, ResultTable, RunOptions, RunReport,
    SinglePoint, RELAXED_DIR, UNCONVERGED_DIR,
};
pub use validation::{ValidationGuard, ValidationOutcome, DEFAULT_VALIDATION_TIMEOUT};
