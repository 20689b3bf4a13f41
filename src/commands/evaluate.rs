//! # evaluate 命令实现
//!
//! 对每个结构做单点计算，结果按名称写入 JSON。
//!
//! ## 依赖关系
//! - 使用 `cli/evaluate.rs` 定义的参数
//! - 使用 `batch/pipeline.rs` 的 `single_point`

use crate::batch::single_point;
use crate::cli::evaluate::EvaluateArgs;
use crate::error::{LamOptError, Result};
use crate::utils::output;

use std::fs;

/// 执行 evaluate 命令
pub fn execute(args: EvaluateArgs) -> Result<()> {
    output::print_header("Single-Point Evaluation");

    let spec = args.calculator.spec()?;
    let calculator = spec.build()?;
    output::print_setting("calculator", &spec.to_string());

    let results = single_point(calculator.as_ref(), &args.input, &args.pattern)?;
    if results.is_empty() {
        output::print_warning("No structure could be evaluated.");
    }

    let json = serde_json::to_string_pretty(&results)?;
    fs::write(&args.output, json).map_err(|e| LamOptError::FileWriteError {
        path: args.output.display().to_string(),
        source: e,
    })?;

    output::print_done(&format!(
        "Evaluated {} structures into '{}'",
        results.len(),
        args.output.display()
    ));
    Ok(())
}
