//! # 美化输出工具
//!
//! 终端状态行统一为 `[TAG] message`。结果表与状态行写 stdout，
//! 警告与错误写 stderr，便于重定向结果。
//!
//! ## 依赖关系
//! - 被 `main.rs`, `commands/` 模块使用
//! - 使用 `colored` crate

use colored::{ColoredString, Colorize};

const RULE_WIDTH: usize = 60;

fn line(tag: ColoredString, msg: &str) -> String {
    format!("{} {}", tag, msg)
}

pub fn print_success(msg: &str) {
    println!("{}", line("[OK]".green().bold(), msg));
}

pub fn print_error(msg: &str) {
    eprintln!("{}", line("[ERR]".red().bold(), msg));
}

pub fn print_warning(msg: &str) {
    eprintln!("{}", line("[WARN]".yellow().bold(), msg));
}

pub fn print_info(msg: &str) {
    println!("{}", line("[*]".blue().bold(), msg));
}

pub fn print_done(msg: &str) {
    println!("{}", line("[DONE]".green().bold(), msg));
}

/// 被跳过的输入及原因
pub fn print_skipped(path: &str, reason: &str) {
    eprintln!(
        "{}",
        line("[SKIP]".dimmed(), &format!("{} {}", path, reason.dimmed()))
    );
}

/// 运行参数，如 `calculator   lennard-jones`
pub fn print_setting(key: &str, value: &str) {
    println!("    {:<14}{}", key.dimmed(), value);
}

/// 写出的文件
pub fn print_written(what: &str, path: &str) {
    println!(
        "{}",
        line("[OK]".green().bold(), &format!("{} {} {}", what.dimmed(), "->".cyan(), path))
    );
}

/// 打印标题栏
pub fn print_header(title: &str) {
    let rule = "─".repeat(RULE_WIDTH);
    println!("\n{}", rule.dimmed());
    println!("  {}", title.bold());
    println!("{}\n", rule.dimmed());
}
