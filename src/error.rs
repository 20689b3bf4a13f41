//! # 统一错误处理模块
//!
//! 定义 lam-optimize 的所有错误类型，使用 `thiserror` 派生。
//!
//! ## 错误分类
//! - 输入解析错误：跳过该结构
//! - 弛豫错误（计算器、优化器、超时）：跳过该结构
//! - 远程查询错误：终止本批次的查重阶段
//! - 校验错误：删除该输出文件
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use std::time::Duration;
use thiserror::Error;

/// lam-optimize 统一错误类型
#[derive(Error, Debug)]
pub enum LamOptError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Unknown element symbol: {0}")]
    UnknownElement(String),

    // ─────────────────────────────────────────────────────────────
    // 计算器错误
    // ─────────────────────────────────────────────────────────────
    #[error("Unsupported potential '{0}' (available: lennard-jones, morse)")]
    UnsupportedPotential(String),

    #[error("Failed to load model {path}: {reason}")]
    InvalidModel { path: String, reason: String },

    #[error("Calculator '{calculator}' failed: {reason}")]
    Calculation { calculator: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // 弛豫错误
    // ─────────────────────────────────────────────────────────────
    #[error("Optimization diverged: {0}")]
    Diverged(String),

    #[error("Relaxation exceeded its deadline after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("Trajectory encoding error: {0}")]
    TrajectoryError(#[from] serde_cbor::Error),

    // ─────────────────────────────────────────────────────────────
    // 远程数据库错误
    // ─────────────────────────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Response code {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Query error code {code}: {message}")]
    QueryError { code: i64, message: String },

    #[error("Malformed remote record: {0}")]
    MalformedRecord(String),

    // ─────────────────────────────────────────────────────────────
    // 序列化错误
    // ─────────────────────────────────────────────────────────────
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    // ─────────────────────────────────────────────────────────────
    // 校验错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to launch validator '{command}': {source}")]
    ValidatorSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────
    // 参数错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, LamOptError>;
