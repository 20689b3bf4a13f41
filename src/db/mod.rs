//! # 远程结构数据库模块
//!
//! 查询 OpenLAM 结构库，用于判断弛豫后的结构是否已经存在。
//!
//! ## 依赖关系
//! - 被 `analysis/duplicate.rs`, `batch/pipeline.rs`, `commands/query.rs` 使用
//! - 子模块: client, query, record

pub mod client;
pub mod query;
pub mod record;

pub use client::{
    decode_envelope, query_all, DbConfig, IteratePage, OpenLamClient, QueryPage, StructureSource,
};
pub use query::{StructureQuery, DEFAULT_LIMIT};
pub use record::CrystalRecord;
