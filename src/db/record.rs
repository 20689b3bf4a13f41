//! # 远程结构记录
//!
//! 服务端返回的每一条记录形如
//! `{ "formula": ..., "structure": "<pymatgen JSON 字符串>", "energy": ..., "submissionTime": ... }`。
//! `structure` 字段是再次编码的 JSON 字符串，需要二次解析。
//!
//! ## 依赖关系
//! - 被 `db/client.rs`, `analysis/duplicate.rs` 使用
//! - 使用 `parsers/pymatgen.rs`

use crate::error::{LamOptError, Result};
use crate::models::Crystal;
use crate::parsers::pymatgen::structure_from_json;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

/// 服务端原始记录
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    pub formula: String,
    pub structure: String,
    pub energy: f64,
    pub submission_time: String,
}

/// 解码后的结构记录
#[derive(Debug, Clone)]
pub struct CrystalRecord {
    pub formula: String,
    pub structure: Crystal,
    /// 整个结构的总能量 (eV)
    pub energy: f64,
    pub submission_time: DateTime<Utc>,
}

impl CrystalRecord {
    pub fn from_raw(raw: RawRecord) -> Result<Self> {
        let mut structure = structure_from_json(&raw.structure, &raw.formula)
            .map_err(|e| LamOptError::MalformedRecord(format!("{}: {}", raw.formula, e)))?;
        structure.energy = Some(raw.energy);
        let submission_time = parse_submission_time(&raw.submission_time)?;
        Ok(CrystalRecord {
            formula: raw.formula,
            structure,
            energy: raw.energy,
            submission_time,
        })
    }

    /// 每原子能量
    pub fn energy_per_atom(&self) -> f64 {
        self.energy / self.structure.len().max(1) as f64
    }
}

/// 解析提交时间；不带时区的时间按 UTC 处理
pub fn parse_submission_time(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(t.and_utc());
        }
    }
    Err(LamOptError::MalformedRecord(format!(
        "invalid submission time '{}'",
        raw
    )))
}
