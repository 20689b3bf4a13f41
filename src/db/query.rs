//! # 查询条件
//!
//! 把可选的筛选条件转换为 HTTP 查询参数（`formula`, `minEnergy`, `maxEnergy`,
//! `minSubmissionTime`, `maxSubmissionTime`），时间使用 ISO-8601 格式。
//!
//! ## 依赖关系
//! - 被 `db/client.rs`, `analysis/duplicate.rs`, `commands/query.rs` 使用

use chrono::{DateTime, Utc};

/// 默认每页条数
pub const DEFAULT_LIMIT: u32 = 10;

/// 结构数据库查询条件，所有字段可选
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureQuery {
    pub formula: Option<String>,
    pub min_energy: Option<f64>,
    pub max_energy: Option<f64>,
    pub min_submission_time: Option<DateTime<Utc>>,
    pub max_submission_time: Option<DateTime<Utc>>,
}

impl StructureQuery {
    /// 按化学式查询
    pub fn by_formula(formula: impl Into<String>) -> Self {
        StructureQuery {
            formula: Some(formula.into()),
            ..Default::default()
        }
    }

    /// 筛选条件对应的查询参数（不含分页与访问密钥）
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(formula) = &self.formula {
            params.push(("formula", formula.clone()));
        }
        if let Some(e) = self.min_energy {
            params.push(("minEnergy", e.to_string()));
        }
        if let Some(e) = self.max_energy {
            params.push(("maxEnergy", e.to_string()));
        }
        if let Some(t) = self.min_submission_time {
            params.push(("minSubmissionTime", t.to_rfc3339()));
        }
        if let Some(t) = self.max_submission_time {
            params.push(("maxSubmissionTime", t.to_rfc3339()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_empty_query_has_no_params() {
        assert!(StructureQuery::default().params().is_empty());
    }

    #[test]
    fn test_params_use_remote_names() {
        let query = StructureQuery {
            formula: Some("NaCl".to_string()),
            min_energy: Some(-5.5),
            max_submission_time: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            ..Default::default()
        };
        assert_eq!(
            query.params(),
            vec![
                ("formula", "NaCl".to_string()),
                ("minEnergy", "-5.5".to_string()),
                ("maxSubmissionTime", "2024-03-01T12:00:00+00:00".to_string()),
            ]
        );
    }
}
