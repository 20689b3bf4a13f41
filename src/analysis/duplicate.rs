//! # 查重
//!
//! 对每个已收敛的结构：
//! 1. 用约化化学式从远程库取回全部同组成记录
//! 2. 每原子能量相对差 > 5% 的记录直接跳过
//! 3. 其余记录交给结构匹配器，任一匹配即视为重复
//!
//! 远程查询失败时整个查重阶段终止，由调用方决定如何处理。
//!
//! ## 依赖关系
//! - 被 `batch/pipeline.rs` 使用
//! - 使用 `analysis/matcher.rs`, `db/`

use super::matcher::StructureMatcher;
use crate::db::{query_all, CrystalRecord, StructureQuery, StructureSource, DEFAULT_LIMIT};
use crate::error::Result;
use crate::models::Crystal;

use tracing::debug;

/// 每原子能量相对容差
pub const ENERGY_TOLERANCE: f64 = 0.05;

/// 查重参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateCriteria {
    pub energy_tolerance: f64,
    pub matcher: StructureMatcher,
    /// 每次分页请求的条数
    pub page_limit: u32,
}

impl Default for DuplicateCriteria {
    fn default() -> Self {
        DuplicateCriteria {
            energy_tolerance: ENERGY_TOLERANCE,
            matcher: StructureMatcher::default(),
            page_limit: DEFAULT_LIMIT,
        }
    }
}

impl DuplicateCriteria {
    /// 两个每原子能量是否足够接近，值得做结构比对
    pub fn energies_close(&self, known: f64, candidate: f64) -> bool {
        let scale = known.abs().max(candidate.abs());
        if scale == 0.0 {
            return true;
        }
        (known - candidate).abs() / scale <= self.energy_tolerance
    }
}

/// 查重结果
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateVerdict {
    /// 远程同组成记录数
    pub candidates: usize,
    /// 匹配上的记录化学式与能量
    pub matched: Option<(String, f64)>,
}

impl DuplicateVerdict {
    pub fn is_duplicate(&self) -> bool {
        self.matched.is_some()
    }
}

/// 查重器
pub struct DuplicateChecker<'a> {
    source: &'a dyn StructureSource,
    criteria: DuplicateCriteria,
}

impl<'a> DuplicateChecker<'a> {
    pub fn new(source: &'a dyn StructureSource, criteria: DuplicateCriteria) -> Self {
        DuplicateChecker { source, criteria }
    }

    /// 在给定记录中寻找与候选结构重复的一条
    pub fn find_match<'r>(
        &self,
        candidate: &Crystal,
        energy_per_atom: f64,
        records: &'r [CrystalRecord],
    ) -> Option<&'r CrystalRecord> {
        records.iter().find(|record| {
            if !self
                .criteria
                .energies_close(record.energy_per_atom(), energy_per_atom)
            {
                return false;
            }
            self.criteria.matcher.fit(&record.structure, candidate)
        })
    }

    /// 查询远程库并判断是否重复
    pub fn check(&self, crystal: &Crystal, energy: f64) -> Result<DuplicateVerdict> {
        let formula = crystal.reduced_formula();
        let query = StructureQuery::by_formula(formula.as_str());
        let records = query_all(self.source, &query, self.criteria.page_limit)?;
        let energy_per_atom = energy / crystal.len().max(1) as f64;

        let matched = self
            .find_match(crystal, energy_per_atom, &records)
            .map(|record| (record.formula.clone(), record.energy));
        debug!(
            "{}: {} known {} structures, duplicate = {}",
            crystal.name,
            records.len(),
            formula,
            matched.is_some()
        );
        Ok(DuplicateVerdict {
            candidates: records.len(),
            matched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::client::fakes::InMemorySource;
    use crate::error::LamOptError;
    use crate::models::structure::fixtures::rock_salt;
    use chrono::Utc;

    fn known(formula: &str, crystal: Crystal, energy_per_atom: f64) -> CrystalRecord {
        let energy = energy_per_atom * crystal.len() as f64;
        CrystalRecord {
            formula: formula.to_string(),
            structure: crystal,
            energy,
            submission_time: Utc::now(),
        }
    }

    #[test]
    fn test_energy_gate() {
        let criteria = DuplicateCriteria::default();
        assert!(criteria.energies_close(-3.0, -3.03));
        assert!(!criteria.energies_close(-3.0, -3.3));
        assert!(criteria.energies_close(0.0, 0.0));
    }

    #[test]
    fn test_same_structure_close_energy_is_duplicate() {
        let source = InMemorySource::new(vec![known("NaCl", rock_salt(5.64), -3.40)]);
        let checker = DuplicateChecker::new(&source, DuplicateCriteria::default());

        let candidate = rock_salt(5.70);
        let verdict = checker.check(&candidate, -3.366 * 8.0).unwrap();
        assert!(verdict.is_duplicate());
        assert_eq!(verdict.candidates, 1);
    }

    #[test]
    fn test_energy_gap_skips_structure_match() {
        let source = InMemorySource::new(vec![known("NaCl", rock_salt(5.64), -3.40)]);
        let checker = DuplicateChecker::new(&source, DuplicateCriteria::default());

        let verdict = checker.check(&rock_salt(5.64), -3.06 * 8.0).unwrap();
        assert!(!verdict.is_duplicate());
        assert_eq!(verdict.candidates, 1);
    }

    #[test]
    fn test_query_uses_reduced_formula() {
        let source = InMemorySource::new(vec![known("KCl", rock_salt(5.64), -3.40)]);
        let checker = DuplicateChecker::new(&source, DuplicateCriteria::default());

        let verdict = checker.check(&rock_salt(5.64), -3.40 * 8.0).unwrap();
        assert_eq!(verdict.candidates, 0);
        assert!(!verdict.is_duplicate());
    }

    #[test]
    fn test_remote_failure_is_an_error() {
        let source = InMemorySource::failing();
        let checker = DuplicateChecker::new(&source, DuplicateCriteria::default());
        assert!(matches!(
            checker.check(&rock_salt(5.64), -27.0),
            Err(LamOptError::HttpStatus { .. })
        ));
    }
}
