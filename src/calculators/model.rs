//! # 模型文件加载
//!
//! 模型文件是描述对势的 JSON 文档，作为冻结模型的替身：
//!
//! ```text
//! {
//!   "name": "nacl-morse",
//!   "cutoff": 6.0,
//!   "default": {"kind": "morse", "d": 0.3, "alpha": 1.4, "r0": 2.9},
//!   "pairs": [{"species": ["Na", "Cl"], "function": {"kind": "lennard-jones", "epsilon": 0.1, "sigma": 2.5}}],
//!   "atomic_energies": {"Na": -1.3, "Cl": -1.8}
//! }
//! ```
//!
//! ## 依赖关系
//! - 被 `calculators/mod.rs` 使用
//! - 使用 `serde_json` 解析

use super::pair::{PairFunction, PairPotential};
use crate::error::{LamOptError, Result};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairEntry {
    pub species: [String; 2],
    pub function: PairFunction,
}

/// 模型文件内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    #[serde(default)]
    pub name: Option<String>,
    pub cutoff: f64,
    pub default: PairFunction,
    #[serde(default)]
    pub pairs: Vec<PairEntry>,
    #[serde(default)]
    pub atomic_energies: BTreeMap<String, f64>,
}

impl ModelFile {
    fn into_potential(self, fallback_name: &str) -> PairPotential {
        let name = self.name.unwrap_or_else(|| fallback_name.to_string());
        let mut potential = PairPotential::new(name, self.cutoff, self.default);
        for entry in &self.pairs {
            potential = potential.with_pair(&entry.species[0], &entry.species[1], entry.function);
        }
        for (element, energy) in &self.atomic_energies {
            potential = potential.with_atomic_energy(element, *energy);
        }
        potential
    }
}

/// 加载模型文件；缺失、不可读或格式错误都视为构造失败
pub fn load_model(path: &Path) -> Result<PairPotential> {
    let invalid = |reason: String| LamOptError::InvalidModel {
        path: path.display().to_string(),
        reason,
    };

    let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let model: ModelFile = serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;

    if !(model.cutoff.is_finite() && model.cutoff > 0.0) {
        return Err(invalid(format!("cutoff must be positive, got {}", model.cutoff)));
    }

    let fallback = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model")
        .to_string();
    Ok(model.into_potential(&fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculators::Calculator;
    use crate::models::structure::fixtures::rock_salt;
    use std::fs;

    #[test]
    fn test_load_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nacl.json");
        fs::write(
            &path,
            r#"{
                "cutoff": 6.0,
                "default": {"kind": "morse", "d": 0.3429, "alpha": 1.3588, "r0": 2.866},
                "pairs": [{"species": ["Na", "Cl"],
                           "function": {"kind": "lennard-jones", "epsilon": 0.05, "sigma": 2.5}}],
                "atomic_energies": {"Na": -1.0}
            }"#,
        )
        .unwrap();

        let potential = load_model(&path).unwrap();
        assert_eq!(potential.name(), "nacl");
        assert_eq!(potential.cutoff(), 6.0);
        let results = potential.calculate(&rock_salt(5.64)).unwrap();
        assert!(results.energy.is_finite());
        assert_eq!(results.forces.len(), 8);
    }

    #[test]
    fn test_malformed_model_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"cutoff": 6.0, "default": {"kind": "buckingham"}}"#).unwrap();
        assert!(matches!(load_model(&path), Err(LamOptError::InvalidModel { .. })));

        fs::write(
            &path,
            r#"{"cutoff": -1.0, "default": {"kind": "morse", "d": 1, "alpha": 1, "r0": 2}}"#,
        )
        .unwrap();
        assert!(matches!(load_model(&path), Err(LamOptError::InvalidModel { .. })));
    }
}
