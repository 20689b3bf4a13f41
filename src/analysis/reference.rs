//! # 单质参考能量
//!
//! 每种元素一个离线预先算好的单质能量 (eV/atom)，用于计算形成能。
//! 表中缺失的元素无法计算形成能。
//!
//! ## 依赖关系
//! - 被 `analysis/convergence.rs` 使用

use crate::error::{LamOptError, Result};
use crate::models::Crystal;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 默认参考能量表 (eV/atom)
#[rustfmt::skip]
pub const ENERGY_REF: &[(&str, f64)] = &[
    ("Ne", -0.0259), ("He", -0.0091), ("Ar", -0.0688), ("F", -1.9115),
    ("O", -4.9467), ("Cl", -1.8485), ("N", -8.3365), ("Kr", -0.0567),
    ("Br", -1.553), ("I", -1.4734), ("Xe", -0.0362), ("S", -4.1364),
    ("Se", -3.4959), ("C", -9.2287), ("Au", -3.2739), ("W", -12.9581),
    ("Pb", -3.7126), ("Rh", -7.3643), ("Pt", -6.0711), ("Ru", -9.2744),
    ("Pd", -5.1799), ("Os", -11.2274), ("Ir", -8.8384), ("H", -3.3927),
    ("P", -5.4133), ("As", -4.6591), ("Mo", -10.8457), ("Te", -3.1433),
    ("Sb", -4.129), ("B", -6.6794), ("Bi", -3.8405), ("Ge", -4.623),
    ("Hg", -0.3037), ("Sn", -4.0096), ("Ag", -2.8326), ("Ni", -5.7801),
    ("Tc", -10.3606), ("Si", -5.4253), ("Re", -12.4445), ("Cu", -4.0992),
    ("Co", -7.1083), ("Fe", -8.47), ("Ga", -3.0281), ("In", -2.7517),
    ("Cd", -0.9229), ("Cr", -9.653), ("Zn", -1.2597), ("V", -9.0839),
    ("Tl", -2.3626), ("Al", -3.7456), ("Nb", -10.1013), ("Be", -3.7394),
    ("Mn", -9.162), ("Ti", -7.8955), ("Ta", -11.8578), ("Pa", -9.5147),
    ("U", -11.2914), ("Sc", -6.3325), ("Np", -12.9478), ("Zr", -8.5477),
    ("Mg", -1.6003), ("Th", -7.4139), ("Hf", -9.9572), ("Pu", -14.2678),
    ("Lu", -4.521), ("Tm", -4.4758), ("Er", -4.5677), ("Ho", -4.5824),
    ("Y", -6.4665), ("Dy", -4.6068), ("Gd", -14.0761), ("Eu", -10.257),
    ("Sm", -4.7186), ("Nd", -4.7681), ("Pr", -4.7809), ("Pm", -4.7505),
    ("Ce", -5.9331), ("Yb", -1.5396), ("Tb", -4.6344), ("La", -4.936),
    ("Ac", -4.1212), ("Ca", -2.0056), ("Li", -1.9089), ("Sr", -1.6895),
    ("Na", -1.3225), ("Ba", -1.919), ("Rb", -0.9805), ("K", -1.1104),
    ("Cs", -0.8954),
];

/// 参考能量表
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEnergies {
    table: BTreeMap<String, f64>,
}

impl Default for ReferenceEnergies {
    fn default() -> Self {
        ReferenceEnergies::from_pairs(ENERGY_REF.iter().map(|(el, e)| (el.to_string(), *e)))
    }
}

impl ReferenceEnergies {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, f64)>) -> Self {
        ReferenceEnergies {
            table: pairs.into_iter().collect(),
        }
    }

    /// 读取 `{"Na": -1.3225, ...}` 形式的 JSON，覆盖默认表中的同名元素
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| LamOptError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        let overrides: BTreeMap<String, f64> = serde_json::from_str(&content)?;
        let mut reference = ReferenceEnergies::default();
        reference.table.extend(overrides);
        Ok(reference)
    }

    pub fn get(&self, element: &str) -> Option<f64> {
        self.table.get(element).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// 结构中没有参考能量的元素
    pub fn missing_elements(&self, crystal: &Crystal) -> Vec<String> {
        crystal
            .composition()
            .into_keys()
            .filter(|el| !self.table.contains_key(el))
            .collect()
    }

    /// 每原子形成能 (E − Σ e_ref) / N；有元素缺失或结构为空时返回 None
    pub fn formation_energy_per_atom(&self, crystal: &Crystal, energy: f64) -> Option<f64> {
        if crystal.is_empty() {
            return None;
        }
        let mut reference = 0.0;
        for atom in &crystal.atoms {
            reference += self.get(&atom.element)?;
        }
        Some((energy - reference) / crystal.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::structure::fixtures::rock_salt;
    use crate::models::{Atom, Crystal, Lattice};

    #[test]
    fn test_default_table() {
        let reference = ReferenceEnergies::default();
        assert_eq!(reference.len(), ENERGY_REF.len());
        assert_eq!(reference.get("Na"), Some(-1.3225));
        assert_eq!(reference.get("Cl"), Some(-1.8485));
        assert_eq!(reference.get("Og"), None);
    }

    #[test]
    fn test_formation_energy_per_atom() {
        let reference = ReferenceEnergies::default();
        let crystal = rock_salt(5.64);
        let total = 4.0 * -1.3225 + 4.0 * -1.8485 - 8.0 * 0.5;
        let e_form = reference.formation_energy_per_atom(&crystal, total).unwrap();
        assert!((e_form + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_load_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.json");
        std::fs::write(&path, r#"{"Na": -1.5, "Po": -2.0}"#).unwrap();

        let reference = ReferenceEnergies::load(&path).unwrap();
        assert_eq!(reference.get("Na"), Some(-1.5));
        assert_eq!(reference.get("Po"), Some(-2.0));
        assert_eq!(reference.get("Cl"), Some(-1.8485));
        assert_eq!(reference.len(), ENERGY_REF.len() + 1);

        std::fs::write(&path, "not json").unwrap();
        assert!(ReferenceEnergies::load(&path).is_err());
    }

    #[test]
    fn test_missing_reference() {
        let lattice = Lattice::from_parameters(4.0, 4.0, 4.0, 90.0, 90.0, 90.0);
        let crystal = Crystal::new(
            "NaPo",
            lattice,
            vec![Atom::new("Na", [0.0; 3]), Atom::new("Po", [0.5; 3])],
        );
        let reference = ReferenceEnergies::default();
        assert_eq!(reference.missing_elements(&crystal), vec!["Po".to_string()]);
        assert!(reference.formation_energy_per_atom(&crystal, -3.0).is_none());
    }
}
