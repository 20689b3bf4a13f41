//! # pymatgen 结构字典 (JSON) 编解码
//!
//! 远程结构数据库以 pymatgen `Structure.as_dict()` 的 JSON 字符串返回结构；
//! 结果表中的结构也以同样格式写出，便于下游 Python 工具直接读取。
//!
//! ## 格式说明
//! ```text
//! {"@module": "pymatgen.core.structure", "@class": "Structure", "charge": 0,
//!  "lattice": {"matrix": [[..],[..],[..]], "pbc": [true,true,true], ...},
//!  "sites": [{"species": [{"element": "Na", "occu": 1}], "abc": [0,0,0],
//!             "xyz": [0,0,0], "label": "Na", "properties": {}}]}
//! ```
//!
//! ## 依赖关系
//! - 被 `db/`, `batch/pipeline.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{LamOptError, Result};
use crate::models::element::normalize_symbol;
use crate::models::{Atom, Crystal, Lattice};

use serde::{Deserialize, Serialize};

/// pymatgen 晶格字典
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatticeDict {
    pub matrix: [[f64; 3]; 3],
    #[serde(default = "default_pbc")]
    pub pbc: [bool; 3],
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub a: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub b: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alpha: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub beta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gamma: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub volume: Option<f64>,
}

fn default_pbc() -> [bool; 3] {
    [true, true, true]
}

/// 位点上的物种及占位
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesDict {
    pub element: String,
    #[serde(default = "default_occu")]
    pub occu: f64,
}

fn default_occu() -> f64 {
    1.0
}

/// pymatgen 位点字典
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteDict {
    pub species: Vec<SpeciesDict>,
    pub abc: [f64; 3],
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub xyz: Option<[f64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// pymatgen 结构字典
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureDict {
    #[serde(rename = "@module", default = "default_module")]
    pub module: String,
    #[serde(rename = "@class", default = "default_class")]
    pub class: String,
    #[serde(default)]
    pub charge: f64,
    pub lattice: LatticeDict,
    pub sites: Vec<SiteDict>,
}

fn default_module() -> String {
    "pymatgen.core.structure".to_string()
}

fn default_class() -> String {
    "Structure".to_string()
}

impl StructureDict {
    /// 由晶体结构生成字典
    pub fn from_crystal(crystal: &Crystal) -> Self {
        let (a, b, c, alpha, beta, gamma) = crystal.lattice.parameters();
        let lattice = LatticeDict {
            matrix: crystal.lattice.matrix,
            pbc: default_pbc(),
            a: Some(a),
            b: Some(b),
            c: Some(c),
            alpha: Some(alpha),
            beta: Some(beta),
            gamma: Some(gamma),
            volume: Some(crystal.volume()),
        };

        let sites = crystal
            .atoms
            .iter()
            .map(|atom| SiteDict {
                species: vec![SpeciesDict {
                    element: atom.element.clone(),
                    occu: 1.0,
                }],
                abc: atom.position,
                xyz: Some(crystal.lattice.to_cartesian(atom.position)),
                label: Some(atom.label.clone().unwrap_or_else(|| atom.element.clone())),
                properties: serde_json::Map::new(),
            })
            .collect();

        StructureDict {
            module: default_module(),
            class: default_class(),
            charge: 0.0,
            lattice,
            sites,
        }
    }

    /// 转换为晶体结构；无序位点（多物种或部分占位）视为错误
    pub fn to_crystal(&self, name: &str) -> Result<Crystal> {
        let mut atoms = Vec::with_capacity(self.sites.len());
        for (i, site) in self.sites.iter().enumerate() {
            let species = match site.species.as_slice() {
                [single] if (single.occu - 1.0).abs() < 1e-6 => single,
                _ => {
                    return Err(LamOptError::InvalidStructure(format!(
                        "{}: site {} is disordered",
                        name, i
                    )))
                }
            };
            let element = normalize_symbol(&species.element)?;
            let mut atom = Atom::new(element, site.abc);
            atom.label = site.label.clone();
            atoms.push(atom);
        }

        Ok(Crystal::new(
            name,
            Lattice::from_vectors(self.lattice.matrix),
            atoms,
        ))
    }
}

/// 解析 pymatgen 结构 JSON 字符串
pub fn structure_from_json(json: &str, name: &str) -> Result<Crystal> {
    let dict: StructureDict = serde_json::from_str(json)?;
    dict.to_crystal(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::structure::fixtures::rock_salt;

    #[test]
    fn test_parse_pymatgen_json() {
        let json = r#"{
            "@module": "pymatgen.core.structure",
            "@class": "Structure",
            "charge": 0,
            "lattice": {"matrix": [[3.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 3.0]],
                        "pbc": [true, true, true], "a": 3.0, "b": 3.0, "c": 3.0,
                        "alpha": 90.0, "beta": 90.0, "gamma": 90.0, "volume": 27.0},
            "properties": {},
            "sites": [
                {"species": [{"element": "Cs", "occu": 1}], "abc": [0.0, 0.0, 0.0],
                 "xyz": [0.0, 0.0, 0.0], "label": "Cs", "properties": {}},
                {"species": [{"element": "Cl", "oxidation_state": -1, "occu": 1}],
                 "abc": [0.5, 0.5, 0.5], "properties": {"magmom": 0.0}}
            ]
        }"#;
        let crystal = structure_from_json(json, "CsCl").unwrap();
        assert_eq!(crystal.atoms.len(), 2);
        assert_eq!(crystal.reduced_formula(), "CsCl");
        assert!((crystal.volume() - 27.0).abs() < 1e-9);
        assert_eq!(crystal.atoms[1].label, None);
    }

    #[test]
    fn test_disordered_site_rejected() {
        let json = r#"{"lattice": {"matrix": [[3,0,0],[0,3,0],[0,0,3]]},
            "sites": [{"species": [{"element": "Fe", "occu": 0.5}, {"element": "Ni", "occu": 0.5}],
                       "abc": [0,0,0]}]}"#;
        assert!(structure_from_json(json, "x").is_err());
    }

    #[test]
    fn test_dict_from_crystal_carries_cartesian_sites() {
        let crystal = rock_salt(4.0);
        let dict = StructureDict::from_crystal(&crystal);
        assert_eq!(dict.sites.len(), 8);
        let xyz = dict.sites[7].xyz.unwrap();
        assert!(xyz.iter().all(|x| (x - 2.0).abs() < 1e-9));
        assert!((dict.lattice.volume.unwrap() - 64.0).abs() < 1e-9);

        let back = dict.to_crystal("NaCl").unwrap();
        assert_eq!(back.lattice, crystal.lattice);
        assert_eq!(back.formula(), crystal.formula());
    }
}
