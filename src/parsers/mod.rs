//! # 解析器模块
//!
//! 结构编解码：CIF 文本格式与 pymatgen 结构字典。
//!
//! ## 依赖关系
//! - 被 `batch/`, `db/`, `commands/` 模块使用
//! - 使用 `models/` 数据模型
//! - 子模块: cif, pymatgen

pub mod cif;
pub mod pymatgen;

use crate::error::{LamOptError, Result};
use crate::models::Crystal;
use std::path::Path;

/// 从文件路径推断格式并解析
pub fn parse_structure_file(path: &Path) -> Result<Crystal> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "cif" => cif::parse_cif_file(path),
        "json" => {
            let content =
                std::fs::read_to_string(path).map_err(|e| LamOptError::FileReadError {
                    path: path.display().to_string(),
                    source: e,
                })?;
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown");
            pymatgen::structure_from_json(&content, name)
        }
        _ => Err(LamOptError::ParseError {
            format: ext,
            path: path.display().to_string(),
            reason: "Unsupported structure format (expected .cif or pymatgen .json)".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::structure::fixtures::rock_salt;
    use std::fs;

    #[test]
    fn test_dispatch_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let crystal = rock_salt(5.64);

        let cif_path = dir.path().join("a.cif");
        fs::write(&cif_path, cif::to_cif_string(&crystal)).unwrap();
        assert_eq!(parse_structure_file(&cif_path).unwrap().atoms.len(), 8);

        let json_path = dir.path().join("b.json");
        fs::write(&json_path, serde_json::to_string(&pymatgen::StructureDict::from_crystal(&crystal)).unwrap()).unwrap();
        let parsed = parse_structure_file(&json_path).unwrap();
        assert_eq!(parsed.name, "b");
        assert_eq!(parsed.formula(), "Na4Cl4");

        let other = dir.path().join("c.xyz");
        fs::write(&other, "1\n\nH 0 0 0\n").unwrap();
        assert!(parse_structure_file(&other).is_err());
    }
}
