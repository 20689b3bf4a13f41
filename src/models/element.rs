//! # 元素周期表数据
//!
//! 提供元素符号、原子序数与 Pauling 电负性，用于：
//! - 轨迹文件中的原子序数序列
//! - 约化化学式的元素排序（与 pymatgen 一致：按电负性、再按符号）
//!
//! ## 依赖关系
//! - 被 `models/structure.rs`, `parsers/cif.rs` 使用
//! - 无外部模块依赖

use crate::error::{LamOptError, Result};

/// 单个元素的静态数据
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub symbol: &'static str,
    pub atomic_number: u8,
    /// Pauling 电负性；惰性气体等无数据时为 `f64::INFINITY`
    pub electronegativity: f64,
}

const NO_X: f64 = f64::INFINITY;

#[rustfmt::skip]
static ELEMENTS: [Element; 103] = [
    Element { symbol: "H",  atomic_number: 1,   electronegativity: 2.20 },
    Element { symbol: "He", atomic_number: 2,   electronegativity: NO_X },
    Element { symbol: "Li", atomic_number: 3,   electronegativity: 0.98 },
    Element { symbol: "Be", atomic_number: 4,   electronegativity: 1.57 },
    Element { symbol: "B",  atomic_number: 5,   electronegativity: 2.04 },
    Element { symbol: "C",  atomic_number: 6,   electronegativity: 2.55 },
    Element { symbol: "N",  atomic_number: 7,   electronegativity: 3.04 },
    Element { symbol: "O",  atomic_number: 8,   electronegativity: 3.44 },
    Element { symbol: "F",  atomic_number: 9,   electronegativity: 3.98 },
    Element { symbol: "Ne", atomic_number: 10,  electronegativity: NO_X },
    Element { symbol: "Na", atomic_number: 11,  electronegativity: 0.93 },
    Element { symbol: "Mg", atomic_number: 12,  electronegativity: 1.31 },
    Element { symbol: "Al", atomic_number: 13,  electronegativity: 1.61 },
    Element { symbol: "Si", atomic_number: 14,  electronegativity: 1.90 },
    Element { symbol: "P",  atomic_number: 15,  electronegativity: 2.19 },
    Element { symbol: "S",  atomic_number: 16,  electronegativity: 2.58 },
    Element { symbol: "Cl", atomic_number: 17,  electronegativity: 3.16 },
    Element { symbol: "Ar", atomic_number: 18,  electronegativity: NO_X },
    Element { symbol: "K",  atomic_number: 19,  electronegativity: 0.82 },
    Element { symbol: "Ca", atomic_number: 20,  electronegativity: 1.00 },
    Element { symbol: "Sc", atomic_number: 21,  electronegativity: 1.36 },
    Element { symbol: "Ti", atomic_number: 22,  electronegativity: 1.54 },
    Element { symbol: "V",  atomic_number: 23,  electronegativity: 1.63 },
    Element { symbol: "Cr", atomic_number: 24,  electronegativity: 1.66 },
    Element { symbol: "Mn", atomic_number: 25,  electronegativity: 1.55 },
    Element { symbol: "Fe", atomic_number: 26,  electronegativity: 1.83 },
    Element { symbol: "Co", atomic_number: 27,  electronegativity: 1.88 },
    Element { symbol: "Ni", atomic_number: 28,  electronegativity: 1.91 },
    Element { symbol: "Cu", atomic_number: 29,  electronegativity: 1.90 },
    Element { symbol: "Zn", atomic_number: 30,  electronegativity: 1.65 },
    Element { symbol: "Ga", atomic_number: 31,  electronegativity: 1.81 },
    Element { symbol: "Ge", atomic_number: 32,  electronegativity: 2.01 },
    Element { symbol: "As", atomic_number: 33,  electronegativity: 2.18 },
    Element { symbol: "Se", atomic_number: 34,  electronegativity: 2.55 },
    Element { symbol: "Br", atomic_number: 35,  electronegativity: 2.96 },
    Element { symbol: "Kr", atomic_number: 36,  electronegativity: 3.00 },
    Element { symbol: "Rb", atomic_number: 37,  electronegativity: 0.82 },
    Element { symbol: "Sr", atomic_number: 38,  electronegativity: 0.95 },
    Element { symbol: "Y",  atomic_number: 39,  electronegativity: 1.22 },
    Element { symbol: "Zr", atomic_number: 40,  electronegativity: 1.33 },
    Element { symbol: "Nb", atomic_number: 41,  electronegativity: 1.60 },
    Element { symbol: "Mo", atomic_number: 42,  electronegativity: 2.16 },
    Element { symbol: "Tc", atomic_number: 43,  electronegativity: 1.90 },
    Element { symbol: "Ru", atomic_number: 44,  electronegativity: 2.20 },
    Element { symbol: "Rh", atomic_number: 45,  electronegativity: 2.28 },
    Element { symbol: "Pd", atomic_number: 46,  electronegativity: 2.20 },
    Element { symbol: "Ag", atomic_number: 47,  electronegativity: 1.93 },
    Element { symbol: "Cd", atomic_number: 48,  electronegativity: 1.69 },
    Element { symbol: "In", atomic_number: 49,  electronegativity: 1.78 },
    Element { symbol: "Sn", atomic_number: 50,  electronegativity: 1.96 },
    Element { symbol: "Sb", atomic_number: 51,  electronegativity: 2.05 },
    Element { symbol: "Te", atomic_number: 52,  electronegativity: 2.10 },
    Element { symbol: "I",  atomic_number: 53,  electronegativity: 2.66 },
    Element { symbol: "Xe", atomic_number: 54,  electronegativity: 2.60 },
    Element { symbol: "Cs", atomic_number: 55,  electronegativity: 0.79 },
    Element { symbol: "Ba", atomic_number: 56,  electronegativity: 0.89 },
    Element { symbol: "La", atomic_number: 57,  electronegativity: 1.10 },
    Element { symbol: "Ce", atomic_number: 58,  electronegativity: 1.12 },
    Element { symbol: "Pr", atomic_number: 59,  electronegativity: 1.13 },
    Element { symbol: "Nd", atomic_number: 60,  electronegativity: 1.14 },
    Element { symbol: "Pm", atomic_number: 61,  electronegativity: 1.13 },
    Element { symbol: "Sm", atomic_number: 62,  electronegativity: 1.17 },
    Element { symbol: "Eu", atomic_number: 63,  electronegativity: 1.20 },
    Element { symbol: "Gd", atomic_number: 64,  electronegativity: 1.20 },
    Element { symbol: "Tb", atomic_number: 65,  electronegativity: 1.10 },
    Element { symbol: "Dy", atomic_number: 66,  electronegativity: 1.22 },
    Element { symbol: "Ho", atomic_number: 67,  electronegativity: 1.23 },
    Element { symbol: "Er", atomic_number: 68,  electronegativity: 1.24 },
    Element { symbol: "Tm", atomic_number: 69,  electronegativity: 1.25 },
    Element { symbol: "Yb", atomic_number: 70,  electronegativity: 1.10 },
    Element { symbol: "Lu", atomic_number: 71,  electronegativity: 1.27 },
    Element { symbol: "Hf", atomic_number: 72,  electronegativity: 1.30 },
    Element { symbol: "Ta", atomic_number: 73,  electronegativity: 1.50 },
    Element { symbol: "W",  atomic_number: 74,  electronegativity: 2.36 },
    Element { symbol: "Re", atomic_number: 75,  electronegativity: 1.90 },
    Element { symbol: "Os", atomic_number: 76,  electronegativity: 2.20 },
    Element { symbol: "Ir", atomic_number: 77,  electronegativity: 2.20 },
    Element { symbol: "Pt", atomic_number: 78,  electronegativity: 2.28 },
    Element { symbol: "Au", atomic_number: 79,  electronegativity: 2.54 },
    Element { symbol: "Hg", atomic_number: 80,  electronegativity: 2.00 },
    Element { symbol: "Tl", atomic_number: 81,  electronegativity: 1.62 },
    Element { symbol: "Pb", atomic_number: 82,  electronegativity: 2.33 },
    Element { symbol: "Bi", atomic_number: 83,  electronegativity: 2.02 },
    Element { symbol: "Po", atomic_number: 84,  electronegativity: 2.00 },
    Element { symbol: "At", atomic_number: 85,  electronegativity: 2.20 },
    Element { symbol: "Rn", atomic_number: 86,  electronegativity: 2.20 },
    Element { symbol: "Fr", atomic_number: 87,  electronegativity: 0.70 },
    Element { symbol: "Ra", atomic_number: 88,  electronegativity: 0.90 },
    Element { symbol: "Ac", atomic_number: 89,  electronegativity: 1.10 },
    Element { symbol: "Th", atomic_number: 90,  electronegativity: 1.30 },
    Element { symbol: "Pa", atomic_number: 91,  electronegativity: 1.50 },
    Element { symbol: "U",  atomic_number: 92,  electronegativity: 1.38 },
    Element { symbol: "Np", atomic_number: 93,  electronegativity: 1.36 },
    Element { symbol: "Pu", atomic_number: 94,  electronegativity: 1.28 },
    Element { symbol: "Am", atomic_number: 95,  electronegativity: 1.30 },
    Element { symbol: "Cm", atomic_number: 96,  electronegativity: 1.30 },
    Element { symbol: "Bk", atomic_number: 97,  electronegativity: 1.30 },
    Element { symbol: "Cf", atomic_number: 98,  electronegativity: 1.30 },
    Element { symbol: "Es", atomic_number: 99,  electronegativity: 1.30 },
    Element { symbol: "Fm", atomic_number: 100, electronegativity: 1.30 },
    Element { symbol: "Md", atomic_number: 101, electronegativity: 1.30 },
    Element { symbol: "No", atomic_number: 102, electronegativity: 1.30 },
    Element { symbol: "Lr", atomic_number: 103, electronegativity: 1.30 },
];

impl Element {
    /// 按符号查找（区分大小写，需为规范写法）
    pub fn from_symbol(symbol: &str) -> Option<&'static Element> {
        ELEMENTS.iter().find(|e| e.symbol == symbol)
    }
}

/// 从 CIF 类型符号或标签中提取元素符号
///
/// `"Fe2+"` -> `"Fe"`, `"O1"` -> `"O"`, `"CL"` -> `"Cl"`
pub fn normalize_symbol(raw: &str) -> Result<&'static str> {
    let letters: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();

    if letters.is_empty() {
        return Err(LamOptError::UnknownElement(raw.to_string()));
    }

    // 先尝试两字母符号，再退回单字母（如 "Os" vs "O" + 标签字母）
    let mut chars = letters.chars();
    let first = chars.next().map(|c| c.to_ascii_uppercase());
    let second = chars.next().map(|c| c.to_ascii_lowercase());

    if let (Some(f), Some(s)) = (first, second) {
        let two: String = [f, s].iter().collect();
        if let Some(el) = Element::from_symbol(&two) {
            return Ok(el.symbol);
        }
    }
    if let Some(f) = first {
        if let Some(el) = Element::from_symbol(&f.to_string()) {
            return Ok(el.symbol);
        }
    }

    Err(LamOptError::UnknownElement(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_ordered_by_atomic_number() {
        for (i, el) in ELEMENTS.iter().enumerate() {
            assert_eq!(el.atomic_number as usize, i + 1, "{}", el.symbol);
        }
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("Fe2+").unwrap(), "Fe");
        assert_eq!(normalize_symbol("O1").unwrap(), "O");
        assert_eq!(normalize_symbol("CL").unwrap(), "Cl");
        assert_eq!(normalize_symbol("Na").unwrap(), "Na");
        assert!(normalize_symbol("123").is_err());
    }
}
