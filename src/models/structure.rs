//! # 晶体结构数据模型
//!
//! 定义统一的晶体结构表示（即弛豫流程中的 Configuration），
//! 可以从 CIF / pymatgen 字典解析并写回。
//!
//! ## 约定
//! - 晶格矩阵按行存放 a, b, c 向量（Å）
//! - 原子位置为分数坐标
//!
//! ## 依赖关系
//! - 被 `parsers/`, `calculators/`, `relax/`, `analysis/` 使用
//! - 使用 `models/element.rs` 排序化学式

use super::element::Element;
use crate::error::Result;

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 晶格参数表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    /// 从晶格参数 (a, b, c, alpha, beta, gamma) 创建晶格
    /// 角度单位：度
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let cos_gamma = gamma.to_radians().cos();
        let sin_gamma = gamma.to_radians().sin();

        let a_vec = [a, 0.0, 0.0];
        let b_vec = [b * cos_gamma, b * sin_gamma, 0.0];

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3 = (c * c - c1 * c1 - c2 * c2).sqrt();

        Lattice {
            matrix: [a_vec, b_vec, [c1, c2, c3]],
        }
    }

    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 转换为 nalgebra 矩阵（行 = 晶格向量）
    pub fn to_matrix(&self) -> Matrix3<f64> {
        let m = self.matrix;
        Matrix3::new(
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
        )
    }

    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        Lattice {
            matrix: [
                [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
                [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
                [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
            ],
        }
    }

    /// 获取晶格参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [a_vec, b_vec, c_vec] = self.matrix;

        let a = norm(a_vec);
        let b = norm(b_vec);
        let c = norm(c_vec);

        let alpha = (dot(b_vec, c_vec) / (b * c)).acos().to_degrees();
        let beta = (dot(a_vec, c_vec) / (a * c)).acos().to_degrees();
        let gamma = (dot(a_vec, b_vec) / (a * b)).acos().to_degrees();

        (a, b, c, alpha, beta, gamma)
    }

    /// 计算晶格体积（带符号，右手系为正）
    pub fn volume(&self) -> f64 {
        let [a, b, c] = self.matrix;
        a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0])
            + a[2] * (b[0] * c[1] - b[1] * c[0])
    }

    /// 三个方向上的晶面间距 V / |b x c| 等，用于确定周期镜像范围
    pub fn perpendicular_widths(&self) -> [f64; 3] {
        let [a, b, c] = self.matrix;
        let v = self.volume().abs();
        [v / norm(cross(b, c)), v / norm(cross(c, a)), v / norm(cross(a, b))]
    }

    /// 分数坐标转笛卡尔坐标
    pub fn to_cartesian(&self, frac: [f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        [
            frac[0] * m[0][0] + frac[1] * m[1][0] + frac[2] * m[2][0],
            frac[0] * m[0][1] + frac[1] * m[1][1] + frac[2] * m[2][1],
            frac[0] * m[0][2] + frac[1] * m[1][2] + frac[2] * m[2][2],
        ]
    }

    /// 笛卡尔坐标转分数坐标；奇异晶格返回 None
    pub fn to_fractional(&self, cart: [f64; 3]) -> Option<[f64; 3]> {
        let inv = self.to_matrix().try_inverse()?;
        Some([
            cart[0] * inv[(0, 0)] + cart[1] * inv[(1, 0)] + cart[2] * inv[(2, 0)],
            cart[0] * inv[(0, 1)] + cart[1] * inv[(1, 1)] + cart[2] * inv[(2, 1)],
            cart[0] * inv[(0, 2)] + cart[1] * inv[(1, 2)] + cart[2] * inv[(2, 2)],
        ])
    }

    /// 周期边界下两分数坐标点之间的最短笛卡尔距离（搜索相邻 27 个镜像）
    pub fn periodic_distance(&self, f1: [f64; 3], f2: [f64; 3]) -> f64 {
        let mut d = [f2[0] - f1[0], f2[1] - f1[1], f2[2] - f1[2]];
        for x in d.iter_mut() {
            *x -= x.round();
        }
        let mut best = f64::INFINITY;
        for i in -1..=1 {
            for j in -1..=1 {
                for k in -1..=1 {
                    let shifted = [d[0] + i as f64, d[1] + j as f64, d[2] + k as f64];
                    best = best.min(norm(self.to_cartesian(shifted)));
                }
            }
        }
        best
    }
}

/// 原子信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// 元素符号
    pub element: String,

    /// 分数坐标 [x, y, z]
    pub position: [f64; 3],

    /// 可选：原子标签（用于区分同种元素的不同位置）
    pub label: Option<String>,
}

impl Atom {
    pub fn new(element: impl Into<String>, position: [f64; 3]) -> Self {
        Atom {
            element: element.into(),
            position,
            label: None,
        }
    }
}

/// 晶体结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crystal {
    /// 结构名称
    pub name: String,

    /// 晶格
    pub lattice: Lattice,

    /// 原子列表
    pub atoms: Vec<Atom>,

    /// 能量 (eV)
    pub energy: Option<f64>,

    /// 来源文件格式
    pub source_format: Option<String>,
}

impl Crystal {
    pub fn new(name: impl Into<String>, lattice: Lattice, atoms: Vec<Atom>) -> Self {
        Crystal {
            name: name.into(),
            lattice,
            atoms,
            energy: None,
            source_format: None,
        }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn volume(&self) -> f64 {
        self.lattice.volume().abs()
    }

    /// 所有原子的笛卡尔坐标
    pub fn cartesian_positions(&self) -> Vec<[f64; 3]> {
        self.atoms
            .iter()
            .map(|a| self.lattice.to_cartesian(a.position))
            .collect()
    }

    /// 以笛卡尔坐标更新原子位置（保持当前晶格）
    pub fn set_cartesian_positions(&mut self, positions: &[[f64; 3]]) -> Result<()> {
        let inv = self.lattice.to_matrix().try_inverse().ok_or_else(|| {
            crate::error::LamOptError::InvalidStructure("singular lattice".to_string())
        })?;
        for (atom, cart) in self.atoms.iter_mut().zip(positions) {
            atom.position = [
                cart[0] * inv[(0, 0)] + cart[1] * inv[(1, 0)] + cart[2] * inv[(2, 0)],
                cart[0] * inv[(0, 1)] + cart[1] * inv[(1, 1)] + cart[2] * inv[(2, 1)],
                cart[0] * inv[(0, 2)] + cart[1] * inv[(1, 2)] + cart[2] * inv[(2, 2)],
            ];
        }
        Ok(())
    }

    /// 替换晶格，分数坐标不变（原子随晶格缩放）
    pub fn with_lattice(&self, lattice: Lattice) -> Crystal {
        Crystal {
            lattice,
            ..self.clone()
        }
    }

    /// 原子序数序列；未知元素记为 0
    pub fn atomic_numbers(&self) -> Vec<u8> {
        self.atoms
            .iter()
            .map(|a| {
                Element::from_symbol(&a.element)
                    .map(|e| e.atomic_number)
                    .unwrap_or(0)
            })
            .collect()
    }

    /// 元素组成（元素 -> 原子数）
    pub fn composition(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for atom in &self.atoms {
            *counts.entry(atom.element.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// 约化组成：各元素原子数除以最大公约数
    pub fn reduced_composition(&self) -> BTreeMap<String, usize> {
        reduce_counts(&self.composition())
    }

    /// 计算化学式（按电负性排序，如 "Na4Cl4"）
    pub fn formula(&self) -> String {
        format_formula(&self.composition())
    }

    /// 约化化学式（pymatgen 约定，如 "NaCl"、"O2"）
    pub fn reduced_formula(&self) -> String {
        let formula = format_formula(&self.reduced_composition());
        match special_formula(&formula) {
            Some(special) => special.to_string(),
            None => formula,
        }
    }

    /// 任意两原子之间的最短周期距离；少于两个原子时返回 None
    pub fn min_distance(&self) -> Option<f64> {
        let n = self.atoms.len();
        let mut best: Option<f64> = None;
        for i in 0..n {
            for j in (i + 1)..n {
                let d = self
                    .lattice
                    .periodic_distance(self.atoms[i].position, self.atoms[j].position);
                best = Some(best.map_or(d, |b: f64| b.min(d)));
            }
        }
        best
    }
}

/// 最大公约数
pub fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn reduce_counts(counts: &BTreeMap<String, usize>) -> BTreeMap<String, usize> {
    let divisor = counts.values().copied().fold(0, gcd).max(1);
    counts
        .iter()
        .map(|(el, n)| (el.clone(), n / divisor))
        .collect()
}

fn format_formula(counts: &BTreeMap<String, usize>) -> String {
    let mut entries: Vec<(&String, &usize)> = counts.iter().collect();
    entries.sort_by(|(a, _), (b, _)| {
        let xa = Element::from_symbol(a).map_or(f64::INFINITY, |e| e.electronegativity);
        let xb = Element::from_symbol(b).map_or(f64::INFINITY, |e| e.electronegativity);
        xa.partial_cmp(&xb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });

    entries
        .into_iter()
        .map(|(el, &count)| {
            if count == 1 {
                el.to_string()
            } else {
                format!("{}{}", el, count)
            }
        })
        .collect::<Vec<_>>()
        .join("")
}

/// 双原子分子与过氧化物的惯用写法
fn special_formula(formula: &str) -> Option<&'static str> {
    match formula {
        "LiO" => Some("LiO2"),
        "NaO" => Some("NaO2"),
        "KO" => Some("KO2"),
        "HO" => Some("H2O2"),
        "CsO" => Some("CsO2"),
        "RbO" => Some("RbO2"),
        "O" => Some("O2"),
        "N" => Some("N2"),
        "F" => Some("F2"),
        "Cl" => Some("Cl2"),
        "H" => Some("H2"),
        _ => None,
    }
}

pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

pub(crate) fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// 岩盐结构 NaCl 常规胞（8 原子）
    pub fn rock_salt(a: f64) -> Crystal {
        let lattice = Lattice::from_parameters(a, a, a, 90.0, 90.0, 90.0);
        let atoms = vec![
            Atom::new("Na", [0.0, 0.0, 0.0]),
            Atom::new("Na", [0.5, 0.5, 0.0]),
            Atom::new("Na", [0.5, 0.0, 0.5]),
            Atom::new("Na", [0.0, 0.5, 0.5]),
            Atom::new("Cl", [0.5, 0.0, 0.0]),
            Atom::new("Cl", [0.0, 0.5, 0.0]),
            Atom::new("Cl", [0.0, 0.0, 0.5]),
            Atom::new("Cl", [0.5, 0.5, 0.5]),
        ];
        Crystal::new("NaCl", lattice, atoms)
    }
}
