//! # 结构等价判断
//!
//! 容差下判断两个周期结构是否相同（允许原胞约化、晶胞重选、原点平移与位点重排）。
//!
//! ## 流程
//! 1. 约化组成必须相同
//! 2. 可选：约化到原胞，再选取最短的基矢
//! 3. 位点数必须相同
//! 4. 可选：把 B 缩放到与 A 相同体积
//! 5. 在 B 的格点中枚举与 A 的边长 (ltol) 与夹角 (angle_tol) 匹配的基矢
//! 6. 以 A 中最稀有元素的一个位点为锚点，尝试所有平移
//! 7. 逐个位点寻找最近的同种未配对位点，距离不超过 stol · (V/N)^(1/3)
//!
//! ## 依赖关系
//! - 被 `analysis/duplicate.rs` 使用
//! - 使用 `models/structure.rs`, `nalgebra`

use crate::models::{Crystal, Lattice};

use nalgebra::{Matrix3, Vector3};

pub const DEFAULT_LTOL: f64 = 0.05;
pub const DEFAULT_STOL: f64 = 0.1;
pub const DEFAULT_ANGLE_TOL: f64 = 5.0;

/// 原胞约化时判断位点重合的距离 (Å)
const SYMPREC: f64 = 0.25;

/// 枚举格矢时整数系数的范围
const SEARCH_RANGE: i32 = 2;

/// 结构匹配器
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructureMatcher {
    /// 边长相对容差
    pub ltol: f64,
    /// 位点容差，以 (V/N)^(1/3) 为单位
    pub stol: f64,
    /// 夹角容差（度）
    pub angle_tol: f64,
    pub primitive_cell: bool,
    pub scale: bool,
}

impl Default for StructureMatcher {
    fn default() -> Self {
        StructureMatcher {
            ltol: DEFAULT_LTOL,
            stol: DEFAULT_STOL,
            angle_tol: DEFAULT_ANGLE_TOL,
            primitive_cell: true,
            scale: true,
        }
    }
}

/// 内部位点表示：晶格 + 元素 + 分数坐标
#[derive(Debug, Clone)]
struct Sites {
    lattice: Lattice,
    species: Vec<String>,
    frac: Vec<[f64; 3]>,
}

impl Sites {
    fn from_crystal(crystal: &Crystal) -> Self {
        Sites {
            lattice: crystal.lattice.clone(),
            species: crystal.atoms.iter().map(|a| a.element.clone()).collect(),
            frac: crystal.atoms.iter().map(|a| wrap(a.position)).collect(),
        }
    }

    fn len(&self) -> usize {
        self.frac.len()
    }

    fn volume(&self) -> f64 {
        self.lattice.volume().abs()
    }

    /// 数量最少的元素（并列时取字典序最小）
    fn rarest_species(&self) -> Option<&str> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for el in &self.species {
            match counts.iter_mut().find(|(s, _)| *s == el.as_str()) {
                Some((_, n)) => *n += 1,
                None => counts.push((el.as_str(), 1)),
            }
        }
        counts
            .into_iter()
            .min_by(|(sa, na), (sb, nb)| na.cmp(nb).then_with(|| sa.cmp(sb)))
            .map(|(s, _)| s)
    }

    /// 平移 t 是否把每个位点映射到同种位点
    fn is_translation(&self, t: [f64; 3]) -> bool {
        (0..self.len()).all(|i| {
            let moved = add(self.frac[i], t);
            (0..self.len()).any(|k| {
                self.species[k] == self.species[i]
                    && self.lattice.periodic_distance(moved, self.frac[k]) < SYMPREC
            })
        })
    }

    /// 用新的基矢（行向量）重新表示位点，合并重合位点
    fn rebase(&self, basis: &Matrix3<f64>) -> Option<Sites> {
        let lattice = Lattice::from_matrix(basis);
        let mut species: Vec<String> = Vec::new();
        let mut frac: Vec<[f64; 3]> = Vec::new();
        for (el, f) in self.species.iter().zip(&self.frac) {
            let new_frac = wrap(lattice.to_fractional(self.lattice.to_cartesian(*f))?);
            let duplicate = species
                .iter()
                .zip(&frac)
                .any(|(s, g)| s == el && lattice.periodic_distance(*g, new_frac) < SYMPREC);
            if !duplicate {
                species.push(el.clone());
                frac.push(new_frac);
            }
        }
        Some(Sites {
            lattice,
            species,
            frac,
        })
    }

    /// 约化到原胞；无法约化时原样返回
    fn primitive(&self) -> Sites {
        let rare = match self.rarest_species() {
            Some(el) => el.to_string(),
            None => return self.clone(),
        };
        let anchor = match self.species.iter().position(|el| *el == rare) {
            Some(i) => i,
            None => return self.clone(),
        };

        let mut translations: Vec<[f64; 3]> = vec![[0.0; 3]];
        for j in 0..self.len() {
            if j == anchor || self.species[j] != rare {
                continue;
            }
            let t = wrap(sub(self.frac[j], self.frac[anchor]));
            let known = translations
                .iter()
                .any(|u| self.lattice.periodic_distance(*u, t) < SYMPREC);
            if !known && self.is_translation(t) {
                translations.push(t);
            }
        }

        let n_t = translations.len();
        if n_t == 1 || self.len() % n_t != 0 {
            return self.clone();
        }

        let mut candidates = Vec::new();
        for t in &translations {
            for shift in integer_shifts(1) {
                let f = [t[0] + shift[0], t[1] + shift[1], t[2] + shift[2]];
                candidates.push(Vector3::from(self.lattice.to_cartesian(f)));
            }
        }

        let target = self.volume() / n_t as f64;
        match shortest_basis(candidates, target).and_then(|basis| self.rebase(&basis)) {
            Some(reduced) if reduced.len() * n_t == self.len() => reduced,
            _ => self.clone(),
        }
    }

    /// 选取最短的基矢表示同一晶格
    fn reduced(&self) -> Sites {
        let m = self.lattice.to_matrix();
        let candidates = integer_shifts(SEARCH_RANGE)
            .into_iter()
            .map(|n| m.transpose() * Vector3::from(n))
            .collect();
        shortest_basis(candidates, self.volume())
            .and_then(|basis| self.rebase(&basis))
            .filter(|sites| sites.len() == self.len())
            .unwrap_or_else(|| self.clone())
    }

    fn scaled_to(&self, volume: f64) -> Sites {
        let factor = (volume / self.volume()).cbrt();
        let m = self.lattice.to_matrix() * factor;
        Sites {
            lattice: Lattice::from_matrix(&m),
            ..self.clone()
        }
    }
}

impl StructureMatcher {
    /// 两个结构是否在容差内等价
    pub fn fit(&self, a: &Crystal, b: &Crystal) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        if a.reduced_composition() != b.reduced_composition() {
            return false;
        }

        let mut sa = Sites::from_crystal(a);
        let mut sb = Sites::from_crystal(b);
        if self.primitive_cell {
            sa = sa.primitive();
            sb = sb.primitive();
        }
        sa = sa.reduced();
        sb = sb.reduced();

        if sa.len() != sb.len() {
            return false;
        }
        if self.scale {
            sb = sb.scaled_to(sa.volume());
        }

        let tolerance = self.stol * (sa.volume() / sa.len() as f64).cbrt();
        self.aligned_bases(&sa, &sb).into_iter().any(|basis| {
            sb.rebase(&basis)
                .filter(|aligned| aligned.len() == sa.len())
                .map_or(false, |aligned| site_mapping_exists(&sa, &aligned, tolerance))
        })
    }

    /// B 中边长与夹角都与 A 的基矢匹配的右手基
    fn aligned_bases(&self, a: &Sites, b: &Sites) -> Vec<Matrix3<f64>> {
        let (la, lb, lc, alpha, beta, gamma) = a.lattice.parameters();
        let m = b.lattice.to_matrix();
        let vectors: Vec<Vector3<f64>> = integer_shifts(SEARCH_RANGE)
            .into_iter()
            .map(|n| m.transpose() * Vector3::from(n))
            .filter(|v| v.norm() > 1e-8)
            .collect();

        let within = |v: &Vector3<f64>, target: f64| (v.norm() - target).abs() <= self.ltol * target;
        let c1: Vec<&Vector3<f64>> = vectors.iter().filter(|v| within(*v, la)).collect();
        let c2: Vec<&Vector3<f64>> = vectors.iter().filter(|v| within(*v, lb)).collect();
        let c3: Vec<&Vector3<f64>> = vectors.iter().filter(|v| within(*v, lc)).collect();

        let volume = b.volume();
        let mut bases = Vec::new();
        for &v1 in &c1 {
            for &v2 in &c2 {
                if (angle(v1, v2) - gamma).abs() > self.angle_tol {
                    continue;
                }
                for &v3 in &c3 {
                    if (angle(v2, v3) - alpha).abs() > self.angle_tol
                        || (angle(v1, v3) - beta).abs() > self.angle_tol
                    {
                        continue;
                    }
                    let det = v1.dot(&v2.cross(v3));
                    if (det - volume).abs() > 1e-3 * volume {
                        continue;
                    }
                    bases.push(Matrix3::from_rows(&[
                        v1.transpose(),
                        v2.transpose(),
                        v3.transpose(),
                    ]));
                }
            }
        }
        bases
    }
}

/// 在 A 的晶格中寻找平移 + 一一对应，使所有同种位点距离不超过容差
fn site_mapping_exists(a: &Sites, b: &Sites, tolerance: f64) -> bool {
    let rare = match a.rarest_species() {
        Some(el) => el,
        None => return false,
    };
    let anchor = match a.species.iter().position(|el| el == rare) {
        Some(i) => i,
        None => return false,
    };

    (0..b.len())
        .filter(|&k| b.species[k] == rare)
        .any(|k| {
            let t = sub(a.frac[anchor], b.frac[k]);
            let mut used = vec![false; b.len()];
            (0..a.len()).all(|i| {
                let best = (0..b.len())
                    .filter(|&j| !used[j] && b.species[j] == a.species[i])
                    .map(|j| (j, a.lattice.periodic_distance(a.frac[i], add(b.frac[j], t))))
                    .min_by(|x, y| x.1.total_cmp(&y.1));
                match best {
                    Some((j, d)) if d <= tolerance => {
                        used[j] = true;
                        true
                    }
                    _ => false,
                }
            })
        })
}

/// 从候选格矢中挑出体积为 `volume` 的最短三元组，返回右手基（行向量）
fn shortest_basis(mut candidates: Vec<Vector3<f64>>, volume: f64) -> Option<Matrix3<f64>> {
    candidates.retain(|v| v.norm() > 1e-8);
    candidates.sort_by(|x, y| x.norm().total_cmp(&y.norm()));
    candidates.truncate(60);

    let n = candidates.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let (v1, v2, v3) = (candidates[i], candidates[j], candidates[k]);
                let det = v1.dot(&v2.cross(&v3));
                if (det.abs() - volume).abs() < 1e-3 * volume {
                    let v3 = if det < 0.0 { -v3 } else { v3 };
                    return Some(Matrix3::from_rows(&[
                        v1.transpose(),
                        v2.transpose(),
                        v3.transpose(),
                    ]));
                }
            }
        }
    }
    None
}

fn integer_shifts(range: i32) -> Vec<[f64; 3]> {
    let mut shifts = Vec::new();
    for i in -range..=range {
        for j in -range..=range {
            for k in -range..=range {
                shifts.push([i as f64, j as f64, k as f64]);
            }
        }
    }
    shifts
}

fn angle(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (a.dot(b) / (a.norm() * b.norm())).clamp(-1.0, 1.0).acos().to_degrees()
}

fn wrap(f: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for k in 0..3 {
        let x = f[k] - f[k].floor();
        out[k] = if x >= 1.0 - 1e-10 { 0.0 } else { x };
    }
    out
}

fn add(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}
