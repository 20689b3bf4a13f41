//! # 周期性对势
//!
//! 截断并平移的对势 φ(r) − φ(r_c)，在周期边界下对截断半径内的所有镜像求和。
//!
//! ## 公式
//! - 能量 E = ½ Σ_ij φ(r_ij) + Σ_i e_i（元素能量偏移）
//! - 受力 F_i = Σ_j φ'(r) d / r，d = r_j + T − r_i
//! - 应力 σ = (1/V) · ½ Σ_ij φ'(r) d ⊗ d / r
//!
//! ## 依赖关系
//! - 被 `calculators/mod.rs`, `calculators/model.rs` 使用
//! - 使用 `models/structure.rs`

use super::{CalcResults, Calculator};
use crate::error::{LamOptError, Result};
use crate::models::Crystal;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 原子几乎重合时拒绝计算
const OVERLAP_DISTANCE: f64 = 1e-6;

/// 对势函数形式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PairFunction {
    /// φ(r) = 4ε[(σ/r)¹² − (σ/r)⁶]
    LennardJones { epsilon: f64, sigma: f64 },
    /// φ(r) = D[e^{−2α(r−r0)} − 2e^{−α(r−r0)}]
    Morse { d: f64, alpha: f64, r0: f64 },
}

impl PairFunction {
    /// 返回 (φ(r), φ'(r))
    pub fn evaluate(&self, r: f64) -> (f64, f64) {
        match *self {
            PairFunction::LennardJones { epsilon, sigma } => {
                let sr6 = (sigma / r).powi(6);
                let sr12 = sr6 * sr6;
                let value = 4.0 * epsilon * (sr12 - sr6);
                let derivative = -24.0 * epsilon * (2.0 * sr12 - sr6) / r;
                (value, derivative)
            }
            PairFunction::Morse { d, alpha, r0 } => {
                let e = (-alpha * (r - r0)).exp();
                let value = d * (e * e - 2.0 * e);
                let derivative = -2.0 * alpha * d * (e * e - e);
                (value, derivative)
            }
        }
    }
}

/// 周期性对势计算器
#[derive(Debug, Clone)]
pub struct PairPotential {
    name: String,
    cutoff: f64,
    default: PairFunction,
    /// 按元素对（字典序）覆盖的参数
    pairs: HashMap<(String, String), PairFunction>,
    /// 每个原子的能量偏移
    atomic_energies: BTreeMap<String, f64>,
}

impl PairPotential {
    pub fn new(name: impl Into<String>, cutoff: f64, default: PairFunction) -> Self {
        PairPotential {
            name: name.into(),
            cutoff,
            default,
            pairs: HashMap::new(),
            atomic_energies: BTreeMap::new(),
        }
    }

    /// 通用 Lennard-Jones 势（Ar 参数）
    pub fn lennard_jones() -> Self {
        let sigma = 3.40;
        PairPotential::new(
            "lennard-jones",
            2.5 * sigma,
            PairFunction::LennardJones {
                epsilon: 0.0104,
                sigma,
            },
        )
    }

    /// 通用 Morse 势（Cu 参数）
    pub fn morse() -> Self {
        PairPotential::new(
            "morse",
            6.0,
            PairFunction::Morse {
                d: 0.3429,
                alpha: 1.3588,
                r0: 2.866,
            },
        )
    }

    pub fn with_pair(mut self, a: &str, b: &str, function: PairFunction) -> Self {
        self.pairs.insert(pair_key(a, b), function);
        self
    }

    pub fn with_atomic_energy(mut self, element: &str, energy: f64) -> Self {
        self.atomic_energies.insert(element.to_string(), energy);
        self
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn function_for(&self, a: &str, b: &str) -> &PairFunction {
        self.pairs.get(&pair_key(a, b)).unwrap_or(&self.default)
    }

    fn failure(&self, reason: String) -> LamOptError {
        LamOptError::Calculation {
            calculator: self.name.clone(),
            reason,
        }
    }
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl Calculator for PairPotential {
    fn name(&self) -> &str {
        &self.name
    }

    fn calculate(&self, crystal: &Crystal) -> Result<CalcResults> {
        let n = crystal.atoms.len();
        let volume = crystal.volume();
        if n == 0 {
            return Err(self.failure("structure has no atoms".to_string()));
        }
        if !(volume.is_finite() && volume > 1e-8) {
            return Err(self.failure(format!("degenerate cell volume {}", volume)));
        }

        let lattice = crystal.lattice.matrix;
        let widths = crystal.lattice.perpendicular_widths();
        // 分数坐标差已折回 [-0.5, 0.5]，多取一层镜像即可覆盖截断球
        let reach: Vec<i64> = widths
            .iter()
            .map(|w| (self.cutoff / w).ceil() as i64 + 1)
            .collect();

        let mut energy = 0.0;
        let mut forces = vec![[0.0; 3]; n];
        let mut virial = [[0.0; 3]; 3];

        for i in 0..n {
            let el_i = &crystal.atoms[i].element;
            if let Some(offset) = self.atomic_energies.get(el_i) {
                energy += offset;
            }

            for j in 0..n {
                let function = self.function_for(el_i, &crystal.atoms[j].element);
                let (shift_energy, _) = function.evaluate(self.cutoff);

                let mut df = [0.0; 3];
                for k in 0..3 {
                    df[k] = crystal.atoms[j].position[k] - crystal.atoms[i].position[k];
                    df[k] -= df[k].round();
                }

                for na in -reach[0]..=reach[0] {
                    for nb in -reach[1]..=reach[1] {
                        for nc in -reach[2]..=reach[2] {
                            if i == j && na == 0 && nb == 0 && nc == 0 {
                                continue;
                            }
                            let frac = [df[0] + na as f64, df[1] + nb as f64, df[2] + nc as f64];
                            let mut d = [0.0; 3];
                            for k in 0..3 {
                                d[k] = frac[0] * lattice[0][k]
                                    + frac[1] * lattice[1][k]
                                    + frac[2] * lattice[2][k];
                            }
                            let r = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
                            if r >= self.cutoff {
                                continue;
                            }
                            if r < OVERLAP_DISTANCE {
                                return Err(self.failure(format!(
                                    "atoms {} and {} overlap",
                                    i, j
                                )));
                            }

                            let (value, derivative) = function.evaluate(r);
                            energy += 0.5 * (value - shift_energy);
                            for a in 0..3 {
                                forces[i][a] += derivative * d[a] / r;
                                for b in 0..3 {
                                    virial[a][b] += 0.5 * derivative * d[a] * d[b] / r;
                                }
                            }
                        }
                    }
                }
            }
        }

        if !energy.is_finite() {
            return Err(self.failure("energy is not finite".to_string()));
        }

        let mut stress = [[0.0; 3]; 3];
        for a in 0..3 {
            for b in 0..3 {
                stress[a][b] = virial[a][b] / volume;
            }
        }

        Ok(CalcResults {
            energy,
            forces,
            stress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::structure::fixtures::rock_salt;
    use crate::models::{Atom, Lattice};

    fn distorted_pair() -> Crystal {
        let lattice = Lattice::from_vectors([[6.0, 0.0, 0.0], [0.3, 5.5, 0.0], [0.2, -0.1, 6.5]]);
        Crystal::new(
            "ArKr",
            lattice,
            vec![
                Atom::new("Ar", [0.05, 0.1, 0.0]),
                Atom::new("Kr", [0.45, 0.55, 0.48]),
                Atom::new("Ar", [0.8, 0.15, 0.6]),
            ],
        )
    }

    #[test]
    fn test_lennard_jones_minimum() {
        let lj = PairFunction::LennardJones {
            epsilon: 1.0,
            sigma: 1.0,
        };
        let r_min = 2f64.powf(1.0 / 6.0);
        let (value, derivative) = lj.evaluate(r_min);
        assert!((value + 1.0).abs() < 1e-12);
        assert!(derivative.abs() < 1e-12);
    }

    #[test]
    fn test_morse_minimum() {
        let morse = PairFunction::Morse {
            d: 0.5,
            alpha: 1.2,
            r0: 2.5,
        };
        let (value, derivative) = morse.evaluate(2.5);
        assert!((value + 0.5).abs() < 1e-12);
        assert!(derivative.abs() < 1e-12);
    }

    #[test]
    fn test_forces_match_finite_difference() {
        let calc = PairPotential::morse();
        let crystal = distorted_pair();
        let results = calc.calculate(&crystal).unwrap();

        let h = 1e-5;
        let cart = crystal.cartesian_positions();
        for atom in 0..crystal.len() {
            for k in 0..3 {
                let mut plus = crystal.clone();
                let mut shifted = cart.clone();
                shifted[atom][k] += h;
                plus.set_cartesian_positions(&shifted).unwrap();

                let mut minus = crystal.clone();
                shifted[atom][k] -= 2.0 * h;
                minus.set_cartesian_positions(&shifted).unwrap();

                let e_plus = calc.calculate(&plus).unwrap().energy;
                let e_minus = calc.calculate(&minus).unwrap().energy;
                let numeric = -(e_plus - e_minus) / (2.0 * h);
                assert!(
                    (numeric - results.forces[atom][k]).abs() < 1e-6,
                    "atom {} axis {}: {} vs {}",
                    atom,
                    k,
                    numeric,
                    results.forces[atom][k]
                );
            }
        }
    }

    #[test]
    fn test_stress_matches_strain_derivative() {
        let calc = PairPotential::lennard_jones();
        let crystal = distorted_pair();
        let results = calc.calculate(&crystal).unwrap();
        let volume = crystal.volume();

        // 均匀应变 ε_xx：晶格与分数坐标一起变形
        let h = 1e-6;
        let strained = |eps: f64| {
            let mut c = crystal.clone();
            for row in c.lattice.matrix.iter_mut() {
                row[0] *= 1.0 + eps;
            }
            calc.calculate(&c).unwrap().energy
        };
        let numeric = (strained(h) - strained(-h)) / (2.0 * h) / volume;
        assert!((numeric - results.stress[0][0]).abs() < 1e-7);
    }

    #[test]
    fn test_perfect_rock_salt_has_no_forces() {
        let calc = PairPotential::lennard_jones();
        let results = calc.calculate(&rock_salt(5.64)).unwrap();
        assert!(results.max_force() < 1e-10);
        // 对称张量
        assert!((results.stress[0][1] - results.stress[1][0]).abs() < 1e-12);
    }

    #[test]
    fn test_atomic_energy_offsets_and_pair_override() {
        let base = PairPotential::morse();
        let crystal = rock_salt(5.64);
        let e0 = base.calculate(&crystal).unwrap().energy;

        let shifted = PairPotential::morse()
            .with_atomic_energy("Na", -1.0)
            .with_atomic_energy("Cl", -2.0);
        let e1 = shifted.calculate(&crystal).unwrap().energy;
        assert!((e1 - (e0 - 12.0)).abs() < 1e-9);

        let overridden = PairPotential::morse().with_pair(
            "Cl",
            "Na",
            PairFunction::Morse {
                d: 1.0,
                alpha: 1.0,
                r0: 2.82,
            },
        );
        let e2 = overridden.calculate(&crystal).unwrap().energy;
        assert!(e2 < e0);
    }

    #[test]
    fn test_overlapping_atoms_fail() {
        let lattice = Lattice::from_parameters(4.0, 4.0, 4.0, 90.0, 90.0, 90.0);
        let crystal = Crystal::new(
            "bad",
            lattice,
            vec![Atom::new("Cu", [0.0, 0.0, 0.0]), Atom::new("Cu", [0.0, 0.0, 0.0])],
        );
        assert!(PairPotential::morse().calculate(&crystal).is_err());
    }
}
