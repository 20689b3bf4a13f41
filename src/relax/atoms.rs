//! # 可优化对象
//!
//! `Atoms` 把结构与计算器绑定并缓存最近一次计算结果；
//! `CellFilter` 在其上扩展晶格应变自由度，让优化器同时弛豫原子位置与晶胞。
//!
//! ## CellFilter 约定
//! - 形变梯度 F = (C0⁻¹ C)ᵀ，C0 为初始晶格，C 为当前晶格（行向量）
//! - 暴露的坐标：原子位置 F⁻¹ r，以及 cell_factor · F（cell_factor = 原子数）
//! - 广义力：原子 Fᵀ f，晶格 (−V σ) F⁻ᵀ / cell_factor
//!
//! ## 依赖关系
//! - 被 `relax/optimizers.rs`, `relax/relaxer.rs`, `relax/trajectory.rs` 使用
//! - 使用 `calculators/`, `nalgebra`

use crate::calculators::{CalcResults, Calculator};
use crate::error::{LamOptError, Result};
use crate::models::{Crystal, Lattice};

use nalgebra::{DVector, Matrix3, Vector3};
use std::sync::Arc;

/// 结构 + 计算器
pub struct Atoms {
    crystal: Crystal,
    calculator: Arc<dyn Calculator>,
    cache: Option<CalcResults>,
}

impl Atoms {
    pub fn new(crystal: Crystal, calculator: Arc<dyn Calculator>) -> Self {
        Atoms {
            crystal,
            calculator,
            cache: None,
        }
    }

    pub fn crystal(&self) -> &Crystal {
        &self.crystal
    }

    pub fn into_crystal(self) -> Crystal {
        self.crystal
    }

    pub fn len(&self) -> usize {
        self.crystal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crystal.is_empty()
    }

    /// 当前结构的计算结果；位置或晶格改变后重新计算
    pub fn results(&mut self) -> Result<&CalcResults> {
        let results = match self.cache.take() {
            Some(results) => results,
            None => {
                let results = self.calculator.calculate(&self.crystal)?;
                if results.forces.len() != self.crystal.len() {
                    return Err(LamOptError::Calculation {
                        calculator: self.calculator.name().to_string(),
                        reason: format!(
                            "returned {} forces for {} atoms",
                            results.forces.len(),
                            self.crystal.len()
                        ),
                    });
                }
                results
            }
        };
        Ok(self.cache.insert(results))
    }

    pub fn set_cartesian_positions(&mut self, positions: &[[f64; 3]]) -> Result<()> {
        self.crystal.set_cartesian_positions(positions)?;
        self.cache = None;
        Ok(())
    }

    /// 同时设置晶格与笛卡尔坐标
    pub fn set_cell_and_positions(&mut self, lattice: Lattice, positions: &[[f64; 3]]) -> Result<()> {
        self.crystal.lattice = lattice;
        self.set_cartesian_positions(positions)
    }
}

/// 优化器操作的对象：一组扁平化的广义坐标与广义力
pub trait Optimizable {
    /// 广义坐标，按 3 个一组排列
    fn get_positions(&self) -> DVector<f64>;

    fn set_positions(&mut self, positions: &DVector<f64>) -> Result<()>;

    /// 广义力（能量对广义坐标的负梯度）
    fn get_forces(&mut self) -> Result<DVector<f64>>;

    fn get_potential_energy(&mut self) -> Result<f64>;

    fn atoms_mut(&mut self) -> &mut Atoms;

    /// 去掉包装，返回底层结构
    fn into_atoms(self: Box<Self>) -> Atoms;
}

/// 每 3 个分量一组的最大模长
pub fn max_row_norm(v: &DVector<f64>) -> f64 {
    v.as_slice()
        .chunks(3)
        .map(|row| row.iter().map(|x| x * x).sum::<f64>().sqrt())
        .fold(0.0, f64::max)
}

fn flatten(rows: &[[f64; 3]]) -> DVector<f64> {
    DVector::from_iterator(rows.len() * 3, rows.iter().flat_map(|r| r.iter().copied()))
}

fn unflatten(v: &DVector<f64>) -> Result<Vec<[f64; 3]>> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err(LamOptError::Diverged("non-finite coordinates".to_string()));
    }
    Ok(v.as_slice()
        .chunks(3)
        .map(|r| [r[0], r[1], r[2]])
        .collect())
}

impl Optimizable for Atoms {
    fn get_positions(&self) -> DVector<f64> {
        flatten(&self.crystal.cartesian_positions())
    }

    fn set_positions(&mut self, positions: &DVector<f64>) -> Result<()> {
        let rows = unflatten(positions)?;
        self.set_cartesian_positions(&rows)
    }

    fn get_forces(&mut self) -> Result<DVector<f64>> {
        Ok(flatten(&self.results()?.forces))
    }

    fn get_potential_energy(&mut self) -> Result<f64> {
        Ok(self.results()?.energy)
    }

    fn atoms_mut(&mut self) -> &mut Atoms {
        self
    }

    fn into_atoms(self: Box<Self>) -> Atoms {
        *self
    }
}

/// 晶胞弛豫包装
pub struct CellFilter {
    atoms: Atoms,
    orig_cell: Matrix3<f64>,
    orig_cell_inv: Matrix3<f64>,
    cell_factor: f64,
}

impl CellFilter {
    pub fn new(atoms: Atoms) -> Result<Self> {
        let orig_cell = atoms.crystal().lattice.to_matrix();
        let orig_cell_inv = orig_cell
            .try_inverse()
            .ok_or_else(|| LamOptError::InvalidStructure("singular lattice".to_string()))?;
        let cell_factor = atoms.len().max(1) as f64;
        Ok(CellFilter {
            atoms,
            orig_cell,
            orig_cell_inv,
            cell_factor,
        })
    }

    /// 当前形变梯度 F = (C0⁻¹ C)ᵀ
    fn deform_grad(&self) -> Matrix3<f64> {
        (self.orig_cell_inv * self.atoms.crystal().lattice.to_matrix()).transpose()
    }

    fn singular() -> LamOptError {
        LamOptError::Diverged("cell deformation became singular".to_string())
    }
}

impl Optimizable for CellFilter {
    fn get_positions(&self) -> DVector<f64> {
        let grad = self.deform_grad();
        let grad_inv = grad.try_inverse().unwrap_or_else(Matrix3::identity);
        let mut rows: Vec<[f64; 3]> = self
            .atoms
            .crystal()
            .cartesian_positions()
            .into_iter()
            .map(|r| {
                let p = grad_inv * Vector3::from(r);
                [p.x, p.y, p.z]
            })
            .collect();
        for i in 0..3 {
            let row = grad.row(i) * self.cell_factor;
            rows.push([row[0], row[1], row[2]]);
        }
        flatten(&rows)
    }

    fn set_positions(&mut self, positions: &DVector<f64>) -> Result<()> {
        let rows = unflatten(positions)?;
        let n = self.atoms.len();
        if rows.len() != n + 3 {
            return Err(LamOptError::InvalidArgument(format!(
                "expected {} generalized coordinates, got {}",
                n + 3,
                rows.len()
            )));
        }

        let mut grad = Matrix3::zeros();
        for i in 0..3 {
            for j in 0..3 {
                grad[(i, j)] = rows[n + i][j] / self.cell_factor;
            }
        }
        let cell = self.orig_cell * grad.transpose();
        if cell.determinant().abs() < 1e-8 {
            return Err(Self::singular());
        }

        let cartesian: Vec<[f64; 3]> = rows[..n]
            .iter()
            .map(|r| {
                let p = grad * Vector3::from(*r);
                [p.x, p.y, p.z]
            })
            .collect();
        self.atoms
            .set_cell_and_positions(Lattice::from_matrix(&cell), &cartesian)
    }

    fn get_forces(&mut self) -> Result<DVector<f64>> {
        let grad = self.deform_grad();
        let grad_inv_t = grad.try_inverse().ok_or_else(Self::singular)?.transpose();
        let volume = self.atoms.crystal().volume();
        let results = self.atoms.results()?;

        let stress = Matrix3::from_fn(|i, j| results.stress[i][j]);
        let virial = -volume * stress * grad_inv_t;

        let mut rows: Vec<[f64; 3]> = results
            .forces
            .iter()
            .map(|f| {
                let g = grad.transpose() * Vector3::from(*f);
                [g.x, g.y, g.z]
            })
            .collect();
        for i in 0..3 {
            rows.push([
                virial[(i, 0)] / self.cell_factor,
                virial[(i, 1)] / self.cell_factor,
                virial[(i, 2)] / self.cell_factor,
            ]);
        }
        Ok(flatten(&rows))
    }

    fn get_potential_energy(&mut self) -> Result<f64> {
        Ok(self.atoms.results()?.energy)
    }

    fn atoms_mut(&mut self) -> &mut Atoms {
        &mut self.atoms
    }

    fn into_atoms(self: Box<Self>) -> Atoms {
        self.atoms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculators::PairPotential;
    use crate::models::structure::fixtures::rock_salt;

    fn morse_atoms(a: f64) -> Atoms {
        Atoms::new(rock_salt(a), Arc::new(PairPotential::morse()))
    }

    #[test]
    fn test_atoms_cache_invalidation() {
        let mut atoms = morse_atoms(5.5);
        let e0 = atoms.get_potential_energy().unwrap();
        let mut x = atoms.get_positions();
        x[0] += 0.2;
        atoms.set_positions(&x).unwrap();
        let e1 = atoms.get_potential_energy().unwrap();
        assert_ne!(e0, e1);
        assert!(max_row_norm(&atoms.get_forces().unwrap()) > 1e-4);
    }

    #[test]
    fn test_cell_filter_identity_view() {
        let filter = CellFilter::new(morse_atoms(5.5)).unwrap();
        let x = filter.get_positions();
        assert_eq!(x.len(), (8 + 3) * 3);
        // 未变形时晶格部分为 cell_factor · I
        assert!((x[24] - 8.0).abs() < 1e-12);
        assert!((x[28] - 8.0).abs() < 1e-12);
        assert!(x[25].abs() < 1e-12);
    }

    #[test]
    fn test_cell_filter_set_positions_deforms_cell() {
        let mut filter = CellFilter::new(morse_atoms(5.5)).unwrap();
        let mut x = filter.get_positions();
        // 沿 a 方向拉伸 2%
        x[24] *= 1.02;
        filter.set_positions(&x).unwrap();
        let (a, b, _, _, _, _) = filter.atoms_mut().crystal().lattice.parameters();
        assert!((a - 5.61).abs() < 1e-9);
        assert!((b - 5.5).abs() < 1e-9);

        // 原子分数坐标保持
        let atoms = Box::new(filter).into_atoms();
        assert!((atoms.crystal().atoms[1].position[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_cell_filter_force_matches_energy_gradient() {
        let mut filter = CellFilter::new(morse_atoms(5.3)).unwrap();
        let forces = filter.get_forces().unwrap();
        let x = filter.get_positions();

        // 晶格 xx 分量
        let index = 24;
        let h = 1e-5;
        let mut plus = x.clone();
        plus[index] += h;
        filter.set_positions(&plus).unwrap();
        let e_plus = filter.get_potential_energy().unwrap();
        let mut minus = x.clone();
        minus[index] -= h;
        filter.set_positions(&minus).unwrap();
        let e_minus = filter.get_potential_energy().unwrap();

        let numeric = -(e_plus - e_minus) / (2.0 * h);
        assert!((numeric - forces[index]).abs() < 1e-6);
    }
}
