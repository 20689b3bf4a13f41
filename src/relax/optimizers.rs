//! # 优化器
//!
//! 固定的优化策略集合，按名称在构造 Relaxer 时选定：
//! FIRE、BFGS、LBFGS、BFGSLineSearch、LBFGSLineSearch、MDMin。
//!
//! 每个策略只实现单步更新 `step`；收敛判断与步数上限由 `relax/relaxer.rs` 的循环负责。
//! 参数默认值与 ASE 同名优化器一致（maxstep 0.2 Å）。
//!
//! ## 依赖关系
//! - 被 `relax/relaxer.rs` 使用
//! - 使用 `relax/atoms.rs` 的 `Optimizable`
//! - 使用 `nalgebra` 进行线性代数运算

use super::atoms::{max_row_norm, Optimizable};
use crate::error::{LamOptError, Result};

use nalgebra::{DMatrix, DVector};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// 单步最大位移 (Å)
pub const DEFAULT_MAXSTEP: f64 = 0.2;

/// 优化器单步更新
pub trait Optimizer {
    fn step(&mut self, target: &mut dyn Optimizable, forces: &DVector<f64>) -> Result<()>;
}

/// 可选的优化策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizerKind {
    Fire,
    #[default]
    Bfgs,
    Lbfgs,
    BfgsLineSearch,
    LbfgsLineSearch,
    MdMin,
}

impl OptimizerKind {
    pub const ALL: [OptimizerKind; 6] = [
        OptimizerKind::Fire,
        OptimizerKind::Bfgs,
        OptimizerKind::Lbfgs,
        OptimizerKind::BfgsLineSearch,
        OptimizerKind::LbfgsLineSearch,
        OptimizerKind::MdMin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizerKind::Fire => "FIRE",
            OptimizerKind::Bfgs => "BFGS",
            OptimizerKind::Lbfgs => "LBFGS",
            OptimizerKind::BfgsLineSearch => "BFGSLineSearch",
            OptimizerKind::LbfgsLineSearch => "LBFGSLineSearch",
            OptimizerKind::MdMin => "MDMin",
        }
    }

    /// 创建一个新的优化器实例（每次弛豫调用一个）
    pub fn build(&self) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Fire => Box::new(Fire::default()),
            OptimizerKind::Bfgs => Box::new(Bfgs::default()),
            OptimizerKind::Lbfgs => Box::new(Lbfgs::default()),
            OptimizerKind::BfgsLineSearch => Box::new(BfgsLineSearch::default()),
            OptimizerKind::LbfgsLineSearch => Box::new(Lbfgs::with_line_search()),
            OptimizerKind::MdMin => Box::new(MdMin::default()),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizerKind {
    type Err = LamOptError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase().replace(['-', '_'], "");
        OptimizerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_lowercase() == key)
            .ok_or_else(|| {
                LamOptError::InvalidArgument(format!(
                    "Unknown optimizer '{}' (available: FIRE, BFGS, LBFGS, BFGSLineSearch, LBFGSLineSearch, MDMin)",
                    s
                ))
            })
    }
}

/// 将位移缩放到单原子最大位移不超过 maxstep
fn limit_per_atom(mut dr: DVector<f64>, maxstep: f64) -> DVector<f64> {
    let longest = max_row_norm(&dr);
    if longest > maxstep {
        dr *= maxstep / longest;
    }
    dr
}

/// 将整体位移模长限制在 maxstep 内
fn limit_total(mut dr: DVector<f64>, maxstep: f64) -> DVector<f64> {
    let norm = dr.norm();
    if norm > maxstep {
        dr *= maxstep / norm;
    }
    dr
}

fn check_finite(dr: &DVector<f64>, name: &str) -> Result<()> {
    if dr.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(LamOptError::Diverged(format!("{} produced a non-finite step", name)))
    }
}

// ─────────────────────────────────────────────────────────────
// FIRE
// ─────────────────────────────────────────────────────────────

/// Fast Inertial Relaxation Engine
#[derive(Debug, Clone)]
pub struct Fire {
    dt: f64,
    maxstep: f64,
    dtmax: f64,
    n_min: usize,
    finc: f64,
    fdec: f64,
    astart: f64,
    fa: f64,
    a: f64,
    n_steps: usize,
    velocity: Option<DVector<f64>>,
}

impl Default for Fire {
    fn default() -> Self {
        Fire {
            dt: 0.1,
            maxstep: DEFAULT_MAXSTEP,
            dtmax: 1.0,
            n_min: 5,
            finc: 1.1,
            fdec: 0.5,
            astart: 0.1,
            fa: 0.99,
            a: 0.1,
            n_steps: 0,
            velocity: None,
        }
    }
}

impl Optimizer for Fire {
    fn step(&mut self, target: &mut dyn Optimizable, forces: &DVector<f64>) -> Result<()> {
        let mut v = match self.velocity.take() {
            None => DVector::zeros(forces.len()),
            Some(mut v) => {
                let vf = v.dot(forces);
                if vf > 0.0 {
                    let f_norm = forces.norm();
                    if f_norm > 0.0 {
                        v = (1.0 - self.a) * &v + self.a * forces / f_norm * v.norm();
                    }
                    if self.n_steps > self.n_min {
                        self.dt = (self.dt * self.finc).min(self.dtmax);
                        self.a *= self.fa;
                    }
                    self.n_steps += 1;
                } else {
                    v.fill(0.0);
                    self.a = self.astart;
                    self.dt *= self.fdec;
                    self.n_steps = 0;
                }
                v
            }
        };

        v += self.dt * forces;
        let dr = limit_total(self.dt * &v, self.maxstep);
        check_finite(&dr, "FIRE")?;
        self.velocity = Some(v);
        let r = target.get_positions();
        target.set_positions(&(r + dr))
    }
}

// ─────────────────────────────────────────────────────────────
// MDMin
// ─────────────────────────────────────────────────────────────

/// 速度投影到受力方向的阻尼分子动力学
#[derive(Debug, Clone)]
pub struct MdMin {
    dt: f64,
    maxstep: f64,
    velocity: Option<DVector<f64>>,
    previous_forces: Option<DVector<f64>>,
}

impl Default for MdMin {
    fn default() -> Self {
        MdMin {
            dt: 0.2,
            maxstep: DEFAULT_MAXSTEP,
            velocity: None,
            previous_forces: None,
        }
    }
}

impl Optimizer for MdMin {
    fn step(&mut self, target: &mut dyn Optimizable, forces: &DVector<f64>) -> Result<()> {
        let mut v = match (self.velocity.take(), self.previous_forces.take()) {
            (Some(mut v), Some(f0)) => {
                v += 0.5 * self.dt * (forces + f0);
                let vf = v.dot(forces);
                let ff = forces.dot(forces);
                if vf < 0.0 || ff == 0.0 {
                    v.fill(0.0);
                } else {
                    v = forces * (vf / ff);
                }
                v
            }
            _ => DVector::zeros(forces.len()),
        };

        v += 0.5 * self.dt * forces;
        let dr = limit_total(self.dt * &v, self.maxstep);
        check_finite(&dr, "MDMin")?;
        self.velocity = Some(v);
        self.previous_forces = Some(forces.clone());
        let r = target.get_positions();
        target.set_positions(&(r + dr))
    }
}

// ─────────────────────────────────────────────────────────────
// BFGS（Hessian 近似 + 特征分解）
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Bfgs {
    maxstep: f64,
    /// 初始 Hessian 对角值 (eV/Å²)
    alpha: f64,
    hessian: Option<DMatrix<f64>>,
    previous: Option<(DVector<f64>, DVector<f64>)>,
}

impl Default for Bfgs {
    fn default() -> Self {
        Bfgs {
            maxstep: DEFAULT_MAXSTEP,
            alpha: 70.0,
            hessian: None,
            previous: None,
        }
    }
}

/// Hessian 的 BFGS 秩二更新；位移过小或曲率退化时跳过
fn update_hessian(hessian: &mut DMatrix<f64>, dr: &DVector<f64>, df: &DVector<f64>) {
    if dr.amax() < 1e-7 {
        return;
    }
    let a = dr.dot(df);
    let dg = &*hessian * dr;
    let b = dr.dot(&dg);
    if a.abs() < 1e-12 || b.abs() < 1e-12 {
        return;
    }
    *hessian -= (df * df.transpose()) / a + (&dg * dg.transpose()) / b;
}

impl Optimizer for Bfgs {
    fn step(&mut self, target: &mut dyn Optimizable, forces: &DVector<f64>) -> Result<()> {
        let r = target.get_positions();
        let n = r.len();
        let alpha = self.alpha;
        let mut hessian = self
            .hessian
            .take()
            .unwrap_or_else(|| DMatrix::identity(n, n) * alpha);
        if let Some((r0, f0)) = &self.previous {
            update_hessian(&mut hessian, &(&r - r0), &(forces - f0));
        }

        let eigen = hessian.clone().symmetric_eigen();
        let coefficients = (eigen.eigenvectors.transpose() * forces)
            .zip_map(&eigen.eigenvalues, |c, omega| c / omega.abs().max(1e-12));
        let dr = limit_per_atom(&eigen.eigenvectors * coefficients, self.maxstep);
        check_finite(&dr, "BFGS")?;

        target.set_positions(&(&r + dr))?;
        self.hessian = Some(hessian);
        self.previous = Some((r, forces.clone()));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────
// 线搜索
// ─────────────────────────────────────────────────────────────

/// Armijo 回溯线搜索参数
const ARMIJO_C1: f64 = 1e-4;
const BACKTRACK_FACTOR: f64 = 0.5;
const MAX_BACKTRACKS: usize = 10;

/// 沿方向 p 回溯直到能量充分下降；返回实际位移。
/// 所有尝试都失败时停在最小的试探步上。
fn backtrack(
    target: &mut dyn Optimizable,
    r: &DVector<f64>,
    forces: &DVector<f64>,
    direction: &DVector<f64>,
    maxstep: f64,
) -> Result<DVector<f64>> {
    let e0 = target.get_potential_energy()?;
    let slope = forces.dot(direction);
    let mut step = limit_per_atom(direction.clone(), maxstep);

    for _ in 0..MAX_BACKTRACKS {
        target.set_positions(&(r + &step))?;
        let e = target.get_potential_energy()?;
        let t = step.norm() / direction.norm().max(1e-300);
        if e <= e0 - ARMIJO_C1 * t * slope {
            return Ok(step);
        }
        step *= BACKTRACK_FACTOR;
    }
    target.set_positions(&(r + &step))?;
    Ok(step)
}

/// 逆 Hessian 的 BFGS 更新 + 回溯线搜索
#[derive(Debug, Clone)]
pub struct BfgsLineSearch {
    maxstep: f64,
    alpha: f64,
    inverse_hessian: Option<DMatrix<f64>>,
    previous: Option<(DVector<f64>, DVector<f64>)>,
}

impl Default for BfgsLineSearch {
    fn default() -> Self {
        BfgsLineSearch {
            maxstep: DEFAULT_MAXSTEP,
            alpha: 10.0,
            inverse_hessian: None,
            previous: None,
        }
    }
}

impl Optimizer for BfgsLineSearch {
    fn step(&mut self, target: &mut dyn Optimizable, forces: &DVector<f64>) -> Result<()> {
        let r = target.get_positions();
        let n = r.len();
        let alpha = self.alpha;
        let mut h = self
            .inverse_hessian
            .take()
            .unwrap_or_else(|| DMatrix::identity(n, n) / alpha);

        if let Some((r0, f0)) = &self.previous {
            let s = &r - r0;
            // y = g1 - g0 = f0 - f1
            let y = f0 - forces;
            let sy = s.dot(&y);
            if sy > 1e-12 {
                let rho = 1.0 / sy;
                let identity = DMatrix::<f64>::identity(n, n);
                let left = &identity - rho * &s * y.transpose();
                let right = &identity - rho * &y * s.transpose();
                h = &left * h * &right + rho * &s * s.transpose();
            }
        }

        let mut direction = &h * forces;
        if direction.dot(forces) <= 0.0 {
            // 非下降方向：重置为最速下降
            h = DMatrix::identity(n, n) / alpha;
            direction = &h * forces;
        }
        check_finite(&direction, "BFGSLineSearch")?;

        backtrack(target, &r, forces, &direction, self.maxstep)?;
        self.inverse_hessian = Some(h);
        self.previous = Some((r, forces.clone()));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────
// LBFGS（可选回溯线搜索）
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Lbfgs {
    maxstep: f64,
    memory: usize,
    damping: f64,
    alpha: f64,
    line_search: bool,
    s: VecDeque<DVector<f64>>,
    y: VecDeque<DVector<f64>>,
    rho: VecDeque<f64>,
    previous: Option<(DVector<f64>, DVector<f64>)>,
}

impl Default for Lbfgs {
    fn default() -> Self {
        Lbfgs {
            maxstep: DEFAULT_MAXSTEP,
            memory: 100,
            damping: 1.0,
            alpha: 70.0,
            line_search: false,
            s: VecDeque::new(),
            y: VecDeque::new(),
            rho: VecDeque::new(),
            previous: None,
        }
    }
}

impl Lbfgs {
    pub fn with_line_search() -> Self {
        Lbfgs {
            alpha: 10.0,
            line_search: true,
            ..Default::default()
        }
    }

    fn reset(&mut self) {
        self.s.clear();
        self.y.clear();
        self.rho.clear();
    }

    fn update(&mut self, r: &DVector<f64>, f: &DVector<f64>) {
        let (r0, f0) = match &self.previous {
            Some(prev) => prev,
            None => return,
        };
        let s0 = r - r0;
        let y0 = f0 - f;
        let sy = y0.dot(&s0);
        if sy.abs() < 1e-12 {
            return;
        }
        self.s.push_back(s0);
        self.y.push_back(y0);
        self.rho.push_back(1.0 / sy);
        if self.s.len() > self.memory {
            self.s.pop_front();
            self.y.pop_front();
            self.rho.pop_front();
        }
    }

    /// 两循环递推得到搜索方向 p = −H g
    fn direction(&self, forces: &DVector<f64>) -> DVector<f64> {
        let m = self.s.len();
        let mut a = vec![0.0; m];
        let mut q = -forces;
        for i in (0..m).rev() {
            a[i] = self.rho[i] * self.s[i].dot(&q);
            q -= a[i] * &self.y[i];
        }
        let mut z = q / self.alpha;
        for i in 0..m {
            let b = self.rho[i] * self.y[i].dot(&z);
            z += (a[i] - b) * &self.s[i];
        }
        -z
    }
}

impl Optimizer for Lbfgs {
    fn step(&mut self, target: &mut dyn Optimizable, forces: &DVector<f64>) -> Result<()> {
        let r = target.get_positions();
        self.update(&r, forces);

        let mut p = self.direction(forces);
        if self.line_search && p.dot(forces) <= 0.0 {
            self.reset();
            p = forces / self.alpha;
        }
        check_finite(&p, "LBFGS")?;

        if self.line_search {
            backtrack(target, &r, forces, &p, self.maxstep)?;
        } else {
            let dr = limit_per_atom(p, self.maxstep) * self.damping;
            target.set_positions(&(&r + dr))?;
        }
        self.previous = Some((r, forces.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relax::atoms::Atoms;

    /// 二次势阱：E = ½ Σ k_i (x_i − c_i)²
    struct Quadratic {
        x: DVector<f64>,
        k: DVector<f64>,
        center: DVector<f64>,
    }

    impl Quadratic {
        fn new() -> Self {
            Quadratic {
                x: DVector::from_vec(vec![0.3, -0.2, 0.1, 0.5, 0.4, -0.3]),
                k: DVector::from_vec(vec![1.0, 2.0, 5.0, 3.0, 0.5, 8.0]),
                center: DVector::zeros(6),
            }
        }

        fn energy(&self) -> f64 {
            0.5 * (&self.x - &self.center)
                .component_mul(&(&self.x - &self.center))
                .dot(&self.k)
        }
    }

    impl Optimizable for Quadratic {
        fn get_positions(&self) -> DVector<f64> {
            self.x.clone()
        }
        fn set_positions(&mut self, positions: &DVector<f64>) -> Result<()> {
            self.x = positions.clone();
            Ok(())
        }
        fn get_forces(&mut self) -> Result<DVector<f64>> {
            Ok(-(&self.x - &self.center).component_mul(&self.k))
        }
        fn get_potential_energy(&mut self) -> Result<f64> {
            Ok(self.energy())
        }
        fn atoms_mut(&mut self) -> &mut Atoms {
            unimplemented!("quadratic test surface has no atoms")
        }
        fn into_atoms(self: Box<Self>) -> Atoms {
            unimplemented!("quadratic test surface has no atoms")
        }
    }

    fn minimize(kind: OptimizerKind, steps: usize) -> f64 {
        let mut surface = Quadratic::new();
        let mut optimizer = kind.build();
        for _ in 0..steps {
            let forces = surface.get_forces().unwrap();
            if max_row_norm(&forces) < 1e-6 {
                break;
            }
            optimizer.step(&mut surface, &forces).unwrap();
        }
        max_row_norm(&surface.get_forces().unwrap())
    }

    #[test]
    fn test_all_optimizers_reduce_forces_on_quadratic() {
        let start = max_row_norm(&Quadratic::new().get_forces().unwrap());
        for kind in OptimizerKind::ALL {
            let residual = minimize(kind, 300);
            assert!(
                residual < 0.1 * start,
                "{} left residual force {} (start {})",
                kind,
                residual,
                start
            );
        }
    }

    #[test]
    fn test_quasi_newton_converges_tightly() {
        for kind in [OptimizerKind::Bfgs, OptimizerKind::Lbfgs, OptimizerKind::BfgsLineSearch] {
            assert!(minimize(kind, 200) < 1e-4, "{} did not converge", kind);
        }
    }

    #[test]
    fn test_optimizer_names() {
        assert_eq!("bfgs".parse::<OptimizerKind>().unwrap(), OptimizerKind::Bfgs);
        assert_eq!(
            "LBFGSLineSearch".parse::<OptimizerKind>().unwrap(),
            OptimizerKind::LbfgsLineSearch
        );
        assert_eq!("md-min".parse::<OptimizerKind>().unwrap(), OptimizerKind::MdMin);
        assert!("newton".parse::<OptimizerKind>().is_err());
        assert_eq!(OptimizerKind::default(), OptimizerKind::Bfgs);
    }

    #[test]
    fn test_step_is_limited() {
        let mut surface = Quadratic::new();
        surface.x *= 100.0;
        let before = surface.get_positions();
        let forces = surface.get_forces().unwrap();
        let mut bfgs = Bfgs::default();
        bfgs.step(&mut surface, &forces).unwrap();
        let moved = &surface.get_positions() - &before;
        assert!(max_row_norm(&moved) <= DEFAULT_MAXSTEP + 1e-12);
    }
}
