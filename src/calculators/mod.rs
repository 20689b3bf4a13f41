//! # 计算器模块
//!
//! 势函数计算能力：给定一个结构，返回势能、每原子受力与应力张量。
//!
//! ## 功能
//! - `Calculator` trait：弛豫与分类器共同使用的计算接口
//! - `CalculatorSpec`：在构造 Relaxer 时一次性选定（模型文件或内置势）
//! - 内置势：`lennard-jones`、`morse`
//!
//! ## 约定
//! - 能量 eV，力 eV/Å，应力 eV/Å³
//! - 应力符号与 ASE 一致：σ = (1/V) ∂E/∂ε，受压时为负
//!
//! ## 依赖关系
//! - 被 `relax/`, `analysis/`, `batch/` 使用
//! - 子模块: pair, model

pub mod model;
pub mod pair;

pub use pair::{PairFunction, PairPotential};

use crate::error::{LamOptError, Result};
use crate::models::Crystal;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// 单次计算结果
#[derive(Debug, Clone, PartialEq)]
pub struct CalcResults {
    /// 总势能 (eV)
    pub energy: f64,
    /// 每原子受力 (eV/Å)
    pub forces: Vec<[f64; 3]>,
    /// 应力张量 (eV/Å³)
    pub stress: [[f64; 3]; 3],
}

impl CalcResults {
    /// 最大原子受力模长
    pub fn max_force(&self) -> f64 {
        max_force(&self.forces)
    }
}

/// 最大原子受力模长；空列表返回 0
pub fn max_force(forces: &[[f64; 3]]) -> f64 {
    forces
        .iter()
        .map(|f| (f[0] * f[0] + f[1] * f[1] + f[2] * f[2]).sqrt())
        .fold(0.0, f64::max)
}

/// 势函数计算接口
///
/// 实现必须线程安全：同一个计算器会被弛豫和分类阶段共享。
pub trait Calculator: Send + Sync {
    /// 计算器名称（用于日志）
    fn name(&self) -> &str;

    /// 计算能量、受力与应力
    fn calculate(&self, crystal: &Crystal) -> Result<CalcResults>;
}

/// 内置势函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinPotential {
    LennardJones,
    Morse,
}

impl BuiltinPotential {
    pub const ALL: [BuiltinPotential; 2] = [BuiltinPotential::LennardJones, BuiltinPotential::Morse];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinPotential::LennardJones => "lennard-jones",
            BuiltinPotential::Morse => "morse",
        }
    }

    /// 按名称查找，大小写与下划线不敏感
    pub fn from_name(name: &str) -> Option<Self> {
        let key = name.trim().to_lowercase().replace('_', "-");
        match key.as_str() {
            "lennard-jones" | "lj" => Some(BuiltinPotential::LennardJones),
            "morse" => Some(BuiltinPotential::Morse),
            _ => None,
        }
    }

    fn build(&self) -> PairPotential {
        match self {
            BuiltinPotential::LennardJones => PairPotential::lennard_jones(),
            BuiltinPotential::Morse => PairPotential::morse(),
        }
    }
}

impl fmt::Display for BuiltinPotential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 计算器选择
#[derive(Debug, Clone, PartialEq)]
pub enum CalculatorSpec {
    /// 模型文件路径
    Model(PathBuf),
    /// 内置势
    Builtin(BuiltinPotential),
}

impl CalculatorSpec {
    /// 从内置势名称创建；未知名称立即报错
    pub fn from_potential_name(name: &str) -> Result<Self> {
        BuiltinPotential::from_name(name)
            .map(CalculatorSpec::Builtin)
            .ok_or_else(|| LamOptError::UnsupportedPotential(name.to_string()))
    }

    /// 构造计算器
    pub fn build(&self) -> Result<Arc<dyn Calculator>> {
        match self {
            CalculatorSpec::Model(path) => Ok(Arc::new(model::load_model(path)?)),
            CalculatorSpec::Builtin(potential) => Ok(Arc::new(potential.build())),
        }
    }
}

impl Default for CalculatorSpec {
    fn default() -> Self {
        CalculatorSpec::Builtin(BuiltinPotential::LennardJones)
    }
}

impl fmt::Display for CalculatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalculatorSpec::Model(path) => write!(f, "model:{}", path.display()),
            CalculatorSpec::Builtin(potential) => write!(f, "{}", potential),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_potential_names() {
        assert_eq!(
            CalculatorSpec::from_potential_name("Lennard_Jones").unwrap(),
            CalculatorSpec::Builtin(BuiltinPotential::LennardJones)
        );
        assert_eq!(
            CalculatorSpec::from_potential_name("morse").unwrap(),
            CalculatorSpec::Builtin(BuiltinPotential::Morse)
        );
        assert!(matches!(
            CalculatorSpec::from_potential_name("mace"),
            Err(LamOptError::UnsupportedPotential(_))
        ));
    }

    #[test]
    fn test_missing_model_fails_at_build() {
        let spec = CalculatorSpec::Model(PathBuf::from("/nonexistent/model.json"));
        assert!(matches!(spec.build(), Err(LamOptError::InvalidModel { .. })));
    }

    #[test]
    fn test_max_force() {
        let forces = vec![[0.0, 0.0, 0.0], [3.0, 4.0, 0.0], [-1.0, 0.0, 0.0]];
        assert!((max_force(&forces) - 5.0).abs() < 1e-12);
        assert_eq!(max_force(&[]), 0.0);
    }
}
