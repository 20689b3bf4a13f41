//! # 收敛性判断
//!
//! 弛豫后的结构满足以下任一条件即视为未收敛：
//! - 每原子形成能 > 0
//! - 最大原子受力 > 0.05 eV/Å
//!
//! 受力由计算器对终态结构重新计算得到。
//!
//! ## 依赖关系
//! - 被 `batch/pipeline.rs` 使用
//! - 使用 `analysis/reference.rs`, `calculators/`

use super::reference::ReferenceEnergies;
use crate::calculators::Calculator;
use crate::error::Result;
use crate::models::Crystal;

use std::fmt;
use std::sync::Arc;

/// 形成能上限 (eV/atom)
pub const FORMATION_ENERGY_THRESHOLD: f64 = 0.0;

/// 受力上限 (eV/Å)
pub const FORCE_THRESHOLD: f64 = 0.05;

/// 收敛判据
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceCriteria {
    pub max_formation_energy: f64,
    pub max_force: f64,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        ConvergenceCriteria {
            max_formation_energy: FORMATION_ENERGY_THRESHOLD,
            max_force: FORCE_THRESHOLD,
        }
    }
}

impl ConvergenceCriteria {
    /// 给定形成能与最大受力，返回拒绝原因（能量判据优先）
    pub fn classify(&self, formation_energy_per_atom: f64, max_force: f64) -> Option<Rejection> {
        if formation_energy_per_atom > self.max_formation_energy {
            Some(Rejection::FormationEnergy(formation_energy_per_atom))
        } else if max_force > self.max_force {
            Some(Rejection::Force(max_force))
        } else {
            None
        }
    }
}

/// 未收敛原因
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    FormationEnergy(f64),
    Force(f64),
    MissingReference(Vec<String>),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::FormationEnergy(e) => {
                write!(f, "formation energy {:.4} eV/atom is positive", e)
            }
            Rejection::Force(force) => write!(f, "max force {:.4} eV/A exceeds threshold", force),
            Rejection::MissingReference(elements) => {
                write!(f, "no reference energy for {}", elements.join(", "))
            }
        }
    }
}

/// 判断结果
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceVerdict {
    pub formation_energy_per_atom: Option<f64>,
    pub max_force: f64,
    pub rejection: Option<Rejection>,
}

impl ConvergenceVerdict {
    pub fn converged(&self) -> bool {
        self.rejection.is_none()
    }
}

/// 收敛性检查器
pub struct ConvergenceChecker {
    calculator: Arc<dyn Calculator>,
    reference: ReferenceEnergies,
    criteria: ConvergenceCriteria,
}

impl ConvergenceChecker {
    pub fn new(
        calculator: Arc<dyn Calculator>,
        reference: ReferenceEnergies,
        criteria: ConvergenceCriteria,
    ) -> Self {
        ConvergenceChecker {
            calculator,
            reference,
            criteria,
        }
    }

    /// 检查终态结构；计算器失败直接返回错误
    pub fn check(&self, crystal: &Crystal, energy: f64) -> Result<ConvergenceVerdict> {
        let max_force = self.calculator.calculate(crystal)?.max_force();

        let missing = self.reference.missing_elements(crystal);
        if !missing.is_empty() {
            return Ok(ConvergenceVerdict {
                formation_energy_per_atom: None,
                max_force,
                rejection: Some(Rejection::MissingReference(missing)),
            });
        }

        let formation = self.reference.formation_energy_per_atom(crystal, energy);
        let rejection = match formation {
            Some(e_form) => self.criteria.classify(e_form, max_force),
            None => Some(Rejection::MissingReference(Vec::new())),
        };
        Ok(ConvergenceVerdict {
            formation_energy_per_atom: formation,
            max_force,
            rejection,
        })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use crate::calculators::{CalcResults, Calculator};
    use crate::error::Result;
    use crate::models::Crystal;

    /// 返回固定每原子能量与固定受力的计算器
    pub struct FixedCalculator {
        pub energy_per_atom: f64,
        pub force: f64,
    }

    impl Calculator for FixedCalculator {
        fn name(&self) -> &str {
            "fixed"
        }

        fn calculate(&self, crystal: &Crystal) -> Result<CalcResults> {
            let n = crystal.len();
            let mut forces = vec![[0.0; 3]; n];
            if n > 0 {
                forces[0] = [self.force, 0.0, 0.0];
            }
            Ok(CalcResults {
                energy: self.energy_per_atom * n as f64,
                forces,
                stress: [[0.0; 3]; 3],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::FixedCalculator;
    use super::*;
    use crate::models::structure::fixtures::rock_salt;
    use crate::models::{Atom, Lattice};

    #[test]
    fn test_classify_thresholds() {
        let criteria = ConvergenceCriteria::default();
        assert!(matches!(
            criteria.classify(0.01, 0.01),
            Some(Rejection::FormationEnergy(_))
        ));
        assert!(matches!(criteria.classify(-0.01, 0.1), Some(Rejection::Force(_))));
        assert_eq!(criteria.classify(-0.01, 0.01), None);
    }

    fn sodium() -> Crystal {
        let lattice = Lattice::from_parameters(4.2, 4.2, 4.2, 90.0, 90.0, 90.0);
        Crystal::new(
            "Na",
            lattice,
            vec![Atom::new("Na", [0.0; 3]), Atom::new("Na", [0.5; 3])],
        )
    }

    fn checker(energy_per_atom: f64, force: f64) -> ConvergenceChecker {
        ConvergenceChecker::new(
            Arc::new(FixedCalculator {
                energy_per_atom,
                force,
            }),
            ReferenceEnergies::default(),
            ConvergenceCriteria::default(),
        )
    }

    #[test]
    fn test_checker_uses_reference_table_and_recomputed_forces() {
        let crystal = sodium();
        // Na 参考能量 -1.3225；形成能 -0.02 eV/atom
        let energy = 2.0 * (-1.3225 - 0.02);

        let verdict = checker(-1.3425, 0.01).check(&crystal, energy).unwrap();
        assert!(verdict.converged());
        assert!((verdict.formation_energy_per_atom.unwrap() + 0.02).abs() < 1e-9);
        assert!((verdict.max_force - 0.01).abs() < 1e-12);

        let verdict = checker(-1.3425, 0.2).check(&crystal, energy).unwrap();
        assert!(matches!(verdict.rejection, Some(Rejection::Force(f)) if (f - 0.2).abs() < 1e-12));

        let verdict = checker(-1.3425, 0.0).check(&crystal, 2.0 * -1.30).unwrap();
        assert!(matches!(verdict.rejection, Some(Rejection::FormationEnergy(_))));
    }

    #[test]
    fn test_missing_reference_is_unconverged() {
        let mut crystal = rock_salt(5.64);
        crystal.atoms[0].element = "Po".to_string();
        let verdict = checker(-3.0, 0.0).check(&crystal, -24.0).unwrap();
        assert!(!verdict.converged());
        assert_eq!(
            verdict.rejection,
            Some(Rejection::MissingReference(vec!["Po".to_string()]))
        );
    }
}
