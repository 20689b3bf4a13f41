//! # 轨迹记录
//!
//! 每次观察追加一帧：势能、受力、应力、笛卡尔坐标、晶格矩阵；
//! 原子序数在整个轨迹中固定。保存时以 CBOR 一次性写出。
//!
//! ## 依赖关系
//! - 被 `relax/relaxer.rs`, `commands/trajectory.rs` 使用
//! - 使用 `serde_cbor` 序列化

use super::atoms::Atoms;
use crate::error::{LamOptError, Result};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// 弛豫轨迹
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub energy: Vec<f64>,
    pub forces: Vec<Vec<[f64; 3]>>,
    pub stresses: Vec<[[f64; 3]; 3]>,
    pub atom_positions: Vec<Vec<[f64; 3]>>,
    pub cell: Vec<[[f64; 3]; 3]>,
    pub atomic_number: Vec<u8>,
}

impl Trajectory {
    pub fn new(atomic_number: Vec<u8>) -> Self {
        Trajectory {
            atomic_number,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.energy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energy.is_empty()
    }

    pub fn first_energy(&self) -> Option<f64> {
        self.energy.first().copied()
    }

    pub fn last_energy(&self) -> Option<f64> {
        self.energy.last().copied()
    }

    /// 写出到文件（覆盖已有文件）
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_cbor::to_vec(self)?;
        std::fs::write(path, bytes).map_err(|e| LamOptError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| LamOptError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_cbor::from_slice(&bytes)?)
    }
}

/// 轨迹观察者：绑定一次弛豫调用
#[derive(Debug)]
pub struct TrajectoryObserver {
    trajectory: Trajectory,
}

impl TrajectoryObserver {
    pub fn new(atoms: &Atoms) -> Self {
        TrajectoryObserver {
            trajectory: Trajectory::new(atoms.crystal().atomic_numbers()),
        }
    }

    /// 从当前结构与计算器状态追加一帧
    pub fn observe(&mut self, atoms: &mut Atoms) -> Result<()> {
        let results = atoms.results()?.clone();
        let crystal = atoms.crystal();
        self.trajectory.energy.push(results.energy);
        self.trajectory.forces.push(results.forces);
        self.trajectory.stresses.push(results.stress);
        self.trajectory.atom_positions.push(crystal.cartesian_positions());
        self.trajectory.cell.push(crystal.lattice.matrix);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.trajectory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.trajectory.save(path)
    }

    pub fn into_trajectory(self) -> Trajectory {
        self.trajectory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculators::PairPotential;
    use crate::models::structure::fixtures::rock_salt;
    use std::sync::Arc;

    #[test]
    fn test_observe_and_reload() {
        let mut atoms = Atoms::new(rock_salt(5.5), Arc::new(PairPotential::morse()));
        let mut observer = TrajectoryObserver::new(&atoms);
        observer.observe(&mut atoms).unwrap();

        let mut cart = atoms.crystal().cartesian_positions();
        cart[0][2] += 0.1;
        atoms.set_cartesian_positions(&cart).unwrap();
        observer.observe(&mut atoms).unwrap();
        assert_eq!(observer.len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.traj");
        observer.save(&path).unwrap();

        let trajectory = observer.into_trajectory();
        let loaded = Trajectory::load(&path).unwrap();
        assert_eq!(loaded, trajectory);
        assert_eq!(loaded.atomic_number, vec![11, 11, 11, 11, 17, 17, 17, 17]);
        assert_ne!(loaded.energy[0], loaded.energy[1]);
        assert!((loaded.atom_positions[1][0][2] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.traj");
        std::fs::write(&path, b"not cbor at all").unwrap();
        assert!(Trajectory::load(&path).is_err());
        assert!(Trajectory::load(&dir.path().join("missing.traj")).is_err());
    }
}
