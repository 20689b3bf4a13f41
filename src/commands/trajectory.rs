//! # trajectory 命令实现
//!
//! 读取弛豫轨迹，逐步打印能量、最大受力与晶胞体积。
//!
//! ## 依赖关系
//! - 使用 `cli/trajectory.rs` 定义的参数
//! - 使用 `relax/trajectory.rs`

use crate::calculators::max_force;
use crate::cli::trajectory::TrajectoryArgs;
use crate::error::{LamOptError, Result};
use crate::models::Lattice;
use crate::relax::Trajectory;
use crate::utils::output;

use std::path::Path;
use tabled::{Table, Tabled};

/// 轨迹表行
#[derive(Debug, Clone, Tabled)]
struct StepRow {
    #[tabled(rename = "Step")]
    step: usize,
    #[tabled(rename = "Energy (eV)")]
    energy: String,
    #[tabled(rename = "ΔE (eV)")]
    delta: String,
    #[tabled(rename = "Fmax (eV/Å)")]
    fmax: String,
    #[tabled(rename = "Volume (Å³)")]
    volume: String,
}

/// 每一步的 (能量, 最大受力, 体积)
fn step_values(traj: &Trajectory) -> Vec<(f64, f64, f64)> {
    traj.energy
        .iter()
        .enumerate()
        .map(|(i, &energy)| {
            let fmax = traj.forces.get(i).map(|f| max_force(f)).unwrap_or(0.0);
            let volume = traj
                .cell
                .get(i)
                .map(|cell| Lattice::from_vectors(*cell).volume())
                .unwrap_or(0.0);
            (energy, fmax, volume)
        })
        .collect()
}

/// 执行 trajectory 命令
pub fn execute(args: TrajectoryArgs) -> Result<()> {
    output::print_header("Relaxation Trajectory");

    let traj = Trajectory::load(&args.file)?;
    if traj.is_empty() {
        output::print_warning("Trajectory contains no steps.");
        return Ok(());
    }

    let values = step_values(&traj);
    let first = values[0].0;
    let rows: Vec<StepRow> = values
        .iter()
        .enumerate()
        .map(|(i, (energy, fmax, volume))| StepRow {
            step: i,
            energy: format!("{:.6}", energy),
            delta: format!("{:.6}", energy - first),
            fmax: format!("{:.4}", fmax),
            volume: format!("{:.3}", volume),
        })
        .collect();
    println!("{}", Table::new(&rows));

    output::print_info(&format!(
        "{} steps, {} atoms",
        traj.len(),
        traj.atomic_number.len()
    ));
    if let (Some(e0), Some(e1)) = (traj.first_energy(), traj.last_energy()) {
        output::print_info(&format!("Energy change: {:.6} eV", e1 - e0));
    }

    if let Some(csv_path) = &args.csv {
        save_steps_csv(&values, csv_path)?;
        output::print_written("CSV", &csv_path.display().to_string());
    }
    Ok(())
}

fn save_steps_csv(values: &[(f64, f64, f64)], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;
    wtr.write_record(["step", "energy_eV", "max_force_eV_per_A", "volume_A3"])?;
    for (i, (energy, fmax, volume)) in values.iter().enumerate() {
        wtr.write_record([
            i.to_string(),
            format!("{:.10}", energy),
            format!("{:.10}", fmax),
            format!("{:.10}", volume),
        ])?;
    }
    wtr.flush().map_err(|e| LamOptError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })
}
