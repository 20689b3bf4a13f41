use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const ROCK_SALT: &str = r#"data_rocksalt
_cell_length_a 5.64
_cell_length_b 5.64
_cell_length_c 5.64
_cell_angle_alpha 90.0
_cell_angle_beta 90.0
_cell_angle_gamma 90.0
loop_
_space_group_symop_operation_xyz
'x, y, z'
'x+1/2, y+1/2, z'
'x+1/2, y, z+1/2'
'x, y+1/2, z+1/2'
loop_
_atom_site_label
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Na1 0 0 0
Cl1 0.5 0.5 0.5
"#;

fn lamopt(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lamopt"))
        .args(args)
        .env_remove("BOHRIUM_ACCESS_KEY")
        .output()
        .expect("failed to run lamopt")
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[test]
fn validate_cif_accepts_good_and_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("nacl.cif");
    let bad = dir.path().join("bad.cif");
    fs::write(&good, ROCK_SALT).unwrap();
    fs::write(&bad, "this is not a crystal\n").unwrap();

    assert!(lamopt(&["validate-cif", path_str(&good)]).status.success());

    let out = lamopt(&["validate-cif", path_str(&bad)]);
    assert!(!out.status.success());
    assert!(!out.stderr.is_empty());
}

#[test]
fn unknown_potential_fails_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let out = lamopt(&[
        "relax",
        "-i",
        path_str(dir.path()),
        "--potential",
        "mace",
        "--skip-check-duplicate",
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Unsupported potential"));
}

#[test]
fn relax_writes_results_and_one_structure() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    let work = dir.path().join("work");
    fs::create_dir_all(input.join("nested")).unwrap();
    fs::create_dir_all(&work).unwrap();
    fs::write(input.join("nested").join("nacl.cif"), ROCK_SALT).unwrap();
    fs::write(input.join("notes.txt"), "ignored").unwrap();

    let results = work.join("results.json");
    let trajectories = work.join("traj");
    let out = lamopt(&[
        "relax",
        "-i",
        path_str(&input),
        "--optimizer",
        "fire",
        "--fix-cell",
        "--steps",
        "5",
        "--skip-check-duplicate",
        "--trajectory-dir",
        path_str(&trajectories),
        "--output-dir",
        path_str(&work),
        "-o",
        path_str(&results),
    ]);
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&results).unwrap()).unwrap();
    let entry = &value["nacl"];
    assert!(entry["final_energy"].is_number());
    assert!(entry["duplicate"].is_null());
    assert!(entry["converged"].is_boolean());

    let written = count_files(&work.join("relaxed")) + count_files(&work.join("unconverged"));
    assert_eq!(written, 1);

    let traj = trajectories.join("nacl.traj");
    assert!(traj.is_file());
    let out = lamopt(&["trajectory", path_str(&traj)]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("Energy (eV)"));
}

#[test]
fn evaluate_reports_energy_and_forces() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("nacl.cif"), ROCK_SALT).unwrap();
    let output = dir.path().join("evaluation.json");

    let out = lamopt(&[
        "evaluate",
        "-i",
        path_str(dir.path()),
        "--potential",
        "morse",
        "-o",
        path_str(&output),
    ]);
    assert!(out.status.success());

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert!(value["nacl"]["potential_energy"].is_number());
    assert!(value["nacl"]["forces"].is_array());
}
