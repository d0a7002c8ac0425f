//! Integration tests for the command-line interface.
// The cargo_bin function is marked deprecated in favor of cargo_bin! macro,
// but both work correctly. Suppressing until assert_cmd stabilizes the new API.
#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const WRITE_OUTPUTS: &str =
    r#"'for f in ${out.*}; do mkdir -p "$(dirname "$f")"; echo ok > "$f"; done'"#;

/// Volume-only pipeline whose tools just write their declared outputs,
/// except `failing`, which exits non-zero.
fn volume_config(failing: Option<&str>) -> String {
    let mut config =
        String::from("settings:\n  nprocs: 2\n  mem_gb: 8\nrun:\n  recon: none\ntools:\n");
    for op in ["conform", "n4", "brain_extraction", "fast", "ants_registration"] {
        if failing == Some(op) {
            config.push_str(&format!("  {}: 'echo {} failed >&2; exit 3'\n", op, op));
        } else {
            config.push_str(&format!("  {}: {}\n", op, WRITE_OUTPUTS));
        }
    }
    config
}

const MANIFEST: &str = "\"01\":\n  t1w: [raw/sub-01_T1w.nii.gz]\n";

fn setup_project(config: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    let config_dir = temp.path().join(".anatprep");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.yml"), config).unwrap();
    fs::create_dir_all(temp.path().join("raw")).unwrap();
    fs::write(temp.path().join("raw/sub-01_T1w.nii.gz"), "raw").unwrap();
    fs::write(temp.path().join("inputs.yml"), MANIFEST).unwrap();
    temp
}

fn anatprep(root: &Path) -> Command {
    let mut cmd = Command::new(cargo_bin("anatprep"));
    cmd.current_dir(root).env("NO_COLOR", "1").env_remove("ANATPREP_INPUTS");
    cmd
}

#[test]
fn help_lists_commands() {
    let temp = TempDir::new().unwrap();
    anatprep(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn version_flag() {
    let temp = TempDir::new().unwrap();
    anatprep(temp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    let temp = TempDir::new().unwrap();
    anatprep(temp.path()).assert().failure().code(2);
}

#[test]
fn rules_need_no_project() {
    let temp = TempDir::new().unwrap();
    anatprep(temp.path())
        .arg("rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("recon_freesurfer"))
        .stdout(predicate::str::contains("anat_preproc"));
}

#[test]
fn completions_for_bash() {
    let temp = TempDir::new().unwrap();
    anatprep(temp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("anatprep"));
}

#[test]
fn plan_json_lists_steps() {
    let temp = setup_project(&volume_config(None));
    let output = anatprep(temp.path())
        .args(["plan", "--inputs", "inputs.yml", "--json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let plans: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let steps = plans[0]["steps"].as_array().unwrap();
    assert!(steps.iter().all(|s| s["action"] == "run"));
    assert!(steps.iter().any(|s| s["step"] == "tissue_segmentation"));
    assert!(!temp.path().join("work").exists());
}

#[test]
fn run_then_resume() {
    let temp = setup_project(&volume_config(None));

    anatprep(temp.path())
        .args(["run", "-i", "inputs.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sub-01"));
    assert!(temp.path().join("work/sub-01/state.yml").exists());
    assert!(temp.path().join("work/sub-01/report.json").exists());

    anatprep(temp.path())
        .args(["run", "-i", "inputs.yml", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 of"));

    anatprep(temp.path())
        .args(["status", "01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("steps satisfied"));

    anatprep(temp.path())
        .args(["history", "sub-01", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"subject_id\""));
}

#[test]
fn failing_tool_exits_one() {
    let config = volume_config(Some("fast"));
    let temp = setup_project(&config);

    anatprep(temp.path())
        .args(["run", "-i", "inputs.yml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("tissue_segmentation"));
}

#[test]
fn invalid_config_exits_two() {
    let temp = setup_project("settings:\n  nprocs: 0\n");

    anatprep(temp.path())
        .args(["run", "-i", "inputs.yml"])
        .assert()
        .code(2);
    assert!(!temp.path().join("work").exists());
}

#[test]
fn unknown_participant_exits_two() {
    let temp = setup_project(&volume_config(None));

    anatprep(temp.path())
        .args(["run", "-i", "inputs.yml", "--participant", "99"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("99"));
}

#[test]
fn graph_writes_dot() {
    let temp = setup_project(&volume_config(None));

    anatprep(temp.path())
        .args(["graph", "-i", "inputs.yml"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph"))
        .stdout(predicate::str::contains("bias_correct"));
}

#[test]
fn project_flag_overrides_working_directory() {
    let temp = setup_project(&volume_config(None));
    let elsewhere = TempDir::new().unwrap();

    anatprep(elsewhere.path())
        .arg("--project")
        .arg(temp.path())
        .args(["plan", "-i", "inputs.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("steps would run"));
}

#[cfg(unix)]
#[test]
fn second_interrupt_terminates_immediately() {
    use std::os::unix::process::ExitStatusExt;
    use std::process::Stdio;
    use std::time::{Duration, Instant};

    let config = volume_config(None).replace(
        &format!("  conform: {}\n", WRITE_OUTPUTS),
        "  conform: 'sleep 5'\n",
    );
    let temp = setup_project(&config);
    let mut child = std::process::Command::new(cargo_bin("anatprep"))
        .current_dir(temp.path())
        .args(["run", "-i", "inputs.yml"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let state = temp.path().join("work/sub-01/state.yml");
    let deadline = Instant::now() + Duration::from_secs(4);
    while !fs::read_to_string(&state).is_ok_and(|s| s.contains("running")) {
        assert!(Instant::now() < deadline, "conform never started");
        std::thread::sleep(Duration::from_millis(20));
    }

    let pid = child.id() as libc::pid_t;
    unsafe { libc::kill(pid, libc::SIGINT) };
    std::thread::sleep(Duration::from_millis(300));
    let sent = Instant::now();
    unsafe { libc::kill(pid, libc::SIGINT) };

    let status = child.wait().unwrap();
    assert!(sent.elapsed() < Duration::from_secs(3));
    assert_eq!(status.signal(), Some(libc::SIGINT));
}
