//! Corruption recovery tests for liftplan.
//!
//! These tests verify the system can handle:
//! - Corrupted goal state files
//! - Corrupted WAL files
//! - Corrupted plan assignments
//! - Corrupted schedule files (refused rather than overwritten)

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write as IoWrite;
use std::path::Path;
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("liftplan"))
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn create_session(data_dir: &Path) {
    cli()
        .arg("new")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--date")
        .arg("2024-07-01")
        .arg("--block")
        .arg("Main:deadlift")
        .arg("--sets")
        .arg("1")
        .arg("--weight")
        .arg("100")
        .assert()
        .success();
}

fn run_auto(data_dir: &Path) -> assert_cmd::assert::Assert {
    cli()
        .arg("run")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--date")
        .arg("2024-07-01")
        .arg("--auto-complete")
        .assert()
}

#[test]
fn test_corrupted_goal_state_file() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    create_session(data_dir);

    fs::create_dir_all(data_dir.join("wal")).unwrap();
    fs::write(data_dir.join("wal/goals.json"), "{ invalid json }}}}")
        .expect("Failed to write corrupted goals");

    run_auto(data_dir)
        .success()
        .stdout(predicate::str::contains("Session complete!"));

    // rewritten from defaults
    let content = fs::read_to_string(data_dir.join("wal/goals.json")).unwrap();
    let goals: serde_json::Value = serde_json::from_str(&content).expect("goal state is valid JSON again");
    assert_eq!(goals["athletes"]["local"]["consistency_count"], 1);
}

#[test]
fn test_corrupted_wal_lines_ignored_during_read() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    create_session(data_dir);

    fs::create_dir_all(data_dir.join("wal")).unwrap();
    let wal_path = data_dir.join("wal/workout_logs.wal");
    fs::write(&wal_path, "{ invalid json }\n{ more invalid }\n")
        .expect("Failed to write corrupted WAL");

    // history lookup skips the bad lines
    run_auto(data_dir).success();

    let content = fs::read_to_string(&wal_path).unwrap();
    assert_eq!(content.lines().count(), 3);
    assert!(content.lines().last().unwrap().contains("deadlift"));
}

#[test]
fn test_partial_wal_write() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    create_session(data_dir);
    run_auto(data_dir).success();

    // simulate a crash mid-append
    let wal_path = data_dir.join("wal/workout_logs.wal");
    let mut file = fs::OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(b"{\"id\":\"").unwrap();
    drop(file);

    cli()
        .arg("rollup")
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled up 1 log entries"));
}

#[test]
fn test_corrupted_plan_file_keeps_custom_sessions() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    create_session(data_dir);
    fs::write(data_dir.join("plans.json"), "[not, a, map").unwrap();

    cli()
        .arg("show")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--date")
        .arg("2024-07-01")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deadlift"));
}

#[test]
fn test_corrupted_schedule_is_not_overwritten() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    let schedule_path = data_dir.join("schedule.json");
    fs::write(&schedule_path, "{ \"records\": [ truncated").unwrap();

    cli()
        .arg("new")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--date")
        .arg("2024-07-01")
        .arg("--block")
        .arg("Main:deadlift")
        .assert()
        .failure();

    assert_eq!(
        fs::read_to_string(&schedule_path).unwrap(),
        "{ \"records\": [ truncated"
    );
}

#[test]
fn test_missing_data_dir_is_created() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("nested/data");
    create_session(&data_dir);

    run_auto(&data_dir).success();
    assert!(data_dir.join("wal/workout_logs.wal").exists());
}
