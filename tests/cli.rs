// Integration tests for the playlog binary

use assert_cmd::Command;
use playlog_ledger::{RecordFile, UserId};
use predicates::prelude::*;
use tempfile::TempDir;

#[allow(deprecated)]
fn playlog(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("playlog").expect("playlog binary should be built");
    cmd.current_dir(dir.path());
    for key in ["PLAYLOG_CONFIG", "PLAYLOG_CONFIG_CONTENT", "PLAYLOG_LOG_LEVEL", "RUST_LOG"] {
        cmd.env_remove(key);
    }
    cmd.env("PLAYLOG_LOG_FORMAT", "json");
    cmd
}

fn record_file(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("2024-06.json");
    let file = RecordFile::new(&path);
    file.create("pl-1", 1_717_200_000).unwrap();
    file.update(|epoch| epoch.append(UserId(7), "t1", 1_717_200_100)).unwrap();
    path
}

#[test]
fn test_inspect_summarises_and_logs() {
    let dir = TempDir::new().unwrap();
    let path = record_file(&dir);

    playlog(&dir)
        .args(["--log-level", "info", "inspect"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tracks\": 1"))
        .stderr(predicate::str::contains("Reading record file"));
}

#[test]
fn test_leaderboard_logs_through_configured_subscriber() {
    let dir = TempDir::new().unwrap();
    let path = record_file(&dir);

    playlog(&dir)
        .args(["--log-level", "info", "leaderboard", "--file"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Total tracks: 1"))
        .stderr(predicate::str::contains("Reading record file"));
}

#[test]
fn test_broken_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("playlog.toml"), "[rotation\n").unwrap();

    playlog(&dir)
        .args(["inspect", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("playlog.toml"));
}
