//! End-to-end CLI tests for the mdpack binary.
//!
//! Every case here exits before the listener is bound.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn mdpack() -> Command {
    let mut cmd = Command::cargo_bin("mdpack").unwrap();
    // Keep the developer's environment out of the parsed flags.
    for var in [
        "MDPACK_CONFIG",
        "MDPACK_BIND",
        "MDPACK_CONCURRENCY",
        "MDPACK_MAX_RETRIES",
        "MDPACK_STORAGE_DIR",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    mdpack()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Convert documents"))
        .stdout(predicate::str::contains("--concurrency"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    mdpack()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mdpack"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    mdpack()
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_rejects_out_of_range_concurrency() {
    mdpack()
        .args(["--concurrency", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_binary_rejects_missing_config_file() {
    let dir = TempDir::new().unwrap();
    mdpack()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.toml"));
}

#[test]
fn test_binary_rejects_invalid_config_value() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("mdpack.toml");
    std::fs::write(&config, "max_retries = 42\n").unwrap();
    mdpack()
        .arg("--config")
        .arg(&config)
        .arg("--storage-dir")
        .arg(dir.path().join("data"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_retries"));
}
