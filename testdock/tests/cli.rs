//! # testdock CLI Integration Tests
//!
//! File: testdock/tests/cli.rs
//!
//! Runs the `testdock` binary. None of these tests need Docker: they cover
//! argument handling and the failure paths that are decided before or by an
//! unreachable engine.
//!

mod common;
use common::*;
use predicates::prelude::*;
use tempfile::tempdir;

// Nothing listens on port 1, so every engine request is refused.
const UNREACHABLE_HOST: &str = "tcp://127.0.0.1:1";

#[test]
fn test_help_flag() {
    let home = tempdir().unwrap();
    testdock_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("image"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_version_flag() {
    let home = tempdir().unwrap();
    testdock_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_exists_reports_unreachable_engine() {
    let home = tempdir().unwrap();
    testdock_cmd(home.path())
        .env("DOCKER_HOST", UNREACHABLE_HOST)
        .args(["image", "exists", "alpine:latest"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("false").not())
        .stderr(predicate::str::contains("Cannot reach the container engine"));
}

#[test]
fn test_build_rejects_missing_context() {
    let home = tempdir().unwrap();
    let missing = home.path().join("no-such-context");
    testdock_cmd(home.path())
        .env("DOCKER_HOST", UNREACHABLE_HOST)
        .args(["image", "build", missing.to_str().unwrap(), "-t", "never-built"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a directory"));
}

#[test]
fn test_invalid_docker_host_scheme() {
    let home = tempdir().unwrap();
    testdock_cmd(home.path())
        .env("DOCKER_HOST", "ftp://example.com")
        .args(["image", "exists", "alpine"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load testdock configuration"));
}

#[test]
fn test_run_rejects_non_numeric_port() {
    let home = tempdir().unwrap();
    testdock_cmd(home.path())
        .args(["run", "nginx", "-p", "http"])
        .assert()
        .failure()
        .code(2);
}

#[test]
#[ignore] // Requires Docker
fn test_exists_against_local_daemon() {
    let home = tempdir().unwrap();
    testdock_cmd(home.path())
        .args(["image", "exists", "testdock/definitely-missing:never"])
        .assert()
        .success()
        .stdout(predicate::str::diff("false\n"));
}
