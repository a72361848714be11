//! # testdock Integration Test Helpers
//!
//! File: testdock/tests/common.rs
//!
//! Shared helpers for the integration tests. Tests that talk to a real Docker
//! daemon are `#[ignore]`d; run them with `cargo test -- --ignored`.
//!

// Different test files use different helpers.
#![allow(dead_code)]

pub use assert_cmd::Command;
use std::path::PathBuf;
use std::sync::Arc;
use testdock::common::docker::{DockerEngine, Engine};

/// `testdock` binary with configuration isolated from the developer's machine.
///
/// `config_home` becomes HOME and XDG_CONFIG_HOME so no user config is picked up.
pub fn testdock_cmd(config_home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("testdock").expect("Failed to find testdock binary for testing");
    cmd.env("HOME", config_home)
        .env("XDG_CONFIG_HOME", config_home)
        .env_remove("TESTDOCK_HOST_OVERRIDE")
        .env_remove("RUST_LOG");
    cmd
}

/// Engine for the local Docker daemon (honors DOCKER_HOST).
pub fn docker_engine() -> Arc<dyn Engine> {
    DockerEngine::from_env()
        .expect("Docker must be reachable for ignored tests")
        .shared()
}

/// Build context shipped with the tests, under `tests/assets`.
pub fn asset_dir(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("assets")
        .join(name)
}
