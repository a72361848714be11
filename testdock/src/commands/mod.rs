//! # testdock Command Modules
//!
//! File: testdock/src/commands/mod.rs
//!
//! ## Overview
//!
//! Command groups of the `testdock` CLI. Each group defines its clap arguments
//! and an async handler returning `anyhow::Result`; library errors are wrapped
//! with context here and printed once by `main`.
//!
//! - `image`: build, pull, inspect, exists, rm
//! - `run`: run a container until Ctrl-C
//!

/// Image command group (`testdock image ...`).
pub mod image;
/// `testdock run`.
pub mod run;

use anyhow::Context;
use std::sync::Arc;
use testdock::common::docker::{DockerEngine, Engine};
use testdock::core::config::{self, Config};

/// Loads the configuration and connects to the engine it describes.
pub(crate) fn connect_engine() -> anyhow::Result<(Config, Arc<dyn Engine>)> {
    let config = config::load_config().context("Failed to load testdock configuration")?;
    let engine = DockerEngine::connect(&config.engine)
        .context("Failed to connect to the container engine")?
        .shared();
    Ok((config, engine))
}

/// Parses `KEY=VALUE` arguments such as `--build-arg` and `--env`.
pub(crate) fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}
