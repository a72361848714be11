//! # testdock Configuration System
//!
//! File: testdock/src/core/config.rs
//!
//! ## Overview
//!
//! This module loads the settings that are passed through to the container-engine
//! client (endpoint, request timeout, API version) plus a few defaults used when
//! running containers. The library itself never interprets engine options beyond
//! choosing the matching `bollard` constructor.
//!
//! ## Architecture
//!
//! Configuration sources (in order of precedence):
//! 1. Environment: `DOCKER_HOST`, `TESTDOCK_HOST_OVERRIDE`
//! 2. Project-specific `testdock.toml` in the current directory or ancestors
//! 3. User-specific `config.toml` in the platform config dir (`directories`)
//! 4. Default values defined in the code
//!
//! ## Examples
//!
//! ```toml
//! [engine]
//! host = "tcp://192.168.1.20:2375"
//! timeout_secs = 300
//! api_version = "1.43"
//!
//! [containers]
//! startup_timeout_secs = 90
//! ```
//!
use crate::core::error::{Error, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Represents the main configuration structure, loaded from TOML files.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub containers: ContainerDefaults,
}

/// Connection settings forwarded to the engine client.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Engine endpoint (`unix:///var/run/docker.sock`, `tcp://host:2375`, `http://...`).
    /// `None` uses the client's local defaults.
    #[serde(default)]
    pub host: Option<String>,
    /// Request timeout applied by the engine client, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Engine API version as `MAJOR.MINOR`. `None` uses the client default.
    #[serde(default)]
    pub api_version: Option<String>,
    /// Address reported as the host IP of started containers.
    #[serde(default)]
    pub host_override: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: None,
            timeout_secs: default_timeout_secs(),
            api_version: None,
            host_override: None,
        }
    }
}

/// Defaults applied when starting and stopping containers.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ContainerDefaults {
    /// Grace period given to `docker stop` before the engine kills the container.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u32,
    /// Deadline for a container's wait strategy after it has started.
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

impl Default for ContainerDefaults {
    fn default() -> Self {
        Self {
            stop_timeout_secs: default_stop_timeout_secs(),
            startup_timeout_secs: default_startup_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}
fn default_stop_timeout_secs() -> u32 {
    10
}
fn default_startup_timeout_secs() -> u64 {
    60
}

const PROJECT_CONFIG_FILENAME: &str = "testdock.toml";
const DOCKER_HOST_ENV: &str = "DOCKER_HOST";
const HOST_OVERRIDE_ENV: &str = "TESTDOCK_HOST_OVERRIDE";

/// Loads, merges, applies environment overrides to, and validates the configuration.
pub fn load_config() -> Result<Config> {
    let user_config = load_user_config()?;
    let project_config = load_project_config()?;
    let mut merged = merge_configs(user_config.unwrap_or_default(), project_config);
    apply_env_overrides(
        &mut merged,
        std::env::var(DOCKER_HOST_ENV).ok(),
        std::env::var(HOST_OVERRIDE_ENV).ok(),
    );
    validate_config(&merged)?;
    debug!("Final loaded configuration: {:?}", merged);
    Ok(merged)
}

fn load_user_config() -> Result<Option<Config>> {
    let Some(proj_dirs) = ProjectDirs::from("org", "testdock", "testdock") else {
        warn!("Could not determine user config directory.");
        return Ok(None);
    };
    let config_path = proj_dirs.config_dir().join("config.toml");
    if config_path.exists() {
        info!("Loading user configuration from: {}", config_path.display());
        load_config_from_path(&config_path).map(Some)
    } else {
        debug!(
            "User configuration file not found at {}",
            config_path.display()
        );
        Ok(None)
    }
}

fn load_project_config() -> Result<Option<Config>> {
    let current_dir = std::env::current_dir()
        .map_err(|e| Error::FileSystem(format!("Failed to get current directory: {}", e)))?;
    match find_project_config_path(&current_dir) {
        Some(path) => {
            info!("Loading project configuration from: {}", path.display());
            load_config_from_path(&path).map(Some)
        }
        None => {
            debug!("No {} found in current directory or ancestors.", PROJECT_CONFIG_FILENAME);
            Ok(None)
        }
    }
}

/// Walks up from `start` looking for `testdock.toml`, stopping at a repository root.
fn find_project_config_path(start: &Path) -> Option<PathBuf> {
    let mut path = start;
    loop {
        let candidate = path.join(PROJECT_CONFIG_FILENAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if path.join(".git").is_dir() {
            debug!(
                "Found .git directory at {}, stopping project config search.",
                path.display()
            );
            return None;
        }
        path = path.parent()?;
    }
}

pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::FileSystem(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;
    toml::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse TOML from file {}: {}",
            path.display(),
            e
        ))
    })
}

/// Project values win over user values wherever the project sets something
/// other than the default.
fn merge_configs(user: Config, project: Option<Config>) -> Config {
    let Some(project) = project else {
        return user;
    };
    let defaults = Config::default();
    Config {
        engine: EngineConfig {
            host: project.engine.host.or(user.engine.host),
            timeout_secs: if project.engine.timeout_secs != defaults.engine.timeout_secs {
                project.engine.timeout_secs
            } else {
                user.engine.timeout_secs
            },
            api_version: project.engine.api_version.or(user.engine.api_version),
            host_override: project.engine.host_override.or(user.engine.host_override),
        },
        containers: ContainerDefaults {
            stop_timeout_secs: if project.containers.stop_timeout_secs
                != defaults.containers.stop_timeout_secs
            {
                project.containers.stop_timeout_secs
            } else {
                user.containers.stop_timeout_secs
            },
            startup_timeout_secs: if project.containers.startup_timeout_secs
                != defaults.containers.startup_timeout_secs
            {
                project.containers.startup_timeout_secs
            } else {
                user.containers.startup_timeout_secs
            },
        },
    }
}

fn apply_env_overrides(
    config: &mut Config,
    docker_host: Option<String>,
    host_override: Option<String>,
) {
    if let Some(host) = docker_host.filter(|h| !h.trim().is_empty()) {
        debug!("{} overrides engine host: {}", DOCKER_HOST_ENV, host);
        config.engine.host = Some(host);
    }
    if let Some(host) = host_override.filter(|h| !h.trim().is_empty()) {
        debug!("{} overrides container host: {}", HOST_OVERRIDE_ENV, host);
        config.engine.host_override = Some(host);
    }
}

/// Parses `MAJOR.MINOR` into its two components.
pub(crate) fn parse_api_version(version: &str) -> Option<(usize, usize)> {
    let (major, minor) = version.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

pub fn validate_config(config: &Config) -> Result<()> {
    if let Some(host) = &config.engine.host {
        let supported = ["unix://", "tcp://", "http://"];
        if !supported.iter().any(|scheme| host.starts_with(scheme)) {
            return Err(Error::Config(format!(
                "Unsupported engine host '{}'. Expected one of: {}",
                host,
                supported.join(", ")
            )));
        }
    }
    if let Some(version) = &config.engine.api_version {
        if parse_api_version(version).is_none() {
            return Err(Error::Config(format!(
                "Invalid api_version '{}'. Expected MAJOR.MINOR, e.g. 1.43.",
                version
            )));
        }
    }
    if config.engine.timeout_secs == 0 {
        return Err(Error::Config(
            "engine.timeout_secs must be greater than zero.".to_string(),
        ));
    }
    if config.containers.startup_timeout_secs == 0 {
        return Err(Error::Config(
            "containers.startup_timeout_secs must be greater than zero.".to_string(),
        ));
    }
    Ok(())
}
