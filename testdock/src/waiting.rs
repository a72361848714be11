//! # testdock Readiness Waiting (`waiting`)
//!
//! File: testdock/src/waiting.rs
//!
//! ## Overview
//!
//! A started container is not necessarily ready to serve. These helpers poll
//! until a container signals readiness, either by printing a log line matching a
//! pattern or by answering HTTP requests, and give up with `Error::Timeout` after
//! an explicit deadline.
//!
//! `WaitFor` is the declarative form used by `ContainerRequest`; `start` applies
//! it before handing the container to the caller.
//!
use crate::container::ContainerHandle;
use crate::core::error::{Error, Result};
use regex::Regex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Readiness condition checked after a container starts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WaitFor {
    /// Ready as soon as the engine reports it running.
    #[default]
    Nothing,
    /// Ready once the combined stdout/stderr matches this regex.
    Log(String),
    /// Ready once `http://host:<published port>/<path>` answers with a status below 500.
    Http { port: u16, path: String },
}

impl WaitFor {
    pub fn log(pattern: impl Into<String>) -> Self {
        WaitFor::Log(pattern.into())
    }

    pub fn http(port: u16, path: impl Into<String>) -> Self {
        WaitFor::Http {
            port,
            path: path.into(),
        }
    }

    /// Blocks until `container` satisfies the condition or `timeout` elapses.
    pub(crate) async fn wait(&self, container: &ContainerHandle, timeout: Duration) -> Result<()> {
        match self {
            WaitFor::Nothing => Ok(()),
            WaitFor::Log(pattern) => wait_for_logs(container, pattern, timeout).await,
            WaitFor::Http { port, path } => {
                let host_port = container.exposed_port(*port)?;
                let url = format!(
                    "http://{}:{}/{}",
                    container.host_ip()?,
                    host_port,
                    path.trim_start_matches('/')
                );
                wait_for_http(&url, timeout).await.map(|_| ())
            }
        }
    }
}

/// Polls the container logs until `pattern` (a regex) matches.
///
/// # Errors
///
/// * `Error::Config` - `pattern` is not a valid regex.
/// * `Error::Timeout` - No match within `timeout`.
/// * Errors from `ContainerHandle::logs` are returned as-is.
#[instrument(skip(container), fields(container = %container.name()))]
pub async fn wait_for_logs(
    container: &ContainerHandle,
    pattern: &str,
    timeout: Duration,
) -> Result<()> {
    let regex = Regex::new(pattern)
        .map_err(|e| Error::Config(format!("Invalid log pattern '{}': {}", pattern, e)))?;
    let deadline = Instant::now() + timeout;
    loop {
        let logs = container.logs().await?;
        if regex.is_match(&logs) {
            info!("Container '{}' logged /{}/", container.name(), pattern);
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout {
                what: format!("log line matching /{}/ from '{}'", pattern, container.name()),
                secs: timeout.as_secs(),
            });
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Polls `url` until any response with a status below 500 arrives; returns that status.
///
/// Connection errors and 5xx answers both count as "not ready yet".
#[instrument]
pub async fn wait_for_http(url: &str, timeout: Duration) -> Result<u16> {
    let client = reqwest::Client::builder()
        .timeout(HTTP_REQUEST_TIMEOUT)
        .build()?;
    let deadline = Instant::now() + timeout;
    loop {
        match client.get(url).send().await {
            Ok(response) if response.status().as_u16() < 500 => {
                let status = response.status().as_u16();
                info!("{} answered with {}", url, status);
                return Ok(status);
            }
            Ok(response) => debug!("{} answered with {}", url, response.status()),
            Err(e) => debug!("{} not reachable yet: {}", url, e),
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout {
                what: format!("HTTP response from {}", url),
                secs: timeout.as_secs(),
            });
        }
        sleep(POLL_INTERVAL).await;
    }
}
