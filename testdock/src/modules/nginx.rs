//! # nginx Container (`modules::nginx`)
//!
//! File: testdock/src/modules/nginx.rs
//!
//! Runs nginx and waits until it answers HTTP on `/`. With `with_dockerfile` the
//! image is first built from a local context and tagged with the configured image
//! name, which is how tests serve their own static content. That image outlives
//! the container and is left to the caller to remove.
//!
//! ```rust,no_run
//! use testdock::common::docker::DockerEngine;
//! use testdock::modules::nginx::{NginxContainer, NginxOptions};
//!
//! # async fn run() -> testdock::Result<()> {
//! let engine = DockerEngine::from_env()?.shared();
//! let nginx = NginxContainer::start(engine, NginxOptions::new("nginx:1.27")).await?;
//! println!("{}", nginx.url()?);
//! # Ok(())
//! # }
//! ```
//!
use crate::common::docker::Engine;
use crate::container::{ContainerHandle, ContainerRequest};
use crate::core::error::Result;
use crate::image::{BuildOptions, DockerImage};
use crate::waiting::WaitFor;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::info;

pub const NGINX_IMAGE: &str = "nginx:latest";
pub const NGINX_PORT: u16 = 80;

/// How to run nginx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NginxOptions {
    image: String,
    port: u16,
    dockerfile_dir: Option<PathBuf>,
    startup_timeout: Duration,
}

impl Default for NginxOptions {
    fn default() -> Self {
        Self::new(NGINX_IMAGE)
    }
}

impl NginxOptions {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            port: NGINX_PORT,
            dockerfile_dir: None,
            startup_timeout: Duration::from_secs(60),
        }
    }

    /// Port nginx listens on inside the container.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builds the image from `dir` before starting.
    ///
    /// The built image stays on the engine after `stop`; the caller removes it.
    pub fn with_dockerfile(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dockerfile_dir = Some(dir.into());
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    fn to_request(&self) -> ContainerRequest {
        ContainerRequest::new(&self.image)
            .with_exposed_port(self.port)
            .with_wait_for(WaitFor::http(self.port, "/"))
            .with_startup_timeout(self.startup_timeout)
    }
}

/// A running nginx.
#[derive(Debug)]
pub struct NginxContainer {
    container: ContainerHandle,
    port: u16,
}

impl NginxContainer {
    pub async fn start(engine: Arc<dyn Engine>, options: NginxOptions) -> Result<Self> {
        if let Some(dir) = &options.dockerfile_dir {
            info!("Building '{}' from {}", options.image, dir.display());
            DockerImage::new(engine.clone())
                .build(BuildOptions::new(dir, &options.image))
                .await?;
        }
        let container = ContainerHandle::start(engine, options.to_request()).await?;
        Ok(Self {
            container,
            port: options.port,
        })
    }

    /// Internal port nginx serves on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `http://host:port` reachable from the test process.
    pub fn url(&self) -> Result<String> {
        Ok(format!(
            "http://{}:{}",
            self.container.host_ip()?,
            self.container.exposed_port(self.port)?
        ))
    }

    pub fn container(&self) -> &ContainerHandle {
        &self.container
    }

    pub async fn stop(self) -> Result<()> {
        self.container.stop().await
    }
}
