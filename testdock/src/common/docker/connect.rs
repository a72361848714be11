//! # testdock Docker Connection
//!
//! File: testdock/src/common/docker/connect.rs
//!
//! ## Overview
//!
//! This module owns the production `Engine` implementation, `DockerEngine`, a thin
//! wrapper around `bollard::Docker`. It is responsible for turning an
//! `EngineConfig` into a live client and for forwarding each `Engine` call to the
//! matching `bollard` method.
//!
//! ## Architecture
//!
//! - `connect_docker` picks the `bollard` constructor from the configured endpoint:
//!   local defaults when no host is configured, `connect_with_unix` for `unix://`,
//!   `connect_with_http` for `tcp://` and `http://`.
//! - `DockerEngine` keeps the config it was built from so it can `reconnect`.
//! - Output-producing calls (`logs`, `exec`) are collected into strings here, so
//!   callers only deal with finished values.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use testdock::common::docker::DockerEngine;
//! use testdock::image::DockerImage;
//!
//! # async fn run() -> testdock::Result<()> {
//! let engine = DockerEngine::from_env()?.shared();
//! let image = DockerImage::new(engine.clone());
//! println!("alpine present: {}", image.exists("alpine:latest").await?);
//! # Ok(())
//! # }
//! ```
//!
use crate::core::{
    config::{self, EngineConfig},
    error::{Error, Result},
};
use async_trait::async_trait;
use bollard::{
    auth::DockerCredentials,
    container::{
        Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions, LogOutput,
        LogsOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    },
    errors::Error as DockerError,
    exec::{CreateExecOptions, StartExecResults},
    image::{
        BuildImageOptions, CommitContainerOptions, CreateImageOptions, ListImagesOptions,
        RemoveImageOptions,
    },
    models::{
        ContainerCreateResponse, ContainerInspectResponse, ImageDeleteResponseItem, ImageInspect,
        ImageSummary, SystemInfo,
    },
    ClientVersion, Docker, API_DEFAULT_VERSION,
};
use futures_util::StreamExt;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, instrument};

use super::engine::{BuildStream, Engine, ExecOutput, PullStream};

/// Establishes a connection to the Docker daemon described by `config`.
///
/// Connecting is lazy in `bollard`: this validates the endpoint and builds the
/// client, the first request is what actually touches the socket.
///
/// # Errors
///
/// * `Error::Config` - The endpoint scheme or API version is not usable.
/// * `Error::Connection` - `bollard` rejected the endpoint (e.g. missing socket).
#[instrument(skip(config), fields(host = ?config.host))]
pub fn connect_docker(config: &EngineConfig) -> Result<Docker> {
    let version = match config.api_version.as_deref() {
        Some(v) => {
            let (major_version, minor_version) = config::parse_api_version(v).ok_or_else(|| {
                Error::Config(format!("Invalid api_version '{}'. Expected MAJOR.MINOR.", v))
            })?;
            ClientVersion {
                major_version,
                minor_version,
            }
        }
        None => ClientVersion {
            major_version: API_DEFAULT_VERSION.major_version,
            minor_version: API_DEFAULT_VERSION.minor_version,
        },
    };
    let timeout = config.timeout_secs;

    let connected = match config.host.as_deref() {
        None => Docker::connect_with_local_defaults()
            .map(|docker| docker.with_timeout(Duration::from_secs(timeout))),
        #[cfg(unix)]
        Some(host) if host.starts_with("unix://") => {
            Docker::connect_with_unix(host, timeout, &version)
        }
        Some(host) if host.starts_with("tcp://") || host.starts_with("http://") => {
            Docker::connect_with_http(host, timeout, &version)
        }
        Some(host) => {
            return Err(Error::Config(format!(
                "Unsupported engine host '{}' on this platform.",
                host
            )))
        }
    };

    connected.map_err(|e| {
        error!("Failed to connect to Docker daemon: {:?}", e);
        Error::Connection { source: e }
    })
}

/// Host part of a `tcp://host:port` / `http://host:port` endpoint.
fn endpoint_host(endpoint: &str) -> Option<String> {
    let rest = endpoint
        .strip_prefix("tcp://")
        .or_else(|| endpoint.strip_prefix("http://"))?;
    let host = rest.split(['/', ':']).next().unwrap_or_default();
    (!host.is_empty()).then(|| host.to_string())
}

/// The `bollard`-backed engine.
#[derive(Clone, Debug)]
pub struct DockerEngine {
    docker: Docker,
    config: EngineConfig,
}

impl DockerEngine {
    /// Connects using an explicit configuration.
    pub fn connect(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            docker: connect_docker(config)?,
            config: config.clone(),
        })
    }

    /// Connects using `config::load_config()` (files plus `DOCKER_HOST`).
    pub fn from_env() -> Result<Self> {
        let cfg = config::load_config()?;
        Self::connect(&cfg.engine)
    }

    /// Wraps the engine for sharing between handles.
    pub fn shared(self) -> Arc<dyn Engine> {
        Arc::new(self)
    }

    /// The underlying client, for calls this crate does not wrap.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl Engine for DockerEngine {
    fn host_ip(&self) -> String {
        if let Some(host) = &self.config.host_override {
            return host.clone();
        }
        self.config
            .host
            .as_deref()
            .and_then(endpoint_host)
            .unwrap_or_else(|| "localhost".to_string())
    }

    fn reconnect(&self) -> Result<Arc<dyn Engine>> {
        Ok(Arc::new(DockerEngine::connect(&self.config)?))
    }

    async fn ping(&self) -> std::result::Result<(), DockerError> {
        self.docker.ping().await.map(|_| ())
    }

    async fn info(&self) -> std::result::Result<SystemInfo, DockerError> {
        self.docker.info().await
    }

    fn build_image(&self, options: BuildImageOptions<String>, context: Vec<u8>) -> BuildStream<'_> {
        self.docker
            .build_image(options, None, Some(context.into()))
            .boxed()
    }

    fn create_image(
        &self,
        options: CreateImageOptions<String>,
        credentials: Option<DockerCredentials>,
    ) -> PullStream<'_> {
        self.docker
            .create_image(Some(options), None, credentials)
            .boxed()
    }

    async fn inspect_image(&self, name: &str) -> std::result::Result<ImageInspect, DockerError> {
        self.docker.inspect_image(name).await
    }

    async fn list_images(
        &self,
        options: ListImagesOptions<String>,
    ) -> std::result::Result<Vec<ImageSummary>, DockerError> {
        self.docker.list_images(Some(options)).await
    }

    async fn remove_image(
        &self,
        name: &str,
        options: RemoveImageOptions,
    ) -> std::result::Result<Vec<ImageDeleteResponseItem>, DockerError> {
        self.docker.remove_image(name, Some(options), None).await
    }

    async fn create_container(
        &self,
        options: Option<CreateContainerOptions<String>>,
        config: ContainerConfig<String>,
    ) -> std::result::Result<ContainerCreateResponse, DockerError> {
        self.docker.create_container(options, config).await
    }

    async fn start_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
    }

    async fn inspect_container(
        &self,
        id: &str,
    ) -> std::result::Result<ContainerInspectResponse, DockerError> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
    }

    async fn stop_container(
        &self,
        id: &str,
        timeout_secs: Option<i64>,
    ) -> std::result::Result<(), DockerError> {
        let options = timeout_secs.map(|t| StopContainerOptions { t });
        self.docker.stop_container(id, options).await
    }

    async fn remove_container(
        &self,
        id: &str,
        options: RemoveContainerOptions,
    ) -> std::result::Result<(), DockerError> {
        self.docker.remove_container(id, Some(options)).await
    }

    async fn logs(&self, id: &str) -> std::result::Result<String, DockerError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.logs(id, Some(options));
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            collected.push_str(&chunk?.to_string());
        }
        Ok(collected)
    }

    async fn exec(
        &self,
        id: &str,
        cmd: Vec<String>,
    ) -> std::result::Result<ExecOutput, DockerError> {
        let created = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    cmd: Some(cmd),
                    ..Default::default()
                },
            )
            .await?;

        let mut result = ExecOutput::default();
        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&created.id, None).await?
        {
            while let Some(chunk) = output.next().await {
                match chunk? {
                    LogOutput::StdErr { message } => {
                        result.stderr.push_str(&String::from_utf8_lossy(&message))
                    }
                    other => result.stdout.push_str(&other.to_string()),
                }
            }
        }

        let inspected = self.docker.inspect_exec(&created.id).await?;
        result.exit_code = inspected.exit_code.unwrap_or(-1);
        debug!("Exec {} finished with code {}", created.id, result.exit_code);
        Ok(result)
    }

    async fn commit_container(
        &self,
        options: CommitContainerOptions<String>,
        config: ContainerConfig<String>,
    ) -> std::result::Result<(), DockerError> {
        self.docker
            .commit_container(options, config)
            .await
            .map(|_| ())
    }
}
