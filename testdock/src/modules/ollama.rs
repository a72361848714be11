//! # Ollama Container (`modules::ollama`)
//!
//! File: testdock/src/modules/ollama.rs
//!
//! ## Overview
//!
//! Runs an Ollama model server for tests that talk to a local LLM. When the engine
//! reports an `nvidia` runtime all GPUs are passed through. An optional host
//! directory is mounted at `/root/.ollama` so pulled models survive between runs,
//! and `commit_to_image` can snapshot a container with its models into an image.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use testdock::common::docker::DockerEngine;
//! use testdock::modules::ollama::{OllamaContainer, OllamaOptions};
//!
//! # async fn run() -> testdock::Result<()> {
//! let engine = DockerEngine::from_env()?.shared();
//! let ollama = OllamaContainer::start(engine, OllamaOptions::default()).await?;
//! ollama.pull_model("all-minilm").await?;
//! for model in ollama.list_models().await? {
//!     println!("{} ({} bytes)", model.name, model.size);
//! }
//! # Ok(())
//! # }
//! ```
//!
use crate::common::docker::Engine;
use crate::container::{ContainerHandle, ContainerRequest, VolumeMount, SESSION_LABEL};
use crate::core::error::{classify, Error, Result};
use crate::waiting::WaitFor;
use bollard::{
    container::Config as ContainerConfig,
    image::{CommitContainerOptions, ListImagesOptions},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, info, instrument};

pub const OLLAMA_IMAGE: &str = "ollama/ollama:0.1.44";
pub const OLLAMA_PORT: u16 = 11434;
const MODELS_DIR: &str = "/root/.ollama";

/// A model known to the server, as listed by `/api/tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    pub model: String,
    pub modified_at: String,
    pub size: u64,
    pub digest: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

/// How to run Ollama.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaOptions {
    image: String,
    ollama_dir: Option<PathBuf>,
    startup_timeout: Duration,
}

impl Default for OllamaOptions {
    fn default() -> Self {
        Self::new(OLLAMA_IMAGE)
    }
}

impl OllamaOptions {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ollama_dir: None,
            startup_timeout: Duration::from_secs(30),
        }
    }

    /// Host directory mounted read-write as the server's model store.
    pub fn with_ollama_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ollama_dir = Some(dir.into());
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    fn to_request(&self, gpus: bool) -> ContainerRequest {
        let mut request = ContainerRequest::new(&self.image)
            .with_exposed_port(OLLAMA_PORT)
            .with_gpus(gpus)
            .with_wait_for(WaitFor::log("Listening on "))
            .with_startup_timeout(self.startup_timeout);
        if let Some(dir) = &self.ollama_dir {
            request = request.with_volume(VolumeMount::new(
                dir.to_string_lossy().to_string(),
                MODELS_DIR,
            ));
        }
        request
    }
}

/// A running Ollama server.
#[derive(Debug)]
pub struct OllamaContainer {
    container: ContainerHandle,
}

impl OllamaContainer {
    #[instrument(skip(engine))]
    pub async fn start(engine: Arc<dyn Engine>, options: OllamaOptions) -> Result<Self> {
        let info = engine.info().await.map_err(classify)?;
        let gpus = info
            .runtimes
            .as_ref()
            .is_some_and(|runtimes| runtimes.contains_key("nvidia"));
        if gpus {
            info!("nvidia runtime detected, requesting all GPUs");
        }
        let container = ContainerHandle::start(engine, options.to_request(gpus)).await?;
        Ok(Self { container })
    }

    /// Base URL of the HTTP API, `http://host:port`.
    pub fn endpoint(&self) -> Result<String> {
        Ok(format!(
            "http://{}:{}",
            self.container.host_ip()?,
            self.container.exposed_port(OLLAMA_PORT)?
        ))
    }

    pub fn id(&self) -> &str {
        self.container.id()
    }

    pub fn container(&self) -> &ContainerHandle {
        &self.container
    }

    /// Runs `ollama pull <model>` inside the container.
    ///
    /// # Errors
    ///
    /// * `Error::Exec` - The pull exited non-zero (unknown model, no network, ...).
    pub async fn pull_model(&self, model: &str) -> Result<()> {
        let cmd = vec!["ollama".to_string(), "pull".to_string(), model.to_string()];
        let output = self.container.exec(cmd.clone()).await?;
        if output.exit_code != 0 {
            let message = if output.stderr.trim().is_empty() {
                output.stdout
            } else {
                output.stderr
            };
            return Err(Error::Exec {
                cmd,
                exit_code: output.exit_code,
                output: message.trim().to_string(),
            });
        }
        info!("Pulled model '{}'", model);
        Ok(())
    }

    /// Models currently available on the server.
    pub async fn list_models(&self) -> Result<Vec<OllamaModel>> {
        let url = format!("{}/api/tags", self.endpoint()?);
        let body = reqwest::get(&url).await?.error_for_status()?.text().await?;
        parse_models(&body)
    }

    /// Commits the container, with its pulled models, as `image_name`.
    ///
    /// Nothing happens when an image of that name already exists. The committed
    /// image carries an empty session label so it is not treated as a leftover.
    #[instrument(skip(self), fields(container = %self.container.name()))]
    pub async fn commit_to_image(&self, image_name: &str) -> Result<()> {
        let engine = self.container.engine();
        let filters = HashMap::from([("reference".to_string(), vec![image_name.to_string()])]);
        let existing = engine
            .list_images(ListImagesOptions {
                filters,
                ..Default::default()
            })
            .await
            .map_err(classify)?;
        if !existing.is_empty() {
            debug!("Image '{}' already exists, not committing.", image_name);
            return Ok(());
        }

        let (repo, tag) = split_reference(image_name);
        let options = CommitContainerOptions {
            container: self.container.id().to_string(),
            repo,
            tag,
            ..Default::default()
        };
        let config = ContainerConfig {
            labels: Some(HashMap::from([(SESSION_LABEL.to_string(), String::new())])),
            ..Default::default()
        };
        engine
            .commit_container(options, config)
            .await
            .map_err(classify)?;
        info!("Committed container to '{}'", image_name);
        Ok(())
    }

    pub async fn stop(self) -> Result<()> {
        self.container.stop().await
    }
}

fn parse_models(body: &str) -> Result<Vec<OllamaModel>> {
    let response: TagsResponse = serde_json::from_str(body)?;
    Ok(response.models)
}

/// `repo[:tag]` → (repo, tag); a colon inside a registry host:port is not a tag.
fn split_reference(reference: &str) -> (String, String) {
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), tag.to_string()),
        _ => (reference.to_string(), "latest".to_string()),
    }
}
