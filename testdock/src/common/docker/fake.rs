//! In-memory `Engine` used by the unit tests.
//!
//! It models just enough engine behavior for the handles: tagged images with
//! reference resolution, a registry of pullable images, containers with an
//! allocated host port per published port, and the status codes the real
//! daemon answers with (304, 404, 409).

use crate::common::docker::engine::{BuildStream, Engine, ExecOutput, PullStream};
use crate::core::error::{Error, Result};
use async_trait::async_trait;
use bollard::{
    auth::DockerCredentials,
    container::{Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions},
    errors::Error as DockerError,
    image::{
        BuildImageOptions, CommitContainerOptions, CreateImageOptions, ListImagesOptions,
        RemoveImageOptions,
    },
    models::{
        BuildInfo, ContainerCreateResponse, ContainerInspectResponse, ContainerState,
        ContainerStateStatusEnum, CreateImageInfo, ErrorDetail, ImageDeleteResponseItem, ImageId,
        ImageInspect, ImageSummary, NetworkSettings, PortBinding, Runtime, SystemInfo,
    },
};
use futures_util::{stream, StreamExt};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

#[derive(Debug, Clone)]
pub(crate) struct FakeImage {
    pub id: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image_id: String,
    pub running: bool,
    pub config: ContainerConfig<String>,
    pub ports: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub images: Vec<FakeImage>,
    pub containers: Vec<FakeContainer>,
    pub registry: HashSet<String>,
    pub unreachable: bool,
    pub build_failure: Option<String>,
    pub fail_start: bool,
    pub fail_reconnect: bool,
    pub logs: String,
    pub exec_result: ExecOutput,
    pub exec_calls: Vec<Vec<String>>,
    pub runtimes: Vec<String>,
    pub committed_labels: Vec<HashMap<String, String>>,
    next_id: u64,
    next_port: u16,
}

impl FakeState {
    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("sha256:{:064x}", self.next_id)
    }

    fn image_index(&self, reference: &str) -> Option<usize> {
        let normalized = normalize(reference);
        let bare_id = reference.trim_start_matches("sha256:");
        self.images.iter().position(|img| {
            img.tags.iter().any(|t| *t == normalized)
                || img.id == reference
                || (!bare_id.is_empty()
                    && img.id.trim_start_matches("sha256:").starts_with(bare_id))
        })
    }

    /// Adds an image with `tag`, moving the tag away from any older image.
    fn add_image(&mut self, tag: &str) -> String {
        let tag = normalize(tag);
        let tag = tag.as_str();
        for img in &mut self.images {
            img.tags.retain(|t| t != tag);
        }
        let id = self.fresh_id();
        self.images.push(FakeImage {
            id: id.clone(),
            tags: vec![tag.to_string()],
        });
        id
    }

    fn container_index(&self, id_or_name: &str) -> Option<usize> {
        self.containers
            .iter()
            .position(|c| c.id == id_or_name || c.name == id_or_name)
    }
}

/// `name` becomes `name:latest`; tagged, digest and registry-port references stay as they are.
fn normalize(reference: &str) -> String {
    let last = reference.rsplit('/').next().unwrap_or(reference);
    if reference.contains('@') || last.contains(':') {
        reference.to_string()
    } else {
        format!("{}:latest", reference)
    }
}

fn server_error(status_code: u16, message: &str) -> DockerError {
    DockerError::DockerResponseServerError {
        status_code,
        message: message.to_string(),
    }
}

fn refused() -> DockerError {
    DockerError::IOError {
        err: std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused (fake engine)",
        ),
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn Engine> {
        Arc::new(self.clone())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_local_image(self, tag: &str) -> Self {
        self.state().add_image(tag);
        self
    }

    pub fn with_registry_image(self, reference: &str) -> Self {
        self.state().registry.insert(reference.to_string());
        self
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn image_count(&self) -> usize {
        self.state().images.len()
    }

    pub fn container_count(&self) -> usize {
        self.state().containers.len()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    fn host_ip(&self) -> String {
        "127.0.0.1".to_string()
    }

    fn reconnect(&self) -> Result<Arc<dyn Engine>> {
        if self.state().fail_reconnect {
            return Err(Error::Connection { source: refused() });
        }
        Ok(self.shared())
    }

    async fn ping(&self) -> std::result::Result<(), DockerError> {
        if self.state().unreachable {
            return Err(refused());
        }
        Ok(())
    }

    async fn info(&self) -> std::result::Result<SystemInfo, DockerError> {
        let state = self.state();
        if state.unreachable {
            return Err(refused());
        }
        let runtimes = state
            .runtimes
            .iter()
            .map(|name| (name.clone(), Runtime::default()))
            .collect();
        Ok(SystemInfo {
            runtimes: Some(runtimes),
            ..Default::default()
        })
    }

    fn build_image(&self, options: BuildImageOptions<String>, context: Vec<u8>) -> BuildStream<'_> {
        let mut state = self.state();
        if state.unreachable {
            return stream::iter(vec![Err(refused())]).boxed();
        }
        let mut events = vec![Ok(BuildInfo {
            stream: Some(format!(
                "Step 1/1 : FROM scratch ({} byte context)\n",
                context.len()
            )),
            ..Default::default()
        })];
        if let Some(message) = state.build_failure.take() {
            events.push(Ok(BuildInfo {
                error: Some(message.clone()),
                error_detail: Some(ErrorDetail {
                    message: Some(message),
                    ..Default::default()
                }),
                ..Default::default()
            }));
            return stream::iter(events).boxed();
        }
        let id = state.add_image(&options.t);
        events.push(Ok(BuildInfo {
            aux: Some(ImageId { id: Some(id) }),
            ..Default::default()
        }));
        events.push(Ok(BuildInfo {
            stream: Some(format!("Successfully tagged {}\n", options.t)),
            ..Default::default()
        }));
        stream::iter(events).boxed()
    }

    fn create_image(
        &self,
        options: CreateImageOptions<String>,
        _credentials: Option<DockerCredentials>,
    ) -> PullStream<'_> {
        let mut state = self.state();
        if state.unreachable {
            return stream::iter(vec![Err(refused())]).boxed();
        }
        let reference = if options.tag.is_empty() {
            options.from_image.clone()
        } else {
            format!("{}:{}", options.from_image, options.tag)
        };
        if !state.registry.contains(&reference) {
            return stream::iter(vec![Err(server_error(
                404,
                &format!("manifest for {} not found: manifest unknown", reference),
            ))])
            .boxed();
        }
        state.add_image(&reference);
        stream::iter(vec![
            Ok(CreateImageInfo {
                status: Some(format!("Pulling from {}", options.from_image)),
                ..Default::default()
            }),
            Ok(CreateImageInfo {
                status: Some(format!("Status: Downloaded newer image for {}", reference)),
                ..Default::default()
            }),
        ])
        .boxed()
    }

    async fn inspect_image(&self, name: &str) -> std::result::Result<ImageInspect, DockerError> {
        let state = self.state();
        if state.unreachable {
            return Err(refused());
        }
        let idx = state
            .image_index(name)
            .ok_or_else(|| server_error(404, &format!("No such image: {}", name)))?;
        let image = &state.images[idx];
        Ok(ImageInspect {
            id: Some(image.id.clone()),
            repo_tags: Some(image.tags.clone()),
            ..Default::default()
        })
    }

    async fn list_images(
        &self,
        options: ListImagesOptions<String>,
    ) -> std::result::Result<Vec<ImageSummary>, DockerError> {
        let state = self.state();
        if state.unreachable {
            return Err(refused());
        }
        let references = options.filters.get("reference").cloned().unwrap_or_default();
        Ok(state
            .images
            .iter()
            .filter(|img| {
                references.is_empty()
                    || references.iter().any(|r| {
                        img.tags
                            .iter()
                            .any(|t| t == r || t.split(':').next() == Some(r.as_str()))
                    })
            })
            .map(|img| ImageSummary {
                id: img.id.clone(),
                repo_tags: img.tags.clone(),
                ..Default::default()
            })
            .collect())
    }

    async fn remove_image(
        &self,
        name: &str,
        options: RemoveImageOptions,
    ) -> std::result::Result<Vec<ImageDeleteResponseItem>, DockerError> {
        let mut state = self.state();
        if state.unreachable {
            return Err(refused());
        }
        let idx = state
            .image_index(name)
            .ok_or_else(|| server_error(404, &format!("No such image: {}", name)))?;
        let id = state.images[idx].id.clone();
        if !options.force && state.containers.iter().any(|c| c.image_id == id) {
            return Err(server_error(
                409,
                &format!(
                    "conflict: unable to remove repository reference \"{}\" - container is using its referenced image",
                    name
                ),
            ));
        }
        let removed = state.images.remove(idx);
        let mut items: Vec<ImageDeleteResponseItem> = removed
            .tags
            .iter()
            .map(|t| ImageDeleteResponseItem {
                untagged: Some(t.clone()),
                deleted: None,
            })
            .collect();
        items.push(ImageDeleteResponseItem {
            untagged: None,
            deleted: Some(removed.id),
        });
        Ok(items)
    }

    async fn create_container(
        &self,
        options: Option<CreateContainerOptions<String>>,
        config: ContainerConfig<String>,
    ) -> std::result::Result<ContainerCreateResponse, DockerError> {
        let mut state = self.state();
        if state.unreachable {
            return Err(refused());
        }
        let image = config.image.clone().unwrap_or_default();
        let idx = state
            .image_index(&image)
            .ok_or_else(|| server_error(404, &format!("No such image: {}", image)))?;
        let image_id = state.images[idx].id.clone();
        let id = state.fresh_id().trim_start_matches("sha256:").to_string();
        let name = options
            .map(|o| o.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("fake_{}", &id[id.len() - 6..]));
        if state.container_index(&name).is_some() {
            return Err(server_error(
                409,
                &format!("Conflict. The container name \"/{}\" is already in use", name),
            ));
        }
        state.containers.push(FakeContainer {
            id: id.clone(),
            name,
            image_id,
            running: false,
            config,
            ports: HashMap::new(),
        });
        Ok(ContainerCreateResponse {
            id,
            ..Default::default()
        })
    }

    async fn start_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        let mut state = self.state();
        if state.unreachable {
            return Err(refused());
        }
        if state.fail_start {
            return Err(server_error(500, "driver failed programming external connectivity"));
        }
        let idx = state
            .container_index(id)
            .ok_or_else(|| server_error(404, &format!("No such container: {}", id)))?;
        if state.containers[idx].running {
            return Err(server_error(304, ""));
        }
        let bindings = state.containers[idx]
            .config
            .host_config
            .as_ref()
            .and_then(|h| h.port_bindings.clone())
            .unwrap_or_default();
        let mut ports = HashMap::new();
        for (key, binding) in bindings {
            let fixed = binding
                .and_then(|b| b.into_iter().next())
                .and_then(|b| b.host_port)
                .filter(|p| !p.is_empty());
            let host_port = match fixed {
                Some(p) => p,
                None => {
                    state.next_port += 1;
                    (32767 + state.next_port).to_string()
                }
            };
            ports.insert(key, host_port);
        }
        let container = &mut state.containers[idx];
        container.ports = ports;
        container.running = true;
        Ok(())
    }

    async fn inspect_container(
        &self,
        id: &str,
    ) -> std::result::Result<ContainerInspectResponse, DockerError> {
        let state = self.state();
        if state.unreachable {
            return Err(refused());
        }
        let idx = state
            .container_index(id)
            .ok_or_else(|| server_error(404, &format!("No such container: {}", id)))?;
        let c = &state.containers[idx];
        let ports = c
            .ports
            .iter()
            .map(|(key, host_port)| {
                (
                    key.clone(),
                    Some(vec![
                        PortBinding {
                            host_ip: Some("::".to_string()),
                            host_port: Some(host_port.clone()),
                        },
                        PortBinding {
                            host_ip: Some("0.0.0.0".to_string()),
                            host_port: Some(host_port.clone()),
                        },
                    ]),
                )
            })
            .collect();
        Ok(ContainerInspectResponse {
            id: Some(c.id.clone()),
            name: Some(format!("/{}", c.name)),
            state: Some(ContainerState {
                status: Some(if c.running {
                    ContainerStateStatusEnum::RUNNING
                } else {
                    ContainerStateStatusEnum::EXITED
                }),
                running: Some(c.running),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn stop_container(
        &self,
        id: &str,
        _timeout_secs: Option<i64>,
    ) -> std::result::Result<(), DockerError> {
        let mut state = self.state();
        if state.unreachable {
            return Err(refused());
        }
        let idx = state
            .container_index(id)
            .ok_or_else(|| server_error(404, &format!("No such container: {}", id)))?;
        if !state.containers[idx].running {
            return Err(server_error(304, ""));
        }
        state.containers[idx].running = false;
        Ok(())
    }

    async fn remove_container(
        &self,
        id: &str,
        options: RemoveContainerOptions,
    ) -> std::result::Result<(), DockerError> {
        let mut state = self.state();
        if state.unreachable {
            return Err(refused());
        }
        let idx = state
            .container_index(id)
            .ok_or_else(|| server_error(404, &format!("No such container: {}", id)))?;
        if state.containers[idx].running && !options.force {
            return Err(server_error(409, "You cannot remove a running container"));
        }
        state.containers.remove(idx);
        Ok(())
    }

    async fn logs(&self, id: &str) -> std::result::Result<String, DockerError> {
        let state = self.state();
        if state.unreachable {
            return Err(refused());
        }
        state
            .container_index(id)
            .ok_or_else(|| server_error(404, &format!("No such container: {}", id)))?;
        Ok(state.logs.clone())
    }

    async fn exec(
        &self,
        id: &str,
        cmd: Vec<String>,
    ) -> std::result::Result<ExecOutput, DockerError> {
        let mut state = self.state();
        if state.unreachable {
            return Err(refused());
        }
        let idx = state
            .container_index(id)
            .ok_or_else(|| server_error(404, &format!("No such container: {}", id)))?;
        if !state.containers[idx].running {
            return Err(server_error(409, &format!("Container {} is not running", id)));
        }
        state.exec_calls.push(cmd);
        Ok(state.exec_result.clone())
    }

    async fn commit_container(
        &self,
        options: CommitContainerOptions<String>,
        config: ContainerConfig<String>,
    ) -> std::result::Result<(), DockerError> {
        let mut state = self.state();
        if state.unreachable {
            return Err(refused());
        }
        state
            .container_index(&options.container)
            .ok_or_else(|| server_error(404, &format!("No such container: {}", options.container)))?;
        let tag = if options.tag.is_empty() {
            "latest"
        } else {
            options.tag.as_str()
        };
        state.add_image(&format!("{}:{}", options.repo, tag));
        state
            .committed_labels
            .push(config.labels.unwrap_or_default());
        Ok(())
    }
}
