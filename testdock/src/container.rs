//! # testdock Container Handle (`container`)
//!
//! File: testdock/src/container.rs
//!
//! ## Overview
//!
//! `ContainerHandle` runs one short-lived container for the duration of a test and
//! guarantees it is stopped and removed afterwards. While it runs, the handle
//! answers the questions a test asks: where is it reachable (`host_ip`), which host
//! port maps to an internal port (`exposed_port`), what did it print (`logs`).
//!
//! ## Architecture
//!
//! - `ContainerRequest` is a builder describing the container (image, ports, env,
//!   mounts, command, labels, GPU request, readiness condition). It is converted
//!   into `bollard`'s create options in `to_bollard`.
//! - `ContainerHandle::start` creates, starts and inspects the container, then
//!   applies the request's `WaitFor` condition. A container that was created but
//!   failed to start or become ready is removed before the error is returned.
//! - The handle is an RAII guard. `stop().await` tears down explicitly; otherwise
//!   `Drop` stops and removes the container, blocking the dropping thread. On a
//!   multi-threaded runtime this happens via `block_in_place`; anywhere else on a
//!   dedicated thread with its own runtime and a fresh engine connection.
//! - Every container carries the label `org.testdock.session-id` with a per-process
//!   id, so leftovers of a crashed run can be found with a label filter.
//!
//! ## Lifecycle
//!
//! `Created → Running → Stopping → Removed`. Lookups are only valid while
//! `Running`. Teardown treats "already stopped" (304) and "already removed" (404)
//! as success.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use testdock::common::docker::DockerEngine;
//! use testdock::container::{ContainerHandle, ContainerRequest};
//! use testdock::waiting::WaitFor;
//!
//! # async fn run() -> testdock::Result<()> {
//! let engine = DockerEngine::from_env()?.shared();
//! let request = ContainerRequest::new("nginx:latest")
//!     .with_exposed_port(80)
//!     .with_wait_for(WaitFor::http(80, "/"));
//! let nginx = ContainerHandle::start(engine, request).await?;
//! println!("http://{}:{}", nginx.host_ip()?, nginx.exposed_port(80)?);
//! nginx.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
use crate::common::docker::{Engine, ExecOutput};
use crate::core::config::ContainerDefaults;
use crate::core::error::{classify, status_code, Error, Result};
use crate::waiting::{self, WaitFor};
use bollard::{
    container::{Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions},
    models::{DeviceRequest, HostConfig, PortBinding, PortMap},
};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, error, info, instrument, warn};

/// Label carrying the id of the process that started the container.
pub const SESSION_LABEL: &str = "org.testdock.session-id";

/// Id shared by every container this process starts.
pub fn session_id() -> &'static str {
    static SESSION_ID: OnceLock<String> = OnceLock::new();
    SESSION_ID.get_or_init(|| uuid::Uuid::new_v4().to_string())
}

/// Host side of a published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMapping {
    /// Engine picks a free host port.
    Auto,
    Fixed(u16),
}

/// Bind mount of a host path into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

impl VolumeMount {
    pub fn new(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// `host:container[:ro]` with `~` in the host path expanded.
    pub fn to_bind(&self) -> String {
        let host = shellexpand::tilde(&self.host_path);
        let mut bind = format!("{}:{}", host, self.container_path);
        if self.read_only {
            bind.push_str(":ro");
        }
        bind
    }
}

/// Describes the container `ContainerHandle::start` should run.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRequest {
    image: String,
    ports: BTreeMap<u16, PortMapping>,
    env: BTreeMap<String, String>,
    volumes: Vec<VolumeMount>,
    cmd: Option<Vec<String>>,
    name: Option<String>,
    labels: HashMap<String, String>,
    gpus: bool,
    wait_for: WaitFor,
    startup_timeout: Duration,
    stop_timeout_secs: u32,
}

impl ContainerRequest {
    pub fn new(image: impl Into<String>) -> Self {
        let defaults = ContainerDefaults::default();
        Self {
            image: image.into(),
            ports: BTreeMap::new(),
            env: BTreeMap::new(),
            volumes: Vec::new(),
            cmd: None,
            name: None,
            labels: HashMap::new(),
            gpus: false,
            wait_for: WaitFor::Nothing,
            startup_timeout: Duration::from_secs(defaults.startup_timeout_secs),
            stop_timeout_secs: defaults.stop_timeout_secs,
        }
    }

    /// Publishes `port` (tcp) on an engine-assigned host port.
    pub fn with_exposed_port(mut self, port: u16) -> Self {
        self.ports.insert(port, PortMapping::Auto);
        self
    }

    /// Publishes `port` (tcp) on a fixed host port.
    pub fn with_mapped_port(mut self, port: u16, host_port: u16) -> Self {
        self.ports.insert(port, PortMapping::Fixed(host_port));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_volume(mut self, mount: VolumeMount) -> Self {
        self.volumes.push(mount);
        self
    }

    /// Overrides the image's default command.
    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Requests every GPU the engine's nvidia runtime can provide.
    pub fn with_gpus(mut self, gpus: bool) -> Self {
        self.gpus = gpus;
        self
    }

    pub fn with_wait_for(mut self, wait_for: WaitFor) -> Self {
        self.wait_for = wait_for;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Seconds the engine waits after SIGTERM before killing the container on teardown.
    pub fn with_stop_timeout(mut self, secs: u32) -> Self {
        self.stop_timeout_secs = secs;
        self
    }

    /// Applies timeouts from loaded configuration.
    pub fn with_defaults(mut self, defaults: &ContainerDefaults) -> Self {
        self.startup_timeout = Duration::from_secs(defaults.startup_timeout_secs);
        self.stop_timeout_secs = defaults.stop_timeout_secs;
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub(crate) fn to_bollard(
        &self,
    ) -> (Option<CreateContainerOptions<String>>, ContainerConfig<String>) {
        let mut exposed_ports = HashMap::new();
        let mut port_bindings: PortMap = HashMap::new();
        for (port, mapping) in &self.ports {
            let key = format!("{}/tcp", port);
            let host_port = match mapping {
                PortMapping::Auto => String::new(),
                PortMapping::Fixed(p) => p.to_string(),
            };
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(host_port),
                }]),
            );
        }

        let mut labels = HashMap::from([(SESSION_LABEL.to_string(), session_id().to_string())]);
        labels.extend(self.labels.clone());

        let device_requests = self.gpus.then(|| {
            vec![DeviceRequest {
                count: Some(-1), // -1: all GPUs
                capabilities: Some(vec![vec!["gpu".to_string()]]),
                ..Default::default()
            }]
        });
        let binds: Vec<String> = self.volumes.iter().map(VolumeMount::to_bind).collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: (!binds.is_empty()).then_some(binds),
            device_requests,
            ..Default::default()
        };
        let config = ContainerConfig {
            image: Some(self.image.clone()),
            exposed_ports: Some(exposed_ports),
            env: Some(self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()),
            cmd: self.cmd.clone(),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };
        let options = self.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });
        (options, config)
    }
}

/// Lifecycle position of a `ContainerHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Stopping,
    Removed,
}

/// A running container that is stopped and removed when the handle goes away.
pub struct ContainerHandle {
    engine: Arc<dyn Engine>,
    id: String,
    name: String,
    image: String,
    host_ip: String,
    ports: HashMap<u16, u16>,
    state: ContainerState,
    stop_timeout_secs: u32,
}

impl fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("image", &self.image)
            .field("ports", &self.ports)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ContainerHandle {
    /// Creates and starts a container, then waits for the request's readiness condition.
    ///
    /// # Errors
    ///
    /// * `Error::ImageNotFound` - The image is not present on the engine.
    /// * `Error::Timeout` - The readiness condition was not met in time.
    /// * `Error::Connection` / `Error::DockerApi` - Any engine failure.
    ///
    /// In every error case after a successful create, the container has been removed.
    #[instrument(skip(engine, request), fields(image = %request.image))]
    pub async fn start(engine: Arc<dyn Engine>, request: ContainerRequest) -> Result<Self> {
        let (options, config) = request.to_bollard();
        info!("Creating container from '{}'...", request.image);
        let created = engine
            .create_container(options, config)
            .await
            .map_err(|e| match status_code(&e) {
                Some(404) => {
                    warn!("Image '{}' not found, cannot create container.", request.image);
                    Error::ImageNotFound {
                        name: request.image.clone(),
                    }
                }
                _ => {
                    error!("Failed to create container from '{}': {}", request.image, e);
                    classify(e)
                }
            })?;
        for warning in &created.warnings {
            warn!("Engine warning: {}", warning);
        }

        let mut handle = ContainerHandle {
            host_ip: engine.host_ip(),
            engine,
            name: request.name.clone().unwrap_or_else(|| created.id.clone()),
            id: created.id,
            image: request.image.clone(),
            ports: HashMap::new(),
            state: ContainerState::Created,
            stop_timeout_secs: request.stop_timeout_secs,
        };

        if let Err(e) = handle.run(&request).await {
            error!("Container '{}' failed to come up: {}", handle.name, e);
            if let Err(cleanup) = handle.teardown().await {
                error!("Cleanup of '{}' failed as well: {}", handle.name, cleanup);
            }
            return Err(e);
        }
        Ok(handle)
    }

    async fn run(&mut self, request: &ContainerRequest) -> Result<()> {
        match self.engine.start_container(&self.id).await {
            Ok(()) => {}
            Err(e) if status_code(&e) == Some(304) => debug!("Container already started."),
            Err(e) => return Err(classify(e)),
        }

        let inspect = self
            .engine
            .inspect_container(&self.id)
            .await
            .map_err(classify)?;
        if let Some(name) = inspect.name.as_deref() {
            self.name = name.trim_start_matches('/').to_string();
        }
        let bindings = inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .unwrap_or_default();
        self.ports = published_ports(&bindings);
        self.state = ContainerState::Running;
        info!(
            "Container '{}' running ({}), ports {:?}",
            self.name, self.id, self.ports
        );

        request
            .wait_for
            .wait(self, request.startup_timeout)
            .await
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image reference the container was started from.
    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state == ContainerState::Running {
            Ok(())
        } else {
            Err(Error::ContainerNotRunning {
                name: self.name.clone(),
            })
        }
    }

    /// Address at which published ports are reachable.
    pub fn host_ip(&self) -> Result<&str> {
        self.ensure_running()?;
        Ok(&self.host_ip)
    }

    /// Host port bound to the internal tcp `port`.
    pub fn exposed_port(&self, port: u16) -> Result<u16> {
        self.ensure_running()?;
        self.ports
            .get(&port)
            .copied()
            .ok_or_else(|| Error::PortNotPublished {
                name: self.name.clone(),
                port,
            })
    }

    /// Everything the container has written to stdout and stderr so far.
    pub async fn logs(&self) -> Result<String> {
        self.engine
            .logs(&self.id)
            .await
            .map_err(|e| self.map_container_error(e))
    }

    /// Runs `cmd` inside the container. A non-zero exit code is not an error here.
    #[instrument(skip(self), fields(container = %self.name))]
    pub async fn exec<I, S>(&self, cmd: I) -> Result<ExecOutput>
    where
        I: IntoIterator<Item = S> + fmt::Debug,
        S: Into<String>,
    {
        self.ensure_running()?;
        let cmd: Vec<String> = cmd.into_iter().map(Into::into).collect();
        debug!("Executing {:?}", cmd);
        self.engine
            .exec(&self.id, cmd)
            .await
            .map_err(|e| self.map_container_error(e))
    }

    /// See [`waiting::wait_for_logs`].
    pub async fn wait_for_logs(&self, pattern: &str, timeout: Duration) -> Result<()> {
        waiting::wait_for_logs(self, pattern, timeout).await
    }

    fn map_container_error(&self, e: bollard::errors::Error) -> Error {
        match status_code(&e) {
            Some(404) => Error::ContainerNotFound {
                name: self.name.clone(),
            },
            Some(409) => Error::ContainerNotRunning {
                name: self.name.clone(),
            },
            _ => classify(e),
        }
    }

    /// Stops and removes the container now, reporting any failure.
    pub async fn stop(mut self) -> Result<()> {
        self.teardown().await
    }

    async fn teardown(&mut self) -> Result<()> {
        if self.state == ContainerState::Removed {
            return Ok(());
        }
        self.state = ContainerState::Stopping;
        let result = teardown(self.engine.as_ref(), &self.id, self.stop_timeout_secs).await;
        // Even a failed teardown is not retried from Drop.
        self.state = ContainerState::Removed;
        result
    }
}

/// Internal port → host port, preferring IPv4 bindings.
fn published_ports(bindings: &PortMap) -> HashMap<u16, u16> {
    let mut ports = HashMap::new();
    for (key, binding) in bindings {
        let Some((port, proto)) = key.split_once('/') else {
            continue;
        };
        if proto != "tcp" {
            continue;
        }
        let Ok(port) = port.parse::<u16>() else {
            continue;
        };
        let Some(binding) = binding else {
            continue;
        };
        let preferred = binding
            .iter()
            .find(|b| b.host_ip.as_deref().is_some_and(|ip| !ip.contains(':')))
            .or_else(|| binding.first());
        if let Some(host_port) = preferred
            .and_then(|b| b.host_port.as_deref())
            .and_then(|p| p.parse::<u16>().ok())
        {
            ports.insert(port, host_port);
        }
    }
    ports
}

/// Stop then force-remove, tolerating "already stopped" and "already gone".
#[instrument(skip(engine))]
async fn teardown(engine: &dyn Engine, id: &str, stop_timeout_secs: u32) -> Result<()> {
    debug!("Stopping container {}...", id);
    match engine.stop_container(id, Some(i64::from(stop_timeout_secs))).await {
        Ok(()) => {}
        Err(e) if matches!(status_code(&e), Some(304) | Some(404)) => {
            debug!("Container {} was not running.", id);
        }
        Err(e) => {
            // Removal below uses force, so a failed stop is not fatal.
            warn!("Failed to stop container {}: {}", id, e);
        }
    }

    let options = RemoveContainerOptions {
        force: true,
        v: true,
        ..Default::default()
    };
    match engine.remove_container(id, options).await {
        Ok(()) => {
            info!("Container {} removed.", id);
            Ok(())
        }
        Err(e) if status_code(&e) == Some(404) => {
            debug!("Container {} was already removed.", id);
            Ok(())
        }
        Err(e) => {
            error!("Failed to remove container {}: {}", id, e);
            Err(classify(e))
        }
    }
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        if self.state == ContainerState::Removed {
            return;
        }
        self.state = ContainerState::Stopping;
        let id = self.id.clone();
        let stop_timeout_secs = self.stop_timeout_secs;

        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                let engine = self.engine.clone();
                let result = tokio::task::block_in_place(|| {
                    handle.block_on(teardown(engine.as_ref(), &id, stop_timeout_secs))
                });
                if let Err(e) = result {
                    error!("Failed to clean up container '{}': {}", self.name, e);
                }
            }
            // Current-thread runtime or none at all: the runtime cannot be blocked, so
            // run teardown on a thread of its own with a connection bound to it.
            _ => match self.engine.reconnect() {
                Ok(engine) => {
                    let name = self.name.clone();
                    let worker = std::thread::spawn(move || {
                        let runtime = match tokio::runtime::Builder::new_current_thread()
                            .enable_all()
                            .build()
                        {
                            Ok(runtime) => runtime,
                            Err(e) => {
                                error!(
                                    "Cannot start a runtime to clean up container '{}': {}",
                                    name, e
                                );
                                return;
                            }
                        };
                        let result =
                            runtime.block_on(teardown(engine.as_ref(), &id, stop_timeout_secs));
                        if let Err(e) = result {
                            error!("Failed to clean up container '{}': {}", name, e);
                        }
                    });
                    if worker.join().is_err() {
                        error!("Teardown of container '{}' panicked.", self.name);
                    }
                }
                Err(e) => error!(
                    "Cannot reconnect to the engine to clean up container '{}': {}",
                    self.name, e
                ),
            },
        }
        self.state = ContainerState::Removed;
    }
}
