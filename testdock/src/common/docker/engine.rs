//! # testdock Engine Abstraction
//!
//! File: testdock/src/common/docker/engine.rs
//!
//! ## Overview
//!
//! `Engine` is the seam between the image/container handles and the actual
//! container engine. Every method is a one-to-one delegation to a Docker Engine
//! API call and returns the raw `bollard` error, so status-code interpretation
//! stays with the callers that know what a 404 or 409 means for their operation.
//!
//! Handles hold an `Arc<dyn Engine>`: the production implementation is
//! `DockerEngine` (see `connect.rs`); tests plug in an in-memory engine.
//!
use crate::core::error::Result;
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
        BuildInfo, ContainerCreateResponse, ContainerInspectResponse, CreateImageInfo,
        ImageDeleteResponseItem, ImageInspect, ImageSummary, SystemInfo,
    },
};
use futures_util::stream::BoxStream;
use std::sync::Arc;

/// Progress events of an image build, in the order the engine sent them.
pub type BuildStream<'a> = BoxStream<'a, std::result::Result<BuildInfo, DockerError>>;
/// Progress events of an image pull.
pub type PullStream<'a> = BoxStream<'a, std::result::Result<CreateImageInfo, DockerError>>;

/// Captured result of a command executed inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// Operations the handles need from a container engine.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Address at which ports published by this engine are reachable.
    fn host_ip(&self) -> String {
        "localhost".to_string()
    }

    /// A connection usable from a different async runtime than the current one.
    ///
    /// Used by drop-time teardown, which may have to run on its own thread.
    fn reconnect(&self) -> Result<Arc<dyn Engine>>;

    async fn ping(&self) -> std::result::Result<(), DockerError>;

    async fn info(&self) -> std::result::Result<SystemInfo, DockerError>;

    fn build_image(&self, options: BuildImageOptions<String>, context: Vec<u8>) -> BuildStream<'_>;

    fn create_image(
        &self,
        options: CreateImageOptions<String>,
        credentials: Option<DockerCredentials>,
    ) -> PullStream<'_>;

    async fn inspect_image(&self, name: &str) -> std::result::Result<ImageInspect, DockerError>;

    async fn list_images(
        &self,
        options: ListImagesOptions<String>,
    ) -> std::result::Result<Vec<ImageSummary>, DockerError>;

    async fn remove_image(
        &self,
        name: &str,
        options: RemoveImageOptions,
    ) -> std::result::Result<Vec<ImageDeleteResponseItem>, DockerError>;

    async fn create_container(
        &self,
        options: Option<CreateContainerOptions<String>>,
        config: ContainerConfig<String>,
    ) -> std::result::Result<ContainerCreateResponse, DockerError>;

    async fn start_container(&self, id: &str) -> std::result::Result<(), DockerError>;

    async fn inspect_container(
        &self,
        id: &str,
    ) -> std::result::Result<ContainerInspectResponse, DockerError>;

    async fn stop_container(
        &self,
        id: &str,
        timeout_secs: Option<i64>,
    ) -> std::result::Result<(), DockerError>;

    async fn remove_container(
        &self,
        id: &str,
        options: RemoveContainerOptions,
    ) -> std::result::Result<(), DockerError>;

    /// Everything the container has written to stdout and stderr so far.
    async fn logs(&self, id: &str) -> std::result::Result<String, DockerError>;

    async fn exec(&self, id: &str, cmd: Vec<String>)
        -> std::result::Result<ExecOutput, DockerError>;

    async fn commit_container(
        &self,
        options: CommitContainerOptions<String>,
        config: ContainerConfig<String>,
    ) -> std::result::Result<(), DockerError>;
}
