//! # testdock
//!
//! File: testdock/src/lib.rs
//!
//! ## Overview
//!
//! testdock builds, pulls and removes container images and runs short-lived
//! containers for integration tests. All of the heavy lifting happens in the
//! container engine; this crate wraps its API in fluent handles with predictable
//! errors and guaranteed cleanup.
//!
//! ## Architecture
//!
//! - **`image`**: `DockerImage`, build/pull/inspect/exists/remove of one image.
//! - **`container`**: `ContainerRequest` and the RAII `ContainerHandle`.
//! - **`waiting`**: log and HTTP readiness checks.
//! - **`modules`**: ready-made nginx and Ollama containers.
//! - **`common`**: the `Engine` abstraction, its `bollard` implementation and
//!   build-context packing.
//! - **`core`**: configuration loading and the `Error` type.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use testdock::common::docker::DockerEngine;
//! use testdock::container::{ContainerHandle, ContainerRequest};
//! use testdock::image::{DockerImage, RemoveOptions};
//!
//! # async fn run() -> testdock::Result<()> {
//! let engine = DockerEngine::from_env()?.shared();
//!
//! let mut image = DockerImage::new(engine.clone());
//! image.from_dockerfile("tests/assets", Some("my-service")).await?;
//!
//! let service = ContainerHandle::start(
//!     engine,
//!     ContainerRequest::new(image.reference()?).with_exposed_port(8080),
//! )
//! .await?;
//! let port = service.exposed_port(8080)?;
//! // ... exercise the service on localhost:port ...
//! service.stop().await?;
//!
//! image.remove(RemoveOptions::default().force(true)).await?;
//! # Ok(())
//! # }
//! ```
//!

pub mod common;
pub mod container;
pub mod core;
pub mod image;
pub mod modules;
pub mod waiting;

pub use crate::core::error::{Error, Result};
