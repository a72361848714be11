//! # testdock Docker Module Interface
//!
//! File: testdock/src/common/docker/mod.rs
//!
//! ## Overview
//!
//! Everything that talks to the container engine directly lives here. The
//! image and container handles only see the `Engine` trait, so they can be
//! exercised against an in-memory engine in unit tests.
//!
//! ## Architecture
//!
//! - **`engine`**: the `Engine` trait and the `ExecOutput` value type.
//! - **`connect`**: `DockerEngine`, the `bollard`-backed implementation, and
//!   `connect_docker`, which builds a client from `EngineConfig`.
//!

/// Building a `bollard` client and the production `Engine` implementation.
pub mod connect;
/// The engine abstraction shared by image and container handles.
pub mod engine;

#[cfg(test)]
pub(crate) mod fake;

pub use connect::DockerEngine;
pub use engine::{Engine, ExecOutput};
