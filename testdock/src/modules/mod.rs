//! # testdock Container Modules (`modules`)
//!
//! File: testdock/src/modules/mod.rs
//!
//! Ready-made containers for services commonly needed in integration tests. Each
//! module pairs an options builder with a running handle that wraps a
//! `ContainerHandle`, adding service-specific accessors.
//!
//! - **`nginx`**: an nginx web server, optionally built from a local Dockerfile.
//! - **`ollama`**: an Ollama model server with GPU passthrough when available.
//!

pub mod nginx;
pub mod ollama;
