//! # testdock Common Utilities (`common`)
//!
//! File: testdock/src/common/mod.rs
//!
//! ## Overview
//!
//! Shared plumbing used by the public handles:
//!
//! - **`archive`**: packing build contexts into gzipped tarballs.
//! - **`docker`**: the engine abstraction and its `bollard` implementation.
//!

/// Utilities for build-context archives.
pub mod archive;
/// Engine abstraction and the Docker client wrapper.
pub mod docker;
