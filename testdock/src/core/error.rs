//! # testdock Error Types
//!
//! File: testdock/src/core/error.rs
//!
//! ## Overview
//!
//! This module defines the error type returned by every public operation of the
//! library. Callers match on the variants to tell apart "the image isn't there"
//! from "the engine can't be reached", which is the distinction `exists` relies on.
//!
//! ## Architecture
//!
//! - `Error`: a `thiserror` enum with one variant per failure kind.
//! - `Result<T>`: alias over `std::result::Result<T, Error>`.
//! - `classify`: the single place where raw `bollard` errors (status codes,
//!   transport failures) are turned into library errors.
//!
//! The CLI wraps these in `anyhow::Error` and adds context, the library never does.
//!
//! ## Examples
//!
//! ```rust,no_run
//! # use testdock::{image::DockerImage, Error};
//! # async fn example(image: &DockerImage) -> testdock::Result<()> {
//! match image.get("alpine:latest").await {
//!     Ok(descriptor) => println!("{}", descriptor.id),
//!     Err(Error::ImageNotFound { name }) => println!("{} is not present", name),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```
//!
use thiserror::Error;

/// Custom error type for the testdock library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Filesystem error: {0}")]
    FileSystem(String),

    #[error("Cannot reach the container engine: {source}")]
    Connection {
        #[source]
        source: bollard::errors::Error,
    },

    #[error("Docker API interaction failed: {source}")]
    DockerApi {
        #[from]
        source: bollard::errors::Error,
    },

    #[error("Image '{name}' not found.")]
    ImageNotFound { name: String },

    #[error("Container '{name}' not found.")]
    ContainerNotFound { name: String },

    #[error("Build of '{tag}' failed: {message}")]
    Build {
        tag: String,
        message: String,
        /// Everything the engine streamed back before the failure.
        log: String,
    },

    #[error("Pull of '{reference}' failed: {message}")]
    Pull { reference: String, message: String },

    #[error("Image '{name}' could not be removed: {message}")]
    Removal { name: String, message: String },

    #[error("No image has been built or pulled by this handle yet.")]
    NoImage,

    #[error("Container '{name}' is not running.")]
    ContainerNotRunning { name: String },

    #[error("Port {port} is not published by container '{name}'.")]
    PortNotPublished { name: String, port: u16 },

    #[error("Timed out after {secs}s waiting for {what}.")]
    Timeout { what: String, secs: u64 },

    #[error("Command {cmd:?} exited with code {exit_code}: {output}")]
    Exec {
        cmd: Vec<String>,
        exit_code: i64,
        output: String,
    },

    #[error("Failed to decode a JSON response: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("HTTP request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns true when the engine error means the engine itself could not be reached,
/// as opposed to the engine answering with a failure.
pub(crate) fn is_transport_failure(e: &bollard::errors::Error) -> bool {
    use bollard::errors::Error as DockerError;
    if matches!(
        e,
        DockerError::IOError { .. }
            | DockerError::HyperResponseError { .. }
            | DockerError::RequestTimeoutError
            | DockerError::SocketNotFoundError(_)
    ) {
        return true;
    }
    // Client-level failures (refused connection, DNS) arrive wrapped; look for the I/O cause.
    let mut cause = std::error::Error::source(e);
    while let Some(inner) = cause {
        if inner.is::<std::io::Error>() {
            return true;
        }
        cause = inner.source();
    }
    false
}

/// Returns the HTTP status the engine answered with, if it answered at all.
pub(crate) fn status_code(e: &bollard::errors::Error) -> Option<u16> {
    match e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => {
            Some(*status_code)
        }
        _ => None,
    }
}

/// Maps an engine error that has no operation-specific meaning.
///
/// Transport failures become `Error::Connection`; everything else is `Error::DockerApi`.
/// Operation-specific codes (404 on inspect, 409 on remove, ...) are handled by the
/// caller before falling back to this.
pub(crate) fn classify(e: bollard::errors::Error) -> Error {
    if is_transport_failure(&e) {
        Error::Connection { source: e }
    } else {
        Error::DockerApi { source: e }
    }
}
