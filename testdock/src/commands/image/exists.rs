//! # testdock Image Exists Command
//!
//! File: testdock/src/commands/image/exists.rs
//!
//! Implements `testdock image exists <REF>`. Prints `true` or `false`; an
//! unreachable engine is an error (exit code 1), never `false`.
//!
use crate::commands::connect_engine;
use anyhow::Context;
use clap::Parser;
use testdock::image::DockerImage;

/// Arguments of `testdock image exists`.
#[derive(Parser, Debug)]
pub struct ExistsArgs {
    /// Image name, tag or id.
    reference: String,
}

/// Handles `testdock image exists`.
pub async fn handle_exists(args: ExistsArgs) -> anyhow::Result<()> {
    let (_, engine) = connect_engine()?;
    let exists = DockerImage::new(engine)
        .exists(&args.reference)
        .await
        .with_context(|| format!("Failed to check whether '{}' exists", args.reference))?;
    println!("{}", exists);
    Ok(())
}
