//! # testdock Image Pull Command
//!
//! File: testdock/src/commands/image/pull.rs
//!
//! Implements `testdock image pull <REPOSITORY> [--tag TAG]`.
//!
use crate::commands::connect_engine;
use anyhow::Context;
use clap::Parser;
use testdock::image::{DockerImage, PullOptions, DEFAULT_PULL_TAG};
use tracing::info;

/// Arguments of `testdock image pull`.
#[derive(Parser, Debug)]
pub struct PullArgs {
    /// Repository to pull, e.g. "alpine" or "ghcr.io/org/app".
    repository: String,

    /// Tag, or a `sha256:` digest.
    #[arg(short, long, default_value = DEFAULT_PULL_TAG)]
    tag: String,

    /// Platform to pull for, e.g. "linux/arm64".
    #[arg(long)]
    platform: Option<String>,
}

/// Handles `testdock image pull`.
pub async fn handle_pull(args: PullArgs) -> anyhow::Result<()> {
    let mut options = PullOptions::new(&args.repository).tag(&args.tag);
    if let Some(platform) = &args.platform {
        options = options.platform(platform);
    }
    let reference = options.reference();
    info!("Handling image pull for '{}'", reference);

    let (_, engine) = connect_engine()?;
    let mut image = DockerImage::new(engine);
    image
        .pull(options)
        .await
        .with_context(|| format!("Failed to pull '{}'", reference))?;

    println!("Pulled '{}' ({})", reference, image.short_id()?);
    Ok(())
}
