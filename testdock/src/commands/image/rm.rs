//! # testdock Image Remove Command
//!
//! File: testdock/src/commands/image/rm.rs
//!
//! Implements `testdock image rm <REF>`.
//!
use crate::commands::connect_engine;
use anyhow::Context;
use clap::Parser;
use testdock::image::{DockerImage, RemoveOptions};
use testdock::Error;
use tracing::warn;

/// Arguments of `testdock image rm`.
#[derive(Parser, Debug)]
pub struct RmArgs {
    /// Image name, tag or id.
    reference: String,

    /// Remove even if stopped containers still use the image.
    #[arg(short, long)]
    force: bool,

    /// Keep untagged parent layers.
    #[arg(long)]
    no_prune: bool,

    /// Succeed if the image does not exist.
    #[arg(long)]
    ignore_missing: bool,
}

impl RmArgs {
    fn to_options(&self) -> RemoveOptions {
        RemoveOptions::default()
            .force(self.force)
            .prune_children(!self.no_prune)
            .ignore_missing(self.ignore_missing)
    }
}

/// Handles `testdock image rm`.
pub async fn handle_rm(args: RmArgs) -> anyhow::Result<()> {
    let (_, engine) = connect_engine()?;
    let mut image = DockerImage::new(engine);

    if let Err(e) = image.from_local(&args.reference).await {
        if args.ignore_missing && matches!(e, Error::ImageNotFound { .. }) {
            warn!("Image '{}' not found, nothing to remove.", args.reference);
            return Ok(());
        }
        return Err(e).with_context(|| format!("Failed to remove '{}'", args.reference));
    }
    image
        .remove(args.to_options())
        .await
        .with_context(|| format!("Failed to remove '{}'", args.reference))?;

    println!("Removed '{}'", args.reference);
    Ok(())
}
