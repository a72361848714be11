//! # testdock Image Inspect Command
//!
//! File: testdock/src/commands/image/inspect.rs
//!
//! Implements `testdock image inspect <REF>`.
//!
use crate::commands::connect_engine;
use anyhow::Context;
use clap::Parser;
use testdock::image::DockerImage;

/// Arguments of `testdock image inspect`.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Image name, tag or id.
    reference: String,
}

/// Handles `testdock image inspect`.
pub async fn handle_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let (_, engine) = connect_engine()?;
    let descriptor = DockerImage::new(engine)
        .get(&args.reference)
        .await
        .with_context(|| format!("Failed to inspect '{}'", args.reference))?;

    println!("ID:       {}", descriptor.id);
    println!("Short ID: {}", descriptor.short_id);
    if descriptor.tags.is_empty() {
        println!("Tags:     <none>");
    } else {
        println!("Tags:     {}", descriptor.tags.join(", "));
    }
    Ok(())
}
