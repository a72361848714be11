//! # testdock Image Command Group
//!
//! File: testdock/src/commands/image/mod.rs
//!
//! ## Overview
//!
//! `testdock image <subcommand>`: the CLI face of `testdock::image::DockerImage`.
//!
//! ## Subcommands
//!
//! - `build`: build an image from a context directory
//! - `pull`: pull `repository[:tag]` from a registry
//! - `inspect`: print id, short id and tags of an image
//! - `exists`: print `true` or `false`
//! - `rm`: remove an image
//!
use clap::{Parser, Subcommand};

mod build;
mod exists;
mod inspect;
mod pull;
mod rm;

/// Arguments of `testdock image`.
#[derive(Parser, Debug)]
pub struct ImageArgs {
    #[command(subcommand)]
    command: ImageCommand,
}

#[derive(Subcommand, Debug)]
enum ImageCommand {
    /// Build an image from a build context directory.
    Build(build::BuildArgs),
    /// Pull an image from a registry.
    Pull(pull::PullArgs),
    /// Show id, short id and tags of a local image.
    Inspect(inspect::InspectArgs),
    /// Print whether an image exists locally.
    Exists(exists::ExistsArgs),
    /// Remove a local image.
    #[command(alias = "remove")]
    Rm(rm::RmArgs),
}

/// Dispatches `testdock image` to its subcommand handler.
pub async fn handle_image(args: ImageArgs) -> anyhow::Result<()> {
    match args.command {
        ImageCommand::Build(args) => build::handle_build(args).await,
        ImageCommand::Pull(args) => pull::handle_pull(args).await,
        ImageCommand::Inspect(args) => inspect::handle_inspect(args).await,
        ImageCommand::Exists(args) => exists::handle_exists(args).await,
        ImageCommand::Rm(args) => rm::handle_rm(args).await,
    }
}
