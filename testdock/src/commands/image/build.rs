//! # testdock Image Build Command
//!
//! File: testdock/src/commands/image/build.rs
//!
//! Implements `testdock image build <CONTEXT>`: packs the context, builds it on
//! the engine and prints the new image's id. On a failed recipe the collected
//! build log is printed to stderr before the error.
//!
use crate::commands::{connect_engine, parse_key_val};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use testdock::image::{BuildOptions, DockerImage, DEFAULT_BUILD_TAG};
use testdock::Error;
use tracing::{debug, info};

/// Arguments of `testdock image build`.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Build context directory.
    context: PathBuf,

    /// Name and optionally tag of the image (e.g. "my-app:1.0").
    #[arg(short, long, default_value = DEFAULT_BUILD_TAG)]
    tag: String,

    /// Dockerfile path, relative to the context.
    #[arg(short, long, default_value = "Dockerfile")]
    file: String,

    /// Build-time variable, repeatable.
    #[arg(long = "build-arg", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    build_args: Vec<(String, String)>,

    /// Build only up to this stage of a multi-stage Dockerfile.
    #[arg(long)]
    target: Option<String>,

    /// Do not use the layer cache.
    #[arg(long)]
    no_cache: bool,

    /// Always pull newer versions of base images.
    #[arg(long)]
    pull: bool,
}

impl BuildArgs {
    fn to_options(&self) -> BuildOptions {
        let mut options = BuildOptions::new(&self.context, &self.tag)
            .dockerfile(&self.file)
            .no_cache(self.no_cache)
            .pull(self.pull);
        for (key, value) in &self.build_args {
            options = options.build_arg(key, value);
        }
        if let Some(target) = &self.target {
            options = options.target(target);
        }
        options
    }
}

/// Handles `testdock image build`.
pub async fn handle_build(args: BuildArgs) -> anyhow::Result<()> {
    info!("Handling image build command...");
    debug!("Build args: {:?}", args);

    let (_, engine) = connect_engine()?;
    let mut image = DockerImage::new(engine);
    match image.build(args.to_options()).await {
        Ok(_) => {}
        Err(Error::Build { tag, message, log }) => {
            if !log.is_empty() {
                eprintln!("{}", log.trim_end());
            }
            return Err(Error::Build {
                tag,
                message,
                log: String::new(),
            })
            .context(format!("Failed to build '{}'", args.tag));
        }
        Err(e) => return Err(e).context(format!("Failed to build '{}'", args.tag)),
    }

    println!(
        "Built '{}' ({})",
        args.tag,
        image.short_id().context("Built image has no id")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        args: BuildArgs,
    }

    #[test]
    fn test_build_args_parsing() {
        let cli = TestCli::try_parse_from([
            "build",
            "./ctx",
            "-t",
            "my/app:1",
            "-f",
            "Dockerfile.test",
            "--build-arg",
            "VERSION=1.2",
            "--build-arg",
            "MODE=ci",
            "--target",
            "runtime",
            "--no-cache",
        ])
        .unwrap();
        assert_eq!(cli.args.context, PathBuf::from("./ctx"));
        assert_eq!(cli.args.tag, "my/app:1");
        assert_eq!(cli.args.build_args.len(), 2);
        assert!(cli.args.no_cache);

        let options = cli.args.to_options();
        assert_eq!(options.tag(), "my/app:1");
        assert_eq!(options.context(), std::path::Path::new("./ctx"));
    }

    #[test]
    fn test_build_args_defaults() {
        let cli = TestCli::try_parse_from(["build", "."]).unwrap();
        assert_eq!(cli.args.tag, DEFAULT_BUILD_TAG);
        assert_eq!(cli.args.file, "Dockerfile");
        assert!(cli.args.build_args.is_empty());
        assert!(TestCli::try_parse_from(["build", ".", "--build-arg", "oops"]).is_err());
    }
}
