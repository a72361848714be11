//! # testdock Run Command
//!
//! File: testdock/src/commands/run.rs
//!
//! Implements `testdock run <IMAGE>`: starts a container with the requested
//! published ports and environment, prints where each port is reachable, then
//! waits for Ctrl-C and tears the container down.
//!
use crate::commands::{connect_engine, parse_key_val};
use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use testdock::container::{ContainerHandle, ContainerRequest};
use testdock::waiting::WaitFor;
use tracing::{debug, info};

/// Arguments of `testdock run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Image to run.
    image: String,

    /// Container port to publish on a free host port, repeatable.
    #[arg(short, long = "port", value_name = "PORT")]
    ports: Vec<u16>,

    /// Environment variable, repeatable.
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    env: Vec<(String, String)>,

    /// Container name.
    #[arg(long)]
    name: Option<String>,

    /// Regex the container must log before it is considered ready.
    #[arg(long)]
    wait_log: Option<String>,

    /// Seconds to wait for readiness (default from configuration).
    #[arg(long)]
    startup_timeout: Option<u64>,

    /// Command overriding the image default, after `--`.
    #[arg(last = true)]
    cmd: Vec<String>,
}

impl RunArgs {
    fn to_request(&self, defaults: &testdock::core::config::ContainerDefaults) -> ContainerRequest {
        let mut request = ContainerRequest::new(&self.image).with_defaults(defaults);
        for port in &self.ports {
            request = request.with_exposed_port(*port);
        }
        for (key, value) in &self.env {
            request = request.with_env(key, value);
        }
        if let Some(name) = &self.name {
            request = request.with_name(name);
        }
        if let Some(pattern) = &self.wait_log {
            request = request.with_wait_for(WaitFor::log(pattern));
        }
        if let Some(secs) = self.startup_timeout {
            request = request.with_startup_timeout(Duration::from_secs(secs));
        }
        if !self.cmd.is_empty() {
            request = request.with_cmd(self.cmd.clone());
        }
        request
    }
}

/// Handles `testdock run`.
pub async fn handle_run(args: RunArgs) -> anyhow::Result<()> {
    info!("Handling run command for '{}'", args.image);
    debug!("Run args: {:?}", args);

    let (config, engine) = connect_engine()?;
    let request = args.to_request(&config.containers);
    let container = ContainerHandle::start(engine, request)
        .await
        .with_context(|| format!("Failed to start a container from '{}'", args.image))?;

    println!("Started '{}' ({})", container.name(), container.id());
    for port in &args.ports {
        println!(
            "{} -> {}:{}",
            port,
            container.host_ip()?,
            container.exposed_port(*port)?
        );
    }
    println!("Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    println!("Stopping '{}'...", container.name());
    container
        .stop()
        .await
        .context("Failed to remove the container")?;
    Ok(())
}
