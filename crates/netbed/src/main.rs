//! Netbed CLI entry point.
//!
//! Loads configuration (TOML file + flag overrides), connects to the local
//! Docker daemon, runs the provisioning workflow once, prints the captured
//! topology-script output on success, and exits non-zero after a single
//! diagnostic on failure.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use netbed::config::{self, TestbedConfig};
use netbed::controller::HttpController;
use netbed::provision::Provisioner;
use netbed::runtime::DockerRuntime;

/// Netbed testbed provisioner.
#[derive(Parser, Debug)]
#[command(name = "netbed", about = "Provision an SDN controller + network emulator testbed")]
struct Cli {
    /// TOML config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Controller image reference.
    #[arg(long)]
    controller_image: Option<String>,

    /// Emulator image reference.
    #[arg(long)]
    emulator_image: Option<String>,

    /// Controller management API base URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Controller application to activate (repeatable, replaces the default
    /// list).
    #[arg(long = "app")]
    apps: Vec<String>,

    /// Host directory bind-mounted into the emulator.
    #[arg(long)]
    share_dir: Option<PathBuf>,

    /// Topology template path.
    #[arg(long)]
    template: Option<PathBuf>,

    /// Readiness poll budget in seconds.
    #[arg(long)]
    readiness_timeout: Option<u64>,

    /// Stop and remove started containers if provisioning aborts.
    #[arg(long, default_value_t = false)]
    cleanup_on_failure: bool,
}

impl Cli {
    fn apply(&self, config: &mut TestbedConfig) {
        if let Some(image) = &self.controller_image {
            config.controller.image = image.clone();
        }
        if let Some(image) = &self.emulator_image {
            config.emulator.image = image.clone();
        }
        if let Some(url) = &self.api_url {
            config.controller.api_url = url.clone();
        }
        if !self.apps.is_empty() {
            config.controller.apps = self.apps.clone();
        }
        if let Some(dir) = &self.share_dir {
            config.emulator.share_dir = dir.clone();
        }
        if let Some(template) = &self.template {
            config.topology.template = template.clone();
        }
        if let Some(secs) = self.readiness_timeout {
            config.controller.readiness_timeout_secs = secs;
        }
        if self.cleanup_on_failure {
            config.cleanup_on_failure = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => config::load(path)?,
        None => TestbedConfig::default(),
    };
    cli.apply(&mut config);

    tracing::info!(
        controller = %config.controller.image,
        emulator = %config.emulator.image,
        "netbed starting"
    );

    let runtime = DockerRuntime::connect().await?;
    let controller = HttpController::new(&config.controller);
    let mut provisioner =
        Provisioner::new(Box::new(runtime), Box::new(controller), config);

    match provisioner.run().await {
        Ok(outcome) => {
            tracing::info!(address = %outcome.controller_address, "testbed provisioned");
            print!("{}", outcome.script_output);
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "provisioning aborted");
            std::process::exit(1);
        }
    }
}
