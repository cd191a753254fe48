//! Keystone Platform Example
//!
//! Boots a small low-code platform from six plugins: a record store, an
//! object layer, workflow automation, an audit trail, a demo-data seeder and
//! a manifest-described UI.
//!
//! # Usage
//!
//! ```bash
//! # Bootstrap, seed 10 records, run until Ctrl+C
//! cargo run --package keystone-platform -- run --seed 10
//!
//! # Bootstrap and shut down immediately
//! cargo run --package keystone-platform -- run --once
//!
//! # Print the bootstrap order without running any hook
//! cargo run --package keystone-platform -- plan
//! ```
//!
//! Configuration is read from `keystone.toml` when present, e.g.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [plugins.audit]
//! retention = 100
//! ```

mod plugins;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keystone::core::{DependencyNode, DependencyResolver};
use keystone::kernel::PluginDescriptor;
use keystone::prelude::*;
use keystone_plugin_audit::{AUDIT_SERVICE, AuditLog};
use tracing::info;

use plugins::Automation;

#[derive(Parser)]
#[command(name = "keystone-platform")]
#[command(about = "A low-code platform assembled from Keystone plugins")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to keystone.toml in the working directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. "production"
    #[arg(short, long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap every plugin and run until Ctrl+C / SIGTERM
    Run {
        /// Number of demo records to insert on start
        #[arg(long, default_value_t = 3)]
        seed: u64,

        /// Shut down right after bootstrap
        #[arg(long)]
        once: bool,
    },
    /// Print the bootstrap order without running any plugin hook
    Plan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan => plan(),
        Commands::Run { seed, once } => run(cli.config, cli.profile, seed, once).await,
    }
}

fn plan() -> Result<()> {
    let descriptors: Vec<PluginDescriptor> = plugins::all()
        .iter()
        .map(|p| PluginDescriptor::of(p.as_ref()))
        .collect();
    let nodes: Vec<DependencyNode> = descriptors
        .iter()
        .map(|d| DependencyNode::new(d.id.clone(), d.dependencies.iter().cloned()))
        .collect();

    let order = DependencyResolver::resolve(&nodes).context("plugin graph is not loadable")?;

    for (step, id) in order.iter().enumerate() {
        let Some(d) = descriptors.iter().find(|d| &d.id == id) else {
            continue;
        };
        let deps = if d.dependencies.is_empty() {
            String::from("-")
        } else {
            d.dependencies.join(", ")
        };
        println!(
            "{:>2}. {:<12} {:<8} needs: {}",
            step + 1,
            d.id,
            d.version.as_deref().unwrap_or("?"),
            deps
        );
    }
    Ok(())
}

async fn run(config: Option<PathBuf>, profile: Option<String>, seed: u64, once: bool) -> Result<()> {
    let mut builder = KeystoneRuntime::builder().set("plugins.seed.records", seed);
    if let Some(path) = config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = profile {
        builder = builder.profile(profile);
    }
    let runtime = builder.build().context("failed to load configuration")?;

    for plugin in plugins::all() {
        runtime.kernel().use_plugin_arc(plugin);
    }

    let kernel = runtime.kernel().clone();
    let report = runtime
        .run_until(async move {
            summarize(&kernel);
            if !once {
                info!("Platform is up. Press Ctrl+C to stop.");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        })
        .await?;

    for err in &report.errors {
        eprintln!("shutdown: {err}");
    }
    Ok(())
}

fn summarize(kernel: &Kernel) {
    let audited = kernel
        .get_service::<AuditLog>(AUDIT_SERVICE)
        .map_or(0, |log| log.len());
    let fired = kernel
        .get_service::<Automation>("automation")
        .map_or(0, |a| a.fired());

    info!(
        plugins   = kernel.plugin_count(),
        audited,
        rules     = fired,
        "Platform bootstrapped"
    );
}
