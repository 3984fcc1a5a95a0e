use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fleet_poller::config::{CheckServiceConfig, PollerConfig, RegistryConfig, RunMode, UpdateMode};
use fleet_poller::poller::Poller;
use fleet_poller::probe::{CheckDepth, RestProber};
use fleet_poller::registry::HttpRegistry;
use fleet_poller::shutdown::install_signal_handler;

#[derive(Parser, Debug)]
#[command(name = "fleet-poller")]
#[command(version)]
#[command(about = "Periodically re-checks registry hosts and reports their status back")]
struct Args {
    /// Registry API base URI
    #[arg(long, default_value = "http://127.0.0.1:8080/api")]
    uri: String,

    /// Check service base URI
    #[arg(long, default_value = "http://127.0.0.1:8081")]
    check_uri: String,

    /// Bearer token for the registry
    #[arg(long, env = "FLEET_POLLER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Short name of the game whose hosts are polled
    #[arg(long, default_value = "soku")]
    game: String,

    /// Just check once, do not keep checking
    #[arg(short = 'o', long)]
    once: bool,

    /// How often to check (e.g. "5s", "1m")
    #[arg(short, long, default_value = "5s", value_parser = humantime::parse_duration)]
    frequency: Duration,

    /// How long to wait for any single probe or registry response
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Number of concurrent workers
    #[arg(short = 't', long, default_value_t = 5, value_parser = clap::value_parser!(u16).range(1..))]
    threads: u16,

    /// Actually commit updates back to the registry
    #[arg(long)]
    update: bool,

    /// How far each probe goes: ping, basic, spectate, spec-relay
    #[arg(long, default_value = "spec-relay")]
    depth: CheckDepth,

    /// How long to wait for in-flight checks after a shutdown signal
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    shutdown_grace: Duration,

    /// Verbose logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = PollerConfig {
        game: args.game,
        interval: args.frequency,
        timeout: args.timeout,
        worker_count: usize::from(args.threads),
        update_mode: if args.update {
            UpdateMode::Update
        } else {
            UpdateMode::DryRun
        },
        run_mode: if args.once {
            RunMode::OneShot
        } else {
            RunMode::Continuous
        },
        check_depth: args.depth,
        shutdown_grace: args.shutdown_grace,
    };

    let registry = HttpRegistry::new(&RegistryConfig {
        uri: args.uri,
        token: args.token,
        timeout: args.timeout,
    })
    .context("failed to init registry client")?;
    let prober = RestProber::new(&CheckServiceConfig {
        uri: args.check_uri.clone(),
    })
    .context("failed to init check service client")?;

    tracing::info!(
        registry = %registry.info(),
        check_service = %args.check_uri,
        "Connecting"
    );
    if !config.is_one_shot() {
        tracing::info!(
            pid = std::process::id(),
            "Starting continuous checker, use CTRL+C to stop or send USR1 for a diagnostics dump"
        );
    }
    if !config.updates_enabled() {
        tracing::warn!("Running in read-only mode, will not update");
    }

    let control = install_signal_handler().context("failed to install signal handlers")?;
    Poller::new(config, Arc::new(registry), Arc::new(prober))
        .run(control)
        .await?;

    Ok(())
}
