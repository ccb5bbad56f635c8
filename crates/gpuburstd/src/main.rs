//! gpuburstd — the gpuburst daemon.
//!
//! Single binary that assembles:
//! - Node pool control (AKS, or a simulated pool with `--simulate`)
//! - Job record store
//! - Job lifecycle coordinator
//! - REST API
//!
//! # Usage
//!
//! ```text
//! AZURE_SUBSCRIPTION_ID=... AZURE_RESOURCE_GROUP=... AKS_CLUSTER_NAME=... \
//! AZURE_ACCESS_TOKEN=... gpuburstd serve --port 5000 --config gpuburst.toml
//! ```

mod config;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use gpuburst_lifecycle::{Coordinator, TimedWorkload};
use gpuburst_pool::{AksPool, AksPoolConfig, PoolControl, SimulatedPool};
use gpuburst_state::{DEFAULT_GPU_TYPE, JobStore};

use crate::config::{FileConfig, PoolEnv};

#[derive(Parser)]
#[command(name = "gpuburstd", about = "On-demand GPU node pool daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST API and run submitted jobs.
    Serve {
        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (overrides the config file).
        #[arg(long)]
        bind: Option<IpAddr>,

        /// Path to a gpuburst.toml config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Use an in-process simulated node pool instead of AKS.
        #[arg(long)]
        simulate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve {
            port,
            bind,
            config,
            simulate,
        } => run_serve(port, bind, config, simulate).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,gpuburstd=debug,gpuburst=debug")
        });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_serve(
    port: Option<u16>,
    bind: Option<IpAddr>,
    config_path: Option<PathBuf>,
    simulate: bool,
) -> anyhow::Result<()> {
    info!(simulate, "gpuburst daemon starting");

    let file_config = match &config_path {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };

    // Refuse to start without the pool identity.
    let env = PoolEnv::from_env(!simulate)
        .inspect_err(|e| error!(error = %e, "environment validation failed"))?;
    info!(
        subscription = %env.subscription_id,
        resource_group = %env.resource_group,
        cluster = %env.cluster_name,
        pool = %env.pool_name,
        "node pool configured"
    );

    // ── Initialize subsystems ──────────────────────────────────

    let pool: Arc<dyn PoolControl> = if simulate {
        warn!("using simulated node pool, no cloud resources will be touched");
        Arc::new(
            SimulatedPool::new(&env.pool_name, DEFAULT_GPU_TYPE)
                .with_settle(Duration::from_secs(5)),
        )
    } else {
        let azure = &file_config.azure;
        let aks = AksPool::new(AksPoolConfig {
            subscription_id: env.subscription_id.clone(),
            resource_group: env.resource_group.clone(),
            cluster_name: env.cluster_name.clone(),
            pool_name: env.pool_name.clone(),
            access_token: env.access_token.clone().unwrap_or_default(),
            api_version: azure.api_version.clone(),
            management_endpoint: azure.management_endpoint.clone(),
            operation_poll_interval: Duration::from_secs(azure.operation_poll_secs),
            operation_timeout: Duration::from_secs(azure.operation_timeout_secs),
        })
        .context("building AKS client")?;
        Arc::new(aks)
    };
    info!("pool control initialized");

    let settings = file_config.lifecycle.settings();
    info!(
        poll_interval_secs = settings.poll_interval.as_secs(),
        ready_timeout_secs = settings.ready_timeout.as_secs(),
        "lifecycle coordinator initialized"
    );
    let coordinator = Coordinator::new(JobStore::new(), pool, Arc::new(TimedWorkload), settings);

    // ── Start API server ───────────────────────────────────────

    let router = gpuburst_api::build_router(coordinator);
    let addr = SocketAddr::new(
        bind.unwrap_or(file_config.server.bind),
        port.unwrap_or(file_config.server.port),
    );

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    // Graceful shutdown on Ctrl-C. In-flight jobs are dropped with the
    // runtime; their records are not persisted.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
    });

    server.await?;

    info!("gpuburst daemon stopped");
    Ok(())
}
