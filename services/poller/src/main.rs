//! Weather aggregation polling service.
//!
//! Resolves the configured station, then runs one polling job per facet
//! with:
//! - Independent intervals and failure handling per facet
//! - Decode + selective consumer notification on the current-conditions tick
//! - An HTTP status API for monitoring and area search

mod server;
mod sink;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hub_core::{
    ClientConfig, ClientRegistry, CoordinatorSet, Enablement, Facet, WeatherClient,
};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use server::ServerState;
use sink::LatestState;

#[derive(Parser, Debug)]
#[command(name = "poller")]
#[command(about = "Weather aggregation poller with per-facet schedules")]
struct Args {
    /// Configuration file
    #[arg(long, env = "HUB_CONFIG", default_value = "config/hub.yaml")]
    config: PathBuf,

    /// Run one refresh cycle over all facets, print the payload, and exit
    #[arg(long)]
    once: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON logs instead of text
    #[arg(long)]
    log_json: bool,

    /// Port for status HTTP server
    #[arg(long, env = "STATUS_PORT", default_value = "8084")]
    status_port: u16,

    /// Disable status HTTP server
    #[arg(long)]
    no_status_server: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);
    if args.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    info!("Starting weather aggregation poller");

    let config = ClientConfig::load(&args.config)?;
    let schedule = config.schedule.clone();

    let registry = ClientRegistry::new();
    let client = registry.create("default", config)?;

    // Station resolution is fatal to startup; facet failures are not.
    client
        .init()
        .await
        .context("station resolution failed; cannot build facet URLs")?;

    let latest = Arc::new(LatestState::default());
    register_consumers(&client, latest.clone())?;

    if args.once {
        info!("Running single refresh cycle");
        for facet in [
            Facet::Current,
            Facet::Alarms,
            Facet::Daily,
            Facet::Hourly,
            Facet::Minutely,
            Facet::ObservationHistory,
        ] {
            if let Err(e) = client.refresh(facet).await {
                error!(facet = %facet, error = %e, "Facet refresh failed");
            }
        }
        let payload = client.decode_and_notify();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let coordinator = CoordinatorSet::spawn(client.clone(), &schedule);

    if !args.no_status_server {
        let state = Arc::new(ServerState {
            client: client.clone(),
            health: coordinator.health(),
            latest,
        });
        let port = args.status_port;
        tokio::spawn(async move {
            if let Err(e) = server::run_server(state, port).await {
                error!(error = %e, "Status server failed");
            }
        });
    }

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    coordinator.shutdown();
    coordinator.join().await;

    Ok(())
}

/// One consumer per enabled converter, all folding into the shared
/// latest-state sink. Disabled and lazy converters still decode; their
/// attributes reach consumers subscribed to them as children.
fn register_consumers(client: &Arc<WeatherClient>, latest: Arc<LatestState>) -> Result<()> {
    let attrs: Vec<String> = client
        .registry()
        .iter()
        .filter(|c| c.enablement == Enablement::Enabled)
        .map(|c| c.attr.clone())
        .collect();

    for attr in attrs {
        let handle = client.register_consumer(&attr, latest.clone())?;
        info!(attr = %handle.attr, subscribed = handle.subscribed.len(), "Registered consumer");
    }
    Ok(())
}
