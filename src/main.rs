// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use zone_inventory::{
    agent::HttpZoneStreamer,
    config::InventoryConfig,
    manager::{FetchNotification, ZoneInventoryManager},
    metrics::gather_metrics,
    store::{SqliteStore, ZoneStore},
    zone::{AppType, Zone},
    zone_collection::ZoneCollection,
};

/// Interval between progress reports while a fetch runs
const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Default page size of the `zones` command
const DEFAULT_PAGE_LIMIT: usize = 100;

#[derive(Debug, Parser)]
#[command(
    name = "zone-inventory",
    version,
    about = "DNS zone inventory for BIND 9 and PowerDNS"
)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, env = "ZONE_INVENTORY_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, overrides the configuration
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database tables
    Init,

    /// Register a daemon served by an agent
    AddDaemon {
        /// App type: bind9, pdns or kea
        #[arg(long)]
        app_type: AppType,
        /// Agent API address, e.g. agent-1:8080
        #[arg(long)]
        agent_address: String,
        /// Daemon name known to the agent, e.g. named
        #[arg(long)]
        name: String,
    },

    /// Fetch zones from all DNS daemons and print the results
    Fetch {
        #[arg(long)]
        parallelism: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Also fetch from daemons whose last fetch succeeded
        #[arg(long)]
        force: bool,
        /// Print metrics after the fetch
        #[arg(long)]
        metrics: bool,
    },

    /// Page through the stored zones of a daemon in DNS order
    Zones {
        #[arg(long)]
        daemon: i64,
        #[arg(long)]
        view: Option<String>,
        /// Name of the last zone of the previous page
        #[arg(long)]
        lower_bound: Option<String>,
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: usize,
    },

    /// Print the outcome of the last fetch for every daemon
    States,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("zone-inventory")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

fn init_tracing() {
    // Respects RUST_LOG (default INFO) and RUST_LOG_FORMAT (text or json)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(cli: Cli) -> Result<()> {
    init_tracing();

    let mut config = InventoryConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    debug!(database_url = %config.database_url, "Configuration loaded");

    let store = SqliteStore::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    store
        .init_schema()
        .await
        .context("Failed to initialize database schema")?;

    match cli.command {
        Command::Init => {
            info!(database_url = %config.database_url, "Database initialized");
            Ok(())
        }
        Command::AddDaemon {
            app_type,
            agent_address,
            name,
        } => add_daemon(&store, app_type, &agent_address, &name).await,
        Command::Fetch {
            parallelism,
            batch_size,
            force,
            metrics,
        } => {
            if let Some(parallelism) = parallelism {
                config.parallelism = parallelism;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            config.validate().context("Invalid fetch options")?;
            let notification = fetch(store, &config, force).await?;
            print_json(&notification)?;
            if metrics {
                print!("{}", gather_metrics().context("Failed to gather metrics")?);
            }
            Ok(())
        }
        Command::Zones {
            daemon,
            view,
            lower_bound,
            limit,
        } => list_zones(&store, daemon, view.as_deref(), lower_bound.as_deref(), limit).await,
        Command::States => {
            let states = store
                .list_inventory_states()
                .await
                .context("Failed to list inventory states")?;
            print_json(&states)
        }
    }
}

async fn add_daemon(
    store: &SqliteStore,
    app_type: AppType,
    agent_address: &str,
    name: &str,
) -> Result<()> {
    let app_id = store
        .add_app(app_type, agent_address)
        .await
        .context("Failed to add app")?;
    let daemon = store
        .add_daemon(app_id, name)
        .await
        .context("Failed to add daemon")?;
    info!(daemon_id = daemon.id, app_type = %app_type, agent = %agent_address, "Daemon added");
    print_json(&daemon)
}

/// Run one fetch to completion, reporting progress. Ctrl+C cancels the fetch
/// and still waits for its notification.
async fn fetch(
    store: SqliteStore,
    config: &InventoryConfig,
    force: bool,
) -> Result<FetchNotification> {
    let streamer = HttpZoneStreamer::new(config.agent_request_timeout())
        .context("Failed to create agent client")?;
    let manager = ZoneInventoryManager::new(
        Arc::new(store),
        Arc::new(streamer),
        config.stream_timeout(),
    );

    let mut notification = manager
        .fetch_zones(config.parallelism, config.batch_size, force)
        .await
        .context("Failed to start zone fetch")?;

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.tick().await;
    let mut interrupted = false;
    loop {
        tokio::select! {
            result = &mut notification => {
                return result.context("Zone fetch ended without a notification");
            }
            _ = ticker.tick() => {
                let progress = manager.fetch_zones_progress();
                info!(
                    completed_apps = progress.completed_apps,
                    apps_total = progress.apps_total,
                    "Fetching zones"
                );
            }
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                    continue;
                }
                warn!("Interrupted, cancelling zone fetch");
                manager.cancel_fetch();
            }
        }
    }
}

async fn list_zones(
    store: &SqliteStore,
    daemon_id: i64,
    view: Option<&str>,
    lower_bound: Option<&str>,
    limit: usize,
) -> Result<()> {
    let pages = zone_pages(store, daemon_id, view, lower_bound, limit).await?;
    print_json(&pages)
}

/// One page of the daemon's zones per view, keyed by view name.
///
/// Zone names are only unique within a view, so every view is ordered and
/// paged on its own. `lower_bound` applies to each view.
async fn zone_pages(
    store: &dyn ZoneStore,
    daemon_id: i64,
    view: Option<&str>,
    lower_bound: Option<&str>,
    limit: usize,
) -> Result<BTreeMap<String, Vec<Zone>>> {
    let zones = store
        .list_daemon_zones(daemon_id)
        .await
        .with_context(|| format!("Failed to list zones of daemon {daemon_id}"))?;

    let mut by_view: BTreeMap<String, Vec<Zone>> = BTreeMap::new();
    for zone in zones {
        if view.map_or(true, |view| zone.view_name() == view) {
            by_view
                .entry(zone.view_name().to_string())
                .or_default()
                .push(zone);
        }
    }

    let pages: BTreeMap<String, Vec<Zone>> = by_view
        .into_iter()
        .map(|(view, zones)| {
            let collection = ZoneCollection::of(zones);
            let page = collection
                .page(lower_bound, limit)
                .iter()
                .map(|zone| zone.as_ref().clone())
                .collect();
            (view, page)
        })
        .collect();
    debug!(daemon_id = daemon_id, views = pages.len(), "Listed zones");
    Ok(pages)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}
