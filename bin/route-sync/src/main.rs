use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use router_core::{RouteTable, SyncConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod sync;

#[derive(Parser, Debug)]
#[command(author, version, about = "Synchronize route definitions with etcd", long_about = None)]
struct Cli {
    /// JSON settings file; command line flags override its values
    #[arg(long, env = "ROUTE_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// etcd endpoints, tried in order [default: http://127.0.0.1:2379]
    #[arg(long, env = "ROUTE_SYNC_ENDPOINTS", value_delimiter = ',')]
    endpoints: Option<Vec<String>>,

    /// Path under which the `/routes` directory is stored [default: /skipper]
    #[arg(long, env = "ROUTE_SYNC_STORAGE_ROOT")]
    storage_root: Option<String>,

    /// Timeout for etcd reads and writes, in milliseconds [default: 5000]
    #[arg(long, env = "ROUTE_SYNC_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, env = "ROUTE_SYNC_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load all routes, then follow changes until interrupted
    Watch,
    /// Print every stored route definition
    List {
        /// Print routes as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create or replace a route, e.g. `hello: Path("/hello") -> "http://hello"`
    Upsert {
        definition: String,
    },
    /// Delete a route by id
    Delete {
        id: String,
    },
}

impl Cli {
    fn config(&self) -> Result<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SyncConfig::default(),
        };

        if let Some(endpoints) = &self.endpoints {
            config.endpoints = endpoints.clone();
        }
        if let Some(storage_root) = &self.storage_root {
            config.storage_root = storage_root.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.request_timeout = Duration::from_millis(timeout_ms);
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<SyncConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.config()?;
    let mut client = router_etcd::connect_with(&config).context("failed to create etcd client")?;
    info!(
        "Using routes at {} on {}",
        client.routes_root(),
        config.endpoints.join(",")
    );

    match cli.command {
        Commands::Watch => {
            let table = RouteTable::new();
            tokio::select! {
                _ = sync::run(client, table.clone(), config.backoff.clone()) => {}
                signal = tokio::signal::ctrl_c() => {
                    signal.context("failed to listen for shutdown signal")?;
                    info!("Shutdown signal received, {} routes in table", table.len().await);
                }
            }
        }
        Commands::List { json } => {
            let routes = client.load_all().await.context("failed to load routes")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&routes)?);
            } else {
                for route in &routes {
                    println!("{};", route.to_definition());
                }
            }
            info!("{} routes at index {}", routes.len(), client.watermark());
        }
        Commands::Upsert { definition } => {
            let route = router_api::parse_route(&definition).context("invalid route definition")?;
            client
                .upsert(&route)
                .await
                .with_context(|| format!("failed to upsert route {}", route.id))?;
            info!("Upserted route {}", route.id);
        }
        Commands::Delete { id } => {
            client
                .delete(&id)
                .await
                .with_context(|| format!("failed to delete route {}", id))?;
            info!("Deleted route {}", id);
        }
    }

    Ok(())
}
