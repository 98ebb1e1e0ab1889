//! SensoGuard CLI
//!
//! Command-line interface for the sensor dashboard backend:
//! - Watch the live series in the terminal
//! - Serve the dashboard API
//! - Run a self-contained demo with a simulated device
//! - Generate a default config file

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sensoguard::api::{serve, ApiConfig, AppState};
use sensoguard::config::{generate_default_config, Config, LoggingConfig};
use sensoguard::source::{MemorySource, ReadingSource, SupabaseSource};
use sensoguard::sync::{SeriesSynchronizer, SyncDriver, SyncMode};
use sensoguard::view::{render_table, table_rows};

#[derive(Parser)]
#[command(name = "sensoguard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SensoGuard real-time sensor dashboard backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow the live series and print the latest readings table
    Watch {
        /// Rows to show (default from config)
        #[arg(short, long)]
        rows: Option<usize>,
    },

    /// Serve the dashboard API
    Serve,

    /// Run against an in-memory source fed by a simulated device
    Demo {
        /// Readings present before the synchronizer starts
        #[arg(long, default_value = "20")]
        seed: i64,
        /// Simulated device period in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
        /// Serve the API instead of printing the table
        #[arg(long)]
        serve: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        return write_default_config(output.as_deref());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };

    init_logging(&config.logging)?;
    tracing::info!("SensoGuard v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Watch { rows } => {
            let sync = remote_synchronizer(&config)?;
            let driver = SyncDriver::new(Arc::clone(&sync), config.retry_policy()).spawn();
            let rows = rows.unwrap_or(config.view.table_rows).max(1);

            watch(&sync, rows).await;
            shutdown(&sync, driver).await;
        }
        Commands::Serve => {
            let sync = remote_synchronizer(&config)?;
            let driver = SyncDriver::new(Arc::clone(&sync), config.retry_policy()).spawn();

            let api_config = ApiConfig::from_config(&config);
            let state = AppState::new(Arc::clone(&sync), api_config.clone());
            let result = serve(state, &api_config).await;

            shutdown(&sync, driver).await;
            result?;
        }
        Commands::Demo {
            seed,
            interval_ms,
            serve: with_api,
        } => {
            let source = Arc::new(MemorySource::new());
            for _ in 0..seed.max(0) {
                source.insert(simulated_reading(source.row_count().await)).await;
            }

            // The demo always follows inserts live
            let mut sync_config = config.sync_config()?;
            sync_config.mode = SyncMode::Push;
            let sync = Arc::new(SeriesSynchronizer::new(
                Arc::clone(&source) as Arc<dyn ReadingSource>,
                sync_config,
            ));
            let driver = SyncDriver::new(Arc::clone(&sync), config.retry_policy()).spawn();
            let device = spawn_device(Arc::clone(&source), Arc::clone(&sync), interval_ms);

            if with_api {
                let api_config = ApiConfig::from_config(&config);
                let state = AppState::new(Arc::clone(&sync), api_config.clone());
                let result = serve(state, &api_config).await;
                shutdown(&sync, driver).await;
                result?;
            } else {
                watch(&sync, config.view.table_rows.max(1)).await;
                shutdown(&sync, driver).await;
            }
            device.abort();
        }
        Commands::Config { .. } => {}
    }

    tracing::info!("SensoGuard stopped");
    Ok(())
}

/// Initialize tracing from the `[logging]` section; `RUST_LOG` wins
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("sensoguard={},tower_http=info", config.level))
    });
    let json = config.format.eq_ignore_ascii_case("json");
    let registry = tracing_subscriber::registry().with(filter);

    match (&config.file, json) {
        (Some(path), json) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            let writer = std::sync::Mutex::new(file);
            if json {
                registry.with(fmt::layer().json().with_writer(writer)).try_init()?;
            } else {
                registry
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .try_init()?;
            }
        }
        // Stdout belongs to the watch table
        (None, true) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
        (None, false) => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?,
    }

    Ok(())
}

fn write_default_config(output: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = generate_default_config();

    match output {
        Some(path) => {
            // Create parent directory if needed
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &config)?;
            println!("Config written to {:?}", path);
        }
        None => print!("{}", config),
    }
    Ok(())
}

/// Synchronizer over the configured Supabase project
fn remote_synchronizer(config: &Config) -> anyhow::Result<Arc<SeriesSynchronizer>> {
    config.validate()?;

    let source = SupabaseSource::new(config.supabase()).context("creating Supabase client")?;
    tracing::info!(
        url = %config.source.url,
        table = %config.source.table,
        "Using Supabase source"
    );

    Ok(Arc::new(SeriesSynchronizer::new(
        Arc::new(source),
        config.sync_config()?,
    )))
}

/// Print the table on every series change until Ctrl+C or teardown
async fn watch(sync: &SeriesSynchronizer, rows: usize) {
    let mut updates = sync.updates();
    let closed = sync.shutdown_token();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = closed.cancelled() => break,
            event = updates.recv() => match event {
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    let snapshot = sync.snapshot().await;
                    println!(
                        "\n[{}] {} / {} readings{}",
                        snapshot.state,
                        snapshot.len(),
                        snapshot.capacity,
                        snapshot
                            .last_error
                            .as_deref()
                            .map(|e| format!(" (error: {})", e))
                            .unwrap_or_default()
                    );
                    print!("{}", render_table(&table_rows(&snapshot.readings, rows)));
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

async fn shutdown(sync: &SeriesSynchronizer, driver: JoinHandle<()>) {
    tracing::info!("Shutting down...");
    sync.teardown().await;
    if let Err(e) = driver.await {
        tracing::error!(error = %e, "Sync driver task failed");
    }
}

/// Insert one simulated reading every `interval_ms` until the series closes
fn spawn_device(
    source: Arc<MemorySource>,
    sync: Arc<SeriesSynchronizer>,
    interval_ms: u64,
) -> JoinHandle<()> {
    let closed = sync.shutdown_token();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(10)));
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = closed.cancelled() => break,
                _ = ticker.tick() => {
                    let step = source.row_count().await;
                    let id = source.insert(simulated_reading(step)).await;
                    tracing::debug!(id, "Simulated device reading");
                }
            }
        }
    })
}

/// Smooth, deterministic sensor values for step `n`
fn simulated_reading(n: usize) -> sensoguard::RawRecord {
    let t = n as f64;
    let finger = (n / 15) % 2 == 0;

    let record = json!({
        "created_at": chrono::Utc::now().to_rfc3339(),
        "weight_g": 250.0 + 40.0 * (t / 6.0).sin(),
        "temperature_c": 36.4 + 0.4 * (t / 20.0).sin(),
        "gyro_x": 2.0 * (t / 3.0).sin(),
        "gyro_y": 2.0 * (t / 4.0).cos(),
        "gyro_z": 0.5 * (t / 5.0).sin(),
        "ir_value": if finger { 50_000 + (n % 7) as i64 * 120 } else { 1_500 },
    });

    match record {
        serde_json::Value::Object(map) => map,
        _ => sensoguard::RawRecord::new(),
    }
}
