//! # SensoGuard
//!
//! Live dashboard backend for IoT sensor readings (weight, temperature,
//! gyroscope, infrared). Storage and change notification live in a managed
//! PostgREST + Realtime backend; this crate keeps one bounded, ordered,
//! de-duplicated series in sync with it and projects that series into
//! chart and table shapes.
//!
//! ## Modules
//!
//! - [`model`]: Sensor reading shape and defensive field parsing
//! - [`source`]: Reading sources (Supabase REST + Realtime, in-memory)
//! - [`sync`]: Series synchronizer, state machine and retry driver
//! - [`view`]: Chart and table projections
//! - [`api`]: REST API server with Axum
//! - [`websocket`]: Live series streaming to dashboards
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sensoguard::source::{SupabaseConfig, SupabaseSource};
//! use sensoguard::sync::{RetryPolicy, SeriesSynchronizer, SyncConfig, SyncDriver};
//! use sensoguard::view::{render_table, table_rows};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = Arc::new(SupabaseSource::new(SupabaseConfig {
//!         url: "https://project.supabase.co".to_string(),
//!         anon_key: "public-anon-key".to_string(),
//!         ..Default::default()
//!     })?);
//!
//!     let sync = Arc::new(SeriesSynchronizer::new(source, SyncConfig::default()));
//!     let driver = SyncDriver::new(Arc::clone(&sync), RetryPolicy::default()).spawn();
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     let snapshot = sync.snapshot().await;
//!     print!("{}", render_table(&table_rows(&snapshot.readings, 10)));
//!
//!     sync.teardown().await;
//!     driver.await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod model;
pub mod source;
pub mod sync;
pub mod view;
pub mod websocket;

// Re-export top-level types for convenience
pub use model::{RawRecord, SensorReading};

pub use source::{
    MemorySource, ReadingSource, SourceError, SourceResult, Subscription, SupabaseConfig,
    SupabaseSource,
};

pub use sync::{
    InsertOutcome, LoadOutcome, RetryPolicy, SeriesEvent, SeriesSynchronizer, Snapshot,
    SyncConfig, SyncDriver, SyncError, SyncMode, SyncResult, SyncState,
};

pub use view::{chart_series, render_table, table_rows, ChartSeries, Field, Panel, TableRow};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use websocket::{ClientMessage, ConnectionHub, HubConfig, HubError, ServerMessage};

pub use config::{Config, ConfigError, LoggingConfig};
