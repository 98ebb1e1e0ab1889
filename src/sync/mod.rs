//! Series Synchronization
//!
//! Reconciles one bulk load with an unbounded stream of insert
//! notifications into a single bounded, ordered, de-duplicated series.
//!
//! ## Architecture
//!
//! - **SeriesBuffer**: latest-N readings, ascending by id
//! - **SeriesSynchronizer**: state machine around the buffer
//!   (`Idle → Loading → Live → Error | Live`, terminal `Closed`)
//! - **SyncDriver**: caller-side loop choosing push or poll and owning retries
//!
//! ## Data Flow
//!
//! 1. Driver opens the change subscription (push mode)
//! 2. Synchronizer bulk-loads the latest N rows and goes live
//! 3. Inserts queued during the load are replayed, duplicates dropped
//! 4. Each further insert appends and evicts the oldest reading past N

mod buffer;
mod driver;
mod error;
mod state;
mod synchronizer;

pub use buffer::{BufferInsert, SeriesBuffer};
pub use driver::{RetryPolicy, SyncDriver};
pub use error::{SyncError, SyncResult};
pub use state::{InsertOutcome, LoadOutcome, SeriesEvent, Snapshot, SyncState};
pub use synchronizer::{SeriesSynchronizer, SyncConfig, SyncMode};
