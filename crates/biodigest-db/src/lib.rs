//! biodigest history ledger
//!
//! Tracks which `(canonical_id, version)` pairs earlier runs have already
//! processed, plus a log of runs and named metrics.
//!
//! # Backends
//!
//! - [`InMemoryLedger`]: process-local, used by tests and dry runs
//! - [`JsonFileLedger`]: a single JSON document on disk, loaded once at
//!   start-up and written back once at the end of a successful run
//!
//! # Example
//!
//! ```rust,no_run
//! use biodigest_db::{HistoryLedger, JsonFileLedger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ledger = JsonFileLedger::open("./data/ledger.json").await?;
//!     if !ledger.has_seen("arxiv:2501.00001", 2).await? {
//!         // process the paper ...
//!     }
//!     ledger.flush().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod ledger;
pub mod json_store;
pub mod runs;

pub use error::{DbError, Result};
pub use ledger::{HistoryLedger, InMemoryLedger, LedgerEntry, LedgerMetadata, LedgerState};
pub use json_store::JsonFileLedger;
pub use runs::{MetricRecord, RunRecord};
