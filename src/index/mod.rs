//! On-disk n-gram index.
//!
//! - [`types`] - records, chunks, the fixed-size document table entry and `meta.json`
//! - [`writer`] - writes one immutable segment directory
//! - [`reader`] - mmapped [`Segment`]s and the read-only [`Snapshot`] over them
//! - [`store`] - [`IndexStore`]: snapshots, transactions, compaction and file syncing
//! - [`stats`] - human-readable index summaries for the CLI

pub mod reader;
pub mod stats;
pub mod store;
pub mod types;
pub mod writer;

pub use reader::{Segment, Snapshot};
pub use store::{IndexStore, SyncReport, Transaction, UpdateOutcome};
pub use types::*;
pub use writer::{SegmentSummary, SegmentWriter};
