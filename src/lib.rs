//! # gramdex - incremental n-gram index for project trees
//!
//! gramdex keeps a persistent, case-insensitive substring index of every
//! text file under a project's roots and answers short queries from it
//! without scanning the tree.
//!
//! ## Architecture
//!
//! - [`tree`] - cached directory walker producing the tracked file set
//! - [`index`] - on-disk segments of unigram/bigram postings and [`index::IndexStore`]
//! - [`indexer`] - full and incremental passes, one at a time per process
//! - [`content`] - where file text comes from (disk, or an open editor buffer)
//! - [`query`] - query parsing, candidate lookup and verification
//! - [`navigator`] - stepping through occurrences inside a selected result
//! - [`output`] - colored terminal output for the CLI
//! - [`config`] - project files: roots and exclusion patterns
//! - [`utils`] - grams, varints, patterns, app data directory
//!
//! ## Quick Start
//!
//! ```no_run
//! use gramdex::config::ProjectConfig;
//! use gramdex::content::FsContent;
//! use gramdex::indexer::Indexer;
//! use gramdex::query::{QueryEngine, SearchMode};
//! use std::path::Path;
//!
//! let config = ProjectConfig::for_directory(Path::new("/path/to/project"))?;
//! let indexer = Indexer::default();
//! indexer.full_reindex(&config, &FsContent::default(), &|_event| {})?;
//!
//! let store = indexer.session(&config)?.store(indexer.settings().store)?;
//! let results = QueryEngine::default().search(&store, "fn main", SearchMode::Lines);
//! for hit in &results.hits {
//!     for m in &hit.lines {
//!         println!("{}:{}: {}", hit.path.display(), m.line_number, m.snippet);
//!     }
//! }
//! # Ok::<(), gramdex::Error>(())
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod index;
pub mod indexer;
pub mod navigator;
pub mod output;
pub mod query;
pub mod tree;
pub mod utils;

pub use error::{Error, Result};
