//! Utility functions and data structures.
//!
//! This module provides shared utilities used throughout gramdex:
//!
//! ## Modules
//!
//! - [`app_data`] - Application data directory and tuning (`config.json`)
//! - [`encoding`] - Variable-length integer encoding for posting lists
//! - [`ngram`] - Case folding and 1-2 character gram keys
//! - [`pattern`] - Glob-or-suffix exclusion patterns
//! - [`progress`] - Progress bar, no-op without the `progress` feature
//!
//! ## Key Functions
//!
//! ```
//! use gramdex::utils::{bigram, extract_grams, matches};
//!
//! // Every unigram and bigram of the case-folded text
//! let grams = extract_grams("Hi");
//! assert!(grams.contains(&bigram('h', 'i')));
//!
//! // Exclusion: shell glob or plain suffix
//! assert!(matches("build/out.o", &["*.o"]));
//! assert!(matches("src/target", &["target"]));
//! ```

pub mod app_data;
pub mod encoding;
pub mod ngram;
pub mod pattern;
pub mod progress;

pub use app_data::*;
pub use encoding::*;
pub use ngram::*;
pub use pattern::{PatternSet, matches};
