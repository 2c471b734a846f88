//! Query layer: short user input to index lookups.
//!
//! A single character is a prefix lookup (every document containing it); a
//! longer input is a phrase lookup (bigram intersection, then verification
//! against the stored text).

pub mod engine;
pub mod lines;

pub use engine::{QueryEngine, ResultItem, SearchHit, SearchResults};
pub use lines::{LineMatch, contains_folded, find_line_matches};

use crate::utils::{AppConfig, fold_char, fold_text};

/// Parsed form of the user's input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexQuery {
    /// Empty input: no results
    Empty,
    /// Exactly one char, already case-folded
    Prefix(char),
    /// Two or more chars, already case-folded
    Phrase(String),
}

impl IndexQuery {
    pub fn from_input(input: &str) -> Self {
        let mut chars = input.chars();
        match (chars.next(), chars.next()) {
            (None, _) => IndexQuery::Empty,
            (Some(c), None) => IndexQuery::Prefix(fold_char(c)),
            _ => IndexQuery::Phrase(fold_text(input)),
        }
    }

    /// The folded text to look for in document contents
    pub fn needle(&self) -> String {
        match self {
            IndexQuery::Empty => String::new(),
            IndexQuery::Prefix(c) => c.to_string(),
            IndexQuery::Phrase(text) => text.clone(),
        }
    }
}

/// Whether results are whole files or individual lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Files,
    Lines,
}

/// Result caps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub max_file_results: usize,
    pub max_line_results: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_file_results: 10_000,
            max_line_results: 100_000,
        }
    }
}

impl From<&AppConfig> for QueryLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_file_results: config.max_file_results,
            max_line_results: config.max_line_results,
        }
    }
}
