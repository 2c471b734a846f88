use crate::content::DEFAULT_MAX_FILE_SIZE;
use crate::index::{DEFAULT_CHUNK_LINES, DEFAULT_COMPACT_THRESHOLD, StoreConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const APP_NAME: &str = "gramdex";
const CONFIG_FILE: &str = "config.json";
const INDEXES_DIR: &str = "indexes";
const ENV_PREFIX: &str = "GRAMDEX_";

/// Application tuning stored in the app data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Lines per stored chunk
    #[serde(default = "default_chunk_lines")]
    pub chunk_lines: usize,

    /// Files larger than this are not indexed
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Cap on files returned by a file search
    #[serde(default = "default_max_file_results")]
    pub max_file_results: usize,

    /// Cap on line matches returned by a line search
    #[serde(default = "default_max_line_results")]
    pub max_line_results: usize,

    /// Minimum time between two progress events
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Segment count above which a full pass merges them
    #[serde(default = "default_compact_threshold")]
    pub compact_threshold: usize,
}

fn default_chunk_lines() -> usize {
    DEFAULT_CHUNK_LINES
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_max_file_results() -> usize {
    10_000
}

fn default_max_line_results() -> usize {
    100_000
}

fn default_progress_interval_ms() -> u64 {
    2_000
}

fn default_compact_threshold() -> usize {
    DEFAULT_COMPACT_THRESHOLD
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chunk_lines: default_chunk_lines(),
            max_file_size: default_max_file_size(),
            max_file_results: default_max_file_results(),
            max_line_results: default_max_line_results(),
            progress_interval_ms: default_progress_interval_ms(),
            compact_threshold: default_compact_threshold(),
        }
    }
}

impl AppConfig {
    /// Load config from the app data directory, or return default if not found.
    /// `GRAMDEX_*` environment variables override file values.
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).context("Failed to read config file")?;
            serde_json::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override fields from `GRAMDEX_<FIELD>` variables; unparsable values are ignored
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn read<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, field: &mut T) {
            let key = format!("{}{}", ENV_PREFIX, name);
            if let Some(raw) = lookup(&key) {
                match raw.trim().parse() {
                    Ok(value) => *field = value,
                    Err(_) => log::warn!("ignoring {}={:?}: not a number", key, raw),
                }
            }
        }

        read(&lookup, "CHUNK_LINES", &mut self.chunk_lines);
        read(&lookup, "MAX_FILE_SIZE", &mut self.max_file_size);
        read(&lookup, "MAX_FILE_RESULTS", &mut self.max_file_results);
        read(&lookup, "MAX_LINE_RESULTS", &mut self.max_line_results);
        read(&lookup, "PROGRESS_MS", &mut self.progress_interval_ms);
        read(&lookup, "COMPACT_THRESHOLD", &mut self.compact_threshold);
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            chunk_lines: self.chunk_lines,
            compact_threshold: self.compact_threshold,
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Directory holding one sub-directory per project index
pub fn default_index_dir() -> Result<PathBuf> {
    Ok(get_app_data_dir()?.join(INDEXES_DIR))
}

/// Project name derived from a root directory.
/// Format: first 16 chars of dir name + hash of the full path
pub fn project_name_for(root: &Path) -> String {
    let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let path_str = canonical.to_string_lossy();

    // Get directory name for readability
    let dir_name = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("root");

    // Hash the full path
    let mut hasher = DefaultHasher::new();
    path_str.hash(&mut hasher);
    let hash = hasher.finish();

    format!("{}-{:016x}", sanitize_name(dir_name, 16), hash)
}

/// Make a project name usable as a single directory name
pub fn sanitize_name(name: &str, max_chars: usize) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(max_chars)
        .collect();

    match sanitized.as_str() {
        "" | "." | ".." => "_".repeat(sanitized.len().max(1)),
        _ => sanitized,
    }
}
