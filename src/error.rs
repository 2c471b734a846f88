/// Errors surfaced by the indexing and search core.
///
/// Per-file failures during a sync (vanished files, permission problems,
/// undecodable content) never show up here: they are skipped and counted.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot open index '{name}': {reason} (run a full rebuild to recreate it)")]
    IndexOpen { name: String, reason: String },

    #[error("no index found for project '{0}'")]
    IndexNotFound(String),

    #[error("indexing already in progress")]
    Busy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn index_open(name: &str, reason: impl Into<String>) -> Self {
        Error::IndexOpen {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
