//! Where file text comes from.
//!
//! The indexer and the result navigator never read files directly: they go
//! through a [`ContentSource`], which lets an embedding editor substitute the
//! text of open (possibly unsaved) buffers for what is on disk.

use crate::utils::is_binary;
use rustc_hash::FxHashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Duration;

/// Files larger than this are skipped unless configured otherwise
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// How long a reader waits for an open buffer to finish loading before
/// falling back to the file on disk
pub const BUFFER_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Reasons a file's text is unavailable. All of them mean "skip this file".
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("content is binary or not valid UTF-8")]
    Undecodable,

    #[error("file is too large ({0} bytes)")]
    TooLarge(u64),
}

/// Capability to read the current text of a file.
pub trait ContentSource: Send + Sync {
    /// Text of the file as stored on disk
    fn read_file_text(&self, path: &Path) -> Result<String, ContentError>;

    /// The editor buffer open for `path`, if any
    fn open_buffer(&self, _path: &Path) -> Option<PendingBuffer> {
        None
    }

    /// Live text: the open buffer once it has loaded, otherwise the file
    fn read_current_text(&self, path: &Path) -> Result<String, ContentError> {
        if let Some(buffer) = self.open_buffer(path) {
            match buffer.wait_timeout(BUFFER_LOAD_TIMEOUT) {
                Some(text) => return Ok(text.to_string()),
                None => log::debug!("buffer for {} did not load, reading disk", path.display()),
            }
        }
        self.read_file_text(path)
    }
}

impl<T: ContentSource + ?Sized> ContentSource for Arc<T> {
    fn read_file_text(&self, path: &Path) -> Result<String, ContentError> {
        (**self).read_file_text(path)
    }

    fn open_buffer(&self, path: &Path) -> Option<PendingBuffer> {
        (**self).open_buffer(path)
    }

    fn read_current_text(&self, path: &Path) -> Result<String, ContentError> {
        (**self).read_current_text(path)
    }
}

/// Reads text straight from the file system
#[derive(Debug, Clone, Copy)]
pub struct FsContent {
    pub max_file_size: u64,
}

impl FsContent {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }
}

impl Default for FsContent {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}

impl ContentSource for FsContent {
    fn read_file_text(&self, path: &Path) -> Result<String, ContentError> {
        let size = fs::metadata(path)?.len();
        if size > self.max_file_size {
            return Err(ContentError::TooLarge(size));
        }

        let bytes = fs::read(path)?;
        if is_binary(&bytes) {
            return Err(ContentError::Undecodable);
        }
        String::from_utf8(bytes).map_err(|_| ContentError::Undecodable)
    }
}

/// Text of an editor buffer that may still be loading.
///
/// The editor fulfills it once the buffer is ready; readers block on the
/// signal instead of polling.
#[derive(Debug, Clone, Default)]
pub struct PendingBuffer {
    state: Arc<(Mutex<Option<Arc<str>>>, Condvar)>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer whose text is already available
    pub fn loaded(text: impl Into<Arc<str>>) -> Self {
        let buffer = Self::new();
        buffer.fulfill(text);
        buffer
    }

    pub fn fulfill(&self, text: impl Into<Arc<str>>) {
        let (lock, cvar) = &*self.state;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = Some(text.into());
        cvar.notify_all();
    }

    pub fn is_loaded(&self) -> bool {
        self.state
            .0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Block until the buffer has loaded
    pub fn wait(&self) -> Arc<str> {
        let (lock, cvar) = &*self.state;
        let mut text = lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(loaded) = text.as_ref() {
                return loaded.clone();
            }
            text = cvar.wait(text).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block until the buffer has loaded or `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Arc<str>> {
        let (lock, cvar) = &*self.state;
        let text = lock.lock().unwrap_or_else(|e| e.into_inner());
        let (text, _) = cvar
            .wait_timeout_while(text, timeout, |t| t.is_none())
            .unwrap_or_else(|e| e.into_inner());
        text.clone()
    }
}

/// A content source plus the set of buffers an editor has open
#[derive(Debug, Default)]
pub struct BufferOverlay<S> {
    inner: S,
    buffers: RwLock<FxHashMap<PathBuf, PendingBuffer>>,
}

impl<S: ContentSource> BufferOverlay<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffers: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Register an open buffer, replacing any previous one for the path
    pub fn open(&self, path: impl Into<PathBuf>, buffer: PendingBuffer) {
        self.buffers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), buffer);
    }

    pub fn close(&self, path: &Path) -> bool {
        self.buffers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path)
            .is_some()
    }
}

impl<S: ContentSource> ContentSource for BufferOverlay<S> {
    fn read_file_text(&self, path: &Path) -> Result<String, ContentError> {
        self.inner.read_file_text(path)
    }

    fn open_buffer(&self, path: &Path) -> Option<PendingBuffer> {
        self.buffers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }
}
