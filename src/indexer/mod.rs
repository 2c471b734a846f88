//! Indexing passes over a project's tracked files.
//!
//! An [`Indexer`] owns the per-project sessions and a single busy flag: at
//! most one pass (full or incremental) runs at a time, and a second request
//! while one is running is rejected with [`Error::Busy`] instead of queued.

pub mod session;

pub use session::{ProjectSession, SessionRegistry};

use crate::config::ProjectConfig;
use crate::content::ContentSource;
use crate::error::{Error, Result};
use crate::index::{IndexStore, StoreConfig, SyncReport, UpdateOutcome};
use crate::utils::AppConfig;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callback receiving indexing events; called from worker threads
pub type EventObserver = dyn Fn(&IndexEvent) + Send + Sync;

/// Running count of a full pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexProgress {
    /// Paths processed so far
    pub found: usize,
    /// Paths the pass will process
    pub total: usize,
}

impl fmt::Display for IndexProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "found={}/total={}", self.found, self.total)
    }
}

/// Lifecycle of a full pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    Started { project: String, total: usize },
    Progress(IndexProgress),
    Finished {
        project: String,
        report: SyncReport,
        elapsed: Duration,
    },
}

/// Tuning of indexing passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexerSettings {
    pub store: StoreConfig,
    /// Minimum time between two `Progress` events
    pub progress_interval: Duration,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            progress_interval: Duration::from_secs(2),
        }
    }
}

impl From<&AppConfig> for IndexerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            store: config.store_config(),
            progress_interval: config.progress_interval(),
        }
    }
}

/// Holds the busy flag for one pass; releases it on drop, also on error
pub struct IndexingGuard {
    flag: Arc<AtomicBool>,
    status: Arc<Mutex<Option<IndexProgress>>>,
}

impl Drop for IndexingGuard {
    fn drop(&mut self) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.flag.store(false, Ordering::Release);
    }
}

/// Entry point for full and incremental indexing
pub struct Indexer {
    sessions: SessionRegistry,
    in_progress: Arc<AtomicBool>,
    status: Arc<Mutex<Option<IndexProgress>>>,
    settings: IndexerSettings,
}

impl Default for Indexer {
    fn default() -> Self {
        Self::new(IndexerSettings::default())
    }
}

impl Indexer {
    pub fn new(settings: IndexerSettings) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            in_progress: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(None)),
            settings,
        }
    }

    pub fn settings(&self) -> IndexerSettings {
        self.settings
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Session for a project, created or updated from `config`
    pub fn session(&self, config: &ProjectConfig) -> Result<Arc<ProjectSession>> {
        config.validate()?;
        Ok(self.sessions.lookup_or_create(config))
    }

    pub fn is_indexing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Progress of the running full pass, if any
    pub fn status(&self) -> Option<IndexProgress> {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the busy flag, or fail with `Busy` when a pass is running
    pub fn try_claim(&self) -> Result<IndexingGuard> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        Ok(IndexingGuard {
            flag: self.in_progress.clone(),
            status: self.status.clone(),
        })
    }

    /// Walk the project and bring its index in line with the file system
    pub fn full_reindex(
        &self,
        config: &ProjectConfig,
        content: &dyn ContentSource,
        observer: &(dyn Fn(&IndexEvent) + Send + Sync + '_),
    ) -> Result<SyncReport> {
        let guard = self.try_claim()?;
        self.run_full(guard, config, content, observer, false)
    }

    /// Recreate the index from scratch, then run a full pass.
    ///
    /// This is the recovery path for an index that cannot be opened.
    pub fn rebuild(
        &self,
        config: &ProjectConfig,
        content: &dyn ContentSource,
        observer: &(dyn Fn(&IndexEvent) + Send + Sync + '_),
    ) -> Result<SyncReport> {
        let guard = self.try_claim()?;
        self.run_full(guard, config, content, observer, true)
    }

    /// Full pass on a background thread. The busy flag is claimed before
    /// returning, so a `Busy` error is reported to the caller directly.
    pub fn spawn_full_reindex(
        self: &Arc<Self>,
        config: ProjectConfig,
        content: Arc<dyn ContentSource>,
        observer: Arc<EventObserver>,
    ) -> Result<JoinHandle<Result<SyncReport>>> {
        let guard = self.try_claim()?;
        let indexer = Arc::clone(self);

        let handle = thread::Builder::new()
            .name("gramdex-indexer".to_string())
            .spawn(move || indexer.run_full(guard, &config, content.as_ref(), observer.as_ref(), false))?;
        Ok(handle)
    }

    /// Re-index one saved file. Never removes other entries.
    pub fn incremental_update(
        &self,
        config: &ProjectConfig,
        path: &Path,
        content: &dyn ContentSource,
    ) -> Result<UpdateOutcome> {
        let _guard = self.try_claim()?;
        let session = self.session(config)?;

        if !session.tree().is_tracked(path) {
            log::debug!("{} is not tracked by '{}'", path.display(), session.name());
            return Ok(UpdateOutcome::Untracked);
        }

        let store = session.store(self.settings.store)?;
        let outcome = store.update_single(path, content)?;
        log::info!("updated {}: {:?}", path.display(), outcome);
        Ok(outcome)
    }

    fn run_full(
        &self,
        _guard: IndexingGuard,
        config: &ProjectConfig,
        content: &dyn ContentSource,
        observer: &(dyn Fn(&IndexEvent) + Send + Sync + '_),
        rebuild: bool,
    ) -> Result<SyncReport> {
        let started = Instant::now();
        let session = self.session(config)?;
        let store: Arc<IndexStore> = if rebuild {
            session.recreate_store(self.settings.store)?
        } else {
            session.store(self.settings.store)?
        };

        let tracked = session.tree().items();
        let total = tracked.len();
        let project = session.name().to_string();

        log::info!("indexing '{}': {} tracked files", project, total);
        self.set_status(IndexProgress { found: 0, total });
        observer(&IndexEvent::Started {
            project: project.clone(),
            total,
        });

        let last_emit = Mutex::new(Instant::now());
        let interval = self.settings.progress_interval;
        let progress = |found: usize| {
            let current = IndexProgress { found, total };
            self.set_status(current);
            // Another worker emitting right now covers this tick
            if let Ok(mut last) = last_emit.try_lock() {
                if last.elapsed() >= interval {
                    *last = Instant::now();
                    observer(&IndexEvent::Progress(current));
                }
            }
        };

        let report = store.sync_paths(tracked.paths(), true, content, &progress)?;

        let done = IndexProgress {
            found: report.processed,
            total,
        };
        self.set_status(done);
        observer(&IndexEvent::Progress(done));

        let elapsed = started.elapsed();
        log::info!(
            "indexed '{}' in {:.2?}: {} reindexed, {} unchanged, {} skipped, {} removed",
            project,
            elapsed,
            report.reindexed,
            report.unchanged,
            report.skipped,
            report.removed
        );
        observer(&IndexEvent::Finished {
            project,
            report,
            elapsed,
        });
        Ok(report)
    }

    fn set_status(&self, progress: IndexProgress) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = Some(progress);
    }
}
