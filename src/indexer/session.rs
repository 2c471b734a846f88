use crate::config::ProjectConfig;
use crate::error::Result;
use crate::index::{IndexStore, StoreConfig};
use crate::tree::DirectoryTree;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Per-project state that outlives a single indexing pass: the resolved
/// settings, the cached directory tree and the lazily opened store.
pub struct ProjectSession {
    name: String,
    config: RwLock<ProjectConfig>,
    tree: DirectoryTree,
    store: Mutex<Option<Arc<IndexStore>>>,
}

impl ProjectSession {
    pub fn new(config: ProjectConfig) -> Self {
        Self {
            name: config.project_name.clone(),
            tree: DirectoryTree::new(config.root_specs()),
            config: RwLock::new(config),
            store: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> ProjectConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn tree(&self) -> &DirectoryTree {
        &self.tree
    }

    /// Apply changed settings: new roots and patterns keep the listing
    /// cache; a different index location drops the open store.
    pub fn update_config(&self, config: &ProjectConfig) {
        let mut current = self.config.write().unwrap_or_else(|e| e.into_inner());
        if *current == *config {
            return;
        }

        if current.index_directory != config.index_directory || current.store_name() != config.store_name() {
            *self.store.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
        self.tree.set_roots(config.root_specs());
        *current = config.clone();
    }

    /// The project's store, created empty on first use
    pub fn store(&self, store_config: StoreConfig) -> Result<Arc<IndexStore>> {
        let mut slot = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }

        let config = self.config();
        let store = Arc::new(IndexStore::open_or_create(
            &config.index_directory()?,
            &config.store_name(),
            store_config,
        )?);
        *slot = Some(store.clone());
        Ok(store)
    }

    /// The project's store if one was ever built; `IndexNotFound` otherwise
    pub fn open_existing_store(&self, store_config: StoreConfig) -> Result<Arc<IndexStore>> {
        let mut slot = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }

        let config = self.config();
        let store = Arc::new(IndexStore::open(
            &config.index_directory()?,
            &config.store_name(),
            store_config,
        )?);
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Discard the stored index and start from an empty one
    pub fn recreate_store(&self, store_config: StoreConfig) -> Result<Arc<IndexStore>> {
        let mut slot = self.store.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;

        let config = self.config();
        let store = Arc::new(IndexStore::recreate(
            &config.index_directory()?,
            &config.store_name(),
            store_config,
        )?);
        *slot = Some(store.clone());
        Ok(store)
    }
}

/// Explicit per-project sessions, keyed by project name
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<FxHashMap<String, Arc<ProjectSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session for `config.project_name`, created on first use and
    /// updated with `config` otherwise
    pub fn lookup_or_create(&self, config: &ProjectConfig) -> Arc<ProjectSession> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        match sessions.get(&config.project_name) {
            Some(session) => {
                session.update_config(config);
                session.clone()
            }
            None => {
                let session = Arc::new(ProjectSession::new(config.clone()));
                sessions.insert(config.project_name.clone(), session.clone());
                session
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProjectSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Drop a session and its caches. Returns false when none was open.
    pub fn close(&self, name: &str) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .is_some()
    }

    /// Names of the open sessions, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
