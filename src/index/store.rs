//! Segment-based persistent index.
//!
//! Layout of one store:
//!
//! ```text
//! <index_directory>/<name>/
//!   meta.json          generation, schema, live segments and their tombstones
//!   seg-000003/        immutable segment written by generation 3
//!   seg-000007/        ...
//! ```
//!
//! A commit writes only the records it adds, as one new segment, and marks
//! the paths it replaces or removes as tombstones in `meta.json`. The new
//! `meta.json` then replaces the old one with a rename, so a crash leaves
//! either the old or the new state visible, never a mix. Full passes merge
//! the segments back into one once there are too many or too much of them
//! is tombstoned.

use crate::content::{ContentError, ContentSource};
use crate::error::{Error, Result};
use crate::index::reader::Snapshot;
use crate::index::types::*;
use crate::index::writer::{SegmentSummary, SegmentWriter};
use crate::utils::{Gram, extract_grams, path_to_bytes};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

const META_FILE: &str = "meta.json";
const META_TMP_FILE: &str = "meta.json.tmp";
const SEGMENT_PREFIX: &str = "seg-";

/// Counters of one `sync_paths` pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Paths looked at
    pub processed: usize,
    /// Paths whose text was (re)stored
    pub reindexed: usize,
    /// Paths whose stored stamp still matched
    pub unchanged: usize,
    /// Paths that could not be stat'ed or read
    pub skipped: usize,
    /// Indexed paths dropped because they are no longer tracked
    pub removed: usize,
}

/// Result of re-indexing a single path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// New text stored
    Updated,
    /// Stored stamp still matches the file
    Unchanged,
    /// File could not be read; any stale chunks were dropped
    Skipped,
    /// Path is not part of the project's tracked files
    Untracked,
}

/// What the parallel read phase of a sync found for one path
enum Fetched {
    Unchanged,
    Changed(FileRecord),
    /// Unreadable now; `drop_stale` when the stored text is known to be outdated
    Skipped { drop_stale: bool },
}

/// Persistent path -> chunks mapping with snapshot reads and a single writer
pub struct IndexStore {
    index_path: PathBuf,
    name: String,
    config: StoreConfig,
    current: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
}

impl IndexStore {
    /// Open an existing store; a missing one is `IndexNotFound`
    pub fn open(index_dir: &Path, name: &str, config: StoreConfig) -> Result<Self> {
        check_name(name)?;
        let index_path = index_dir.join(name);
        if !index_path.join(META_FILE).exists() {
            return Err(Error::IndexNotFound(name.to_string()));
        }

        let meta = read_meta(&index_path, name)?;
        let snapshot = open_snapshot(&index_path, name, meta, None)?;
        log::debug!(
            "opened index '{}' at generation {} ({} documents)",
            name,
            snapshot.generation(),
            snapshot.doc_count()
        );

        Ok(Self::with_snapshot(index_path, name, config, snapshot))
    }

    /// Open the store, creating an empty one when none exists
    pub fn open_or_create(index_dir: &Path, name: &str, config: StoreConfig) -> Result<Self> {
        check_name(name)?;
        if Self::exists(index_dir, name) {
            return Self::open(index_dir, name, config);
        }

        let index_path = index_dir.join(name);
        fs::create_dir_all(&index_path)?;
        let meta = IndexMeta::new(name, unix_now());
        write_meta(&index_path, &meta)?;
        log::info!("created index '{}' in {}", name, index_path.display());

        Ok(Self::with_snapshot(index_path, name, config, Snapshot::empty(meta)))
    }

    /// Throw away whatever is stored under `name` and start empty
    pub fn recreate(index_dir: &Path, name: &str, config: StoreConfig) -> Result<Self> {
        check_name(name)?;
        let index_path = index_dir.join(name);
        if index_path.exists() {
            fs::remove_dir_all(&index_path)?;
            log::info!("discarded index '{}'", name);
        }
        Self::open_or_create(index_dir, name, config)
    }

    pub fn exists(index_dir: &Path, name: &str) -> bool {
        index_dir.join(name).join(META_FILE).exists()
    }

    fn with_snapshot(index_path: PathBuf, name: &str, config: StoreConfig, snapshot: Snapshot) -> Self {
        Self {
            index_path,
            name: name.to_string(),
            config,
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// The current committed state; unaffected by later commits
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Pick up a generation committed by another process.
    /// Returns true when the snapshot changed.
    pub fn reload(&self) -> Result<bool> {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        self.refresh()
    }

    /// Caller holds the writer lock
    fn refresh(&self) -> Result<bool> {
        let meta = read_meta(&self.index_path, &self.name)?;
        let current = self.snapshot();
        if meta.generation == current.generation() {
            return Ok(false);
        }
        log::debug!(
            "index '{}' moved from generation {} to {}",
            self.name,
            current.generation(),
            meta.generation
        );
        let snapshot = open_snapshot(&self.index_path, &self.name, meta, Some(&current))?;
        self.swap(snapshot);
        Ok(true)
    }

    /// Start the writer transaction; blocks while another one is open.
    ///
    /// The transaction starts from the latest generation on disk, so a commit
    /// made by another process since this store was opened is built upon
    /// rather than overwritten.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        self.refresh()?;
        Ok(Transaction {
            store: self,
            _guard: guard,
            base: self.snapshot(),
            deleted: FxHashSet::default(),
            added: BTreeMap::new(),
            compact: false,
        })
    }

    /// Merge every segment into one, dropping tombstoned documents.
    /// Returns false when there was nothing to merge.
    pub fn compact(&self) -> Result<bool> {
        let mut tx = self.begin()?;
        tx.compact();
        tx.commit()
    }

    /// Bring the stored state of `paths` up to date in one transaction.
    ///
    /// With `remove_stale`, indexed paths missing from `paths` are dropped.
    /// `progress` is called with the running count of processed paths.
    pub fn sync_paths(
        &self,
        paths: &[PathBuf],
        remove_stale: bool,
        content: &dyn ContentSource,
        progress: &(dyn Fn(usize) + Sync),
    ) -> Result<SyncReport> {
        let mut tx = self.begin()?;
        let mut report = SyncReport::default();

        if remove_stale {
            let wanted: FxHashSet<&Path> = paths.iter().map(PathBuf::as_path).collect();
            for path in tx.indexed_paths() {
                if !wanted.contains(path.as_path()) && tx.delete_path(&path) {
                    report.removed += 1;
                }
            }
        }

        let base = tx.base.clone();
        let chunk_lines = self.config.chunk_lines;
        let done = AtomicUsize::new(0);

        let fetched: Vec<Fetched> = paths
            .par_iter()
            .map(|path| {
                let result = fetch(path, base.stamp(path), content, chunk_lines);
                progress(done.fetch_add(1, Ordering::Relaxed) + 1);
                result
            })
            .collect();

        for (path, fetched) in paths.iter().zip(fetched) {
            report.processed += 1;
            match fetched {
                Fetched::Unchanged => report.unchanged += 1,
                Fetched::Changed(record) => {
                    tx.add_record(record);
                    report.reindexed += 1;
                }
                Fetched::Skipped { drop_stale } => {
                    if drop_stale {
                        tx.delete_path(path);
                    }
                    report.skipped += 1;
                }
            }
        }

        if remove_stale && tx.has_changes() && self.fragmented(&tx.base) {
            tx.compact();
        }

        tx.commit()?;
        Ok(report)
    }

    /// Re-index exactly one path, preferring its open buffer's text.
    ///
    /// Writes a segment holding only this file and tombstones its old chunks;
    /// the rest of the index is left alone.
    pub fn update_single(&self, path: &Path, content: &dyn ContentSource) -> Result<UpdateOutcome> {
        if path_to_bytes(path).is_none() {
            log::debug!("not indexing {}: path cannot be stored", path.display());
            return Ok(UpdateOutcome::Skipped);
        }
        let mut tx = self.begin()?;

        let stamp = match fs::metadata(path) {
            Ok(meta) => FileStamp::from_metadata(&meta),
            Err(e) => {
                log::debug!("skipping {}: {}", path.display(), e);
                return Ok(UpdateOutcome::Skipped);
            }
        };
        if tx.stored_stamp(path) == Some(stamp) {
            return Ok(UpdateOutcome::Unchanged);
        }

        let outcome = match content.read_current_text(path) {
            Ok(text) => {
                tx.add_record(FileRecord::from_text(
                    path.to_path_buf(),
                    stamp,
                    &text,
                    self.config.chunk_lines,
                ));
                UpdateOutcome::Updated
            }
            Err(e) => {
                log::debug!("skipping {}: {}", path.display(), e);
                tx.delete_path(path);
                UpdateOutcome::Skipped
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Too many segments, or more tombstoned documents than live ones
    fn fragmented(&self, snapshot: &Snapshot) -> bool {
        snapshot.segments().len() > self.config.compact_threshold.max(1)
            || snapshot.dead_doc_count() > snapshot.doc_count()
    }

    fn segment_dir(&self, id: SegmentId) -> PathBuf {
        self.index_path.join(segment_dir_name(id))
    }

    fn swap(&self, snapshot: Snapshot) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(snapshot);
    }

    /// Remove every segment directory `meta` does not list
    fn remove_unreferenced_segments(&self, meta: &IndexMeta) {
        let entries = match fs::read_dir(&self.index_path) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("cannot list {}: {}", self.index_path.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let id = name
                .to_str()
                .and_then(|n| n.strip_prefix(SEGMENT_PREFIX))
                .and_then(|n| n.parse::<SegmentId>().ok());
            match id {
                Some(id) if !meta.segments.iter().any(|s| s.id == id) => {
                    if let Err(e) = fs::remove_dir_all(entry.path()) {
                        log::warn!("failed to remove {}: {}", entry.path().display(), e);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Stat and, when stale, read one path
fn fetch(
    path: &Path,
    stored: Option<FileStamp>,
    content: &dyn ContentSource,
    chunk_lines: usize,
) -> Fetched {
    if path_to_bytes(path).is_none() {
        log::debug!("not indexing {}: path cannot be stored", path.display());
        return Fetched::Skipped { drop_stale: false };
    }
    let stamp = match fs::metadata(path) {
        Ok(meta) => FileStamp::from_metadata(&meta),
        Err(e) => {
            log::debug!("skipping {}: {}", path.display(), e);
            return Fetched::Skipped {
                drop_stale: e.kind() == io::ErrorKind::NotFound,
            };
        }
    };
    if stored == Some(stamp) {
        return Fetched::Unchanged;
    }

    match content.read_file_text(path) {
        Ok(text) => Fetched::Changed(FileRecord::from_text(
            path.to_path_buf(),
            stamp,
            &text,
            chunk_lines,
        )),
        Err(ContentError::Io(e)) => {
            log::debug!("skipping {}: {}", path.display(), e);
            Fetched::Skipped {
                drop_stale: e.kind() == io::ErrorKind::NotFound,
            }
        }
        Err(e) => {
            log::debug!("not indexing {}: {}", path.display(), e);
            Fetched::Skipped { drop_stale: true }
        }
    }
}

/// Pending changes against one base snapshot.
///
/// Holds the store's writer lock. Dropping it without [`commit`] discards
/// every change.
///
/// [`commit`]: Transaction::commit
pub struct Transaction<'a> {
    store: &'a IndexStore,
    _guard: MutexGuard<'a, ()>,
    base: Arc<Snapshot>,
    /// Base paths whose chunks are dropped
    deleted: FxHashSet<PathBuf>,
    /// Records written by this transaction
    added: BTreeMap<PathBuf, FileRecord>,
    /// Merge all segments into the one this commit writes
    compact: bool,
}

impl Transaction<'_> {
    /// The snapshot this transaction started from
    pub fn base(&self) -> &Arc<Snapshot> {
        &self.base
    }

    /// Stamp of a path as it will be after commit
    pub fn stored_stamp(&self, path: &Path) -> Option<FileStamp> {
        if let Some(record) = self.added.get(path) {
            return Some(record.stamp);
        }
        if self.deleted.contains(path) {
            return None;
        }
        self.base.stamp(path)
    }

    /// Paths that will be indexed after commit
    pub fn indexed_paths(&self) -> Vec<PathBuf> {
        self.base
            .indexed_paths()
            .into_iter()
            .filter(|p| !self.deleted.contains(*p) && !self.added.contains_key(*p))
            .map(Path::to_path_buf)
            .chain(self.added.keys().cloned())
            .collect()
    }

    /// Drop every chunk of `path`. Returns false when nothing was stored.
    pub fn delete_path(&mut self, path: &Path) -> bool {
        let was_added = self.added.remove(path).is_some();
        let was_stored = self.base.contains(path) && self.deleted.insert(path.to_path_buf());
        was_added || was_stored
    }

    /// Store a record, replacing all chunks previously stored for its path
    pub fn add_record(&mut self, mut record: FileRecord) {
        if record.chunks.is_empty() {
            record.chunks.push(Chunk {
                line_offset: 0,
                text: String::new(),
            });
        }
        if self.base.contains(&record.path) {
            self.deleted.insert(record.path.clone());
        }
        self.added.insert(record.path.clone(), record);
    }

    pub fn has_changes(&self) -> bool {
        !self.deleted.is_empty() || !self.added.is_empty()
    }

    /// Also merge every segment into one on commit
    pub fn compact(&mut self) {
        self.compact = true;
    }

    /// Write the new segment and tombstones and make them current.
    /// Returns false (and writes nothing) when there was nothing to do.
    pub fn commit(self) -> Result<bool> {
        let base = &self.base;
        let compacting = self.compact && (base.segments().len() > 1 || base.dead_doc_count() > 0);
        if !self.has_changes() && !compacting {
            return Ok(false);
        }

        let store = self.store;
        let generation = base.generation() + 1;
        let mut meta = base.meta().clone();
        meta.generation = generation;
        meta.updated_at = unix_now();

        // Live totals after this commit
        let mut doc_count = base.doc_count();
        for path in &self.deleted {
            if let Some((segment, path_id)) = base.locate(path) {
                doc_count -= base.segments()[segment].file_docs(path_id).len();
            }
        }
        doc_count += self.added.values().map(|r| r.chunks.len()).sum::<usize>();
        let file_count = base.file_count() - self.deleted.len() + self.added.len();

        let written = if compacting {
            meta.segments.clear();
            Some(self.write_compacted(store.segment_dir(generation))?)
        } else {
            for path in &self.deleted {
                if let Some((segment, path_id)) = base.locate(path) {
                    meta.segments[segment].deleted.push(path_id);
                }
            }
            for segment in &mut meta.segments {
                segment.deleted.sort_unstable();
                segment.deleted.dedup();
            }
            // A segment with nothing live left needs no rewrite to go away
            meta.segments
                .retain(|segment| segment.deleted.len() < segment.file_count as usize);

            if self.added.is_empty() {
                None
            } else {
                let mut writer = SegmentWriter::create(&store.segment_dir(generation))?;
                add_records(&mut writer, self.added.values())?;
                Some(writer.finish()?)
            }
        };

        if let Some(summary) = written {
            if summary.file_count > 0 {
                meta.segments
                    .push(SegmentMeta::new(generation, summary.doc_count, summary.file_count));
            }
        }
        meta.doc_count = doc_count as u32;
        meta.file_count = file_count as u32;

        let snapshot = open_snapshot(&store.index_path, &store.name, meta.clone(), Some(base))?;
        write_meta(&store.index_path, &meta)?;
        store.swap(snapshot);
        store.remove_unreferenced_segments(&meta);

        log::info!(
            "index '{}' committed generation {}: {} files, {} documents in {} segments ({} added, {} dropped{})",
            store.name,
            generation,
            meta.file_count,
            meta.doc_count,
            meta.segments.len(),
            self.added.len(),
            self.deleted.len(),
            if compacting { ", compacted" } else { "" }
        );
        Ok(true)
    }

    /// Write every live document of the base plus the added records as one segment
    fn write_compacted(&self, seg_dir: PathBuf) -> Result<SegmentSummary> {
        let base = &self.base;
        let mut writer = SegmentWriter::create(&seg_dir)?;

        for (idx, segment) in base.segments().iter().enumerate() {
            // Copy text of untouched live files, then remap their postings
            let mut remap: Vec<Option<DocId>> = vec![None; segment.doc_count()];
            for (path_id, path) in segment.paths().iter().enumerate() {
                let path_id = path_id as PathId;
                if base.locate(path) != Some((idx, path_id)) || self.deleted.contains(path) {
                    continue;
                }
                let new_path_id = writer.add_path(path);
                for doc_id in segment.file_docs(path_id) {
                    let doc = &segment.documents()[doc_id as usize];
                    let text = segment.data_bytes(doc).ok_or_else(|| {
                        Error::index_open(&self.store.name, format!("text of document {} is missing", doc_id))
                    })?;
                    let new_id = writer.add_chunk(new_path_id, doc.stamp(), doc.line_offset, text, &[])?;
                    remap[doc_id as usize] = Some(new_id);
                }
            }
            for (gram, doc_ids) in segment.gram_postings() {
                writer.extend_postings(
                    gram,
                    doc_ids
                        .into_iter()
                        .filter_map(|id| remap.get(id as usize).copied().flatten()),
                );
            }
        }

        add_records(&mut writer, self.added.values())?;
        Ok(writer.finish()?)
    }
}

/// Append fresh records, extracting their grams in parallel
fn add_records<'r>(
    writer: &mut SegmentWriter,
    records: impl Iterator<Item = &'r FileRecord>,
) -> io::Result<()> {
    let records: Vec<&FileRecord> = records.collect();
    let grams: Vec<Vec<Vec<Gram>>> = records
        .par_iter()
        .map(|record| record.chunks.iter().map(|c| extract_grams(&c.text)).collect())
        .collect();

    for (record, chunk_grams) in records.iter().zip(&grams) {
        let path_id = writer.add_path(&record.path);
        for (chunk, grams) in record.chunks.iter().zip(chunk_grams) {
            writer.add_chunk(path_id, record.stamp, chunk.line_offset, chunk.text.as_bytes(), grams)?;
        }
    }
    Ok(())
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::Config(format!("invalid index name '{}'", name)));
    }
    Ok(())
}

fn read_meta(index_path: &Path, name: &str) -> Result<IndexMeta> {
    let file = File::open(index_path.join(META_FILE))?;
    let meta: IndexMeta = serde_json::from_reader(io::BufReader::new(file))
        .map_err(|e| Error::index_open(name, format!("unreadable meta.json: {}", e)))?;
    if let Some(reason) = meta.incompatibility() {
        return Err(Error::index_open(name, reason));
    }
    if meta.name != name {
        return Err(Error::index_open(
            name,
            format!("directory holds the index of '{}'", meta.name),
        ));
    }
    Ok(meta)
}

/// Replace meta.json atomically: write a temp file, then rename over
fn write_meta(index_path: &Path, meta: &IndexMeta) -> Result<()> {
    let tmp_path = index_path.join(META_TMP_FILE);
    let mut file = File::create(&tmp_path)?;
    serde_json::to_writer_pretty(&mut file, meta)?;
    file.flush()?;
    file.sync_all()?;
    fs::rename(&tmp_path, index_path.join(META_FILE))?;
    Ok(())
}

fn open_snapshot(index_path: &Path, name: &str, meta: IndexMeta, previous: Option<&Snapshot>) -> Result<Snapshot> {
    if meta.segments.is_empty() && meta.doc_count == 0 && meta.file_count == 0 {
        return Ok(Snapshot::empty(meta));
    }
    Snapshot::open_reusing(index_path, meta, previous).map_err(|e| Error::index_open(name, format!("{:#}", e)))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
