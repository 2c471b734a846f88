use crate::index::types::*;
use crate::index::writer::{
    DATA_FILE, DICT_ENTRY_SIZE, DICT_FILE, DOCS_FILE, PATHS_FILE, POSTINGS_FILE,
};
use crate::utils::{Gram, delta_decode, path_from_bytes, read_u32_at, read_u64_at};
use anyhow::{Context, Result, bail};
use memmap2::Mmap;
use rayon::prelude::*;
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::ops::{Range, RangeInclusive};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Gram dictionary entry
#[derive(Debug, Clone, Copy)]
struct GramDictEntry {
    gram: Gram,
    offset: u64,
    length: u32,
    doc_freq: u32,
}

/// Gram dictionary, sorted by key
#[derive(Debug, Default)]
struct GramDict {
    entries: Vec<GramDictEntry>,
}

impl GramDict {
    fn lookup(&self, gram: Gram) -> Option<&GramDictEntry> {
        self.entries
            .binary_search_by_key(&gram, |e| e.gram)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Entries whose key falls into `range`
    fn range(&self, range: &RangeInclusive<Gram>) -> &[GramDictEntry] {
        let start = self.entries.partition_point(|e| e.gram < *range.start());
        let end = self.entries.partition_point(|e| e.gram <= *range.end());
        &self.entries[start..end.max(start)]
    }
}

/// One immutable segment directory, opened read-only. Ids are local.
pub struct Segment {
    id: SegmentId,
    documents: Vec<DocEntry>,
    paths: Vec<PathBuf>,
    /// Contiguous doc id range of each path, indexed by path id
    path_docs: Vec<Range<DocId>>,
    dict: GramDict,
    /// `None` when the segment holds no text
    data: Option<Mmap>,
    postings: Option<Mmap>,
}

impl Segment {
    /// Open a segment directory and check it against its meta.json entry
    pub fn open(seg_dir: &Path, meta: &SegmentMeta) -> Result<Self> {
        if !seg_dir.is_dir() {
            bail!("segment directory {} is missing", seg_dir.display());
        }

        let (documents, (paths, dict)) = rayon::join(
            || read_documents(seg_dir),
            || rayon::join(|| read_paths(seg_dir), || read_gram_dict(seg_dir)),
        );
        let documents = documents?;
        let paths = paths?;
        let dict = dict?;

        let data = map_file(&seg_dir.join(DATA_FILE))?;
        let postings = map_file(&seg_dir.join(POSTINGS_FILE))?;
        let data_len = data.as_ref().map_or(0, |m| m.len() as u64);

        let path_docs = path_ranges(&documents, paths.len(), data_len)?;

        if documents.len() as u64 != meta.doc_count as u64 || paths.len() as u64 != meta.file_count as u64 {
            bail!(
                "meta.json lists {} documents in {} files for segment {} but it holds {} in {}",
                meta.doc_count,
                meta.file_count,
                meta.id,
                documents.len(),
                paths.len()
            );
        }

        Ok(Self {
            id: meta.id,
            documents,
            paths,
            path_docs,
            dict,
            data,
            postings,
        })
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn doc_count(&self) -> usize {
        self.documents.len()
    }

    pub fn file_count(&self) -> usize {
        self.paths.len()
    }

    pub fn documents(&self) -> &[DocEntry] {
        &self.documents
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Doc ids holding the chunks of a path
    pub fn file_docs(&self, path_id: PathId) -> Range<DocId> {
        self.path_docs.get(path_id as usize).cloned().unwrap_or(0..0)
    }

    pub(crate) fn data_bytes(&self, doc: &DocEntry) -> Option<&[u8]> {
        let start = doc.data_offset as usize;
        let end = start + doc.data_len as usize;
        match &self.data {
            Some(data) => data.get(start..end),
            None if doc.data_len == 0 => Some(&[]),
            None => None,
        }
    }

    /// Every gram with its decoded postings, in key order
    pub fn gram_postings(&self) -> impl Iterator<Item = (Gram, Vec<DocId>)> + '_ {
        self.dict
            .entries
            .iter()
            .map(|entry| (entry.gram, self.decode_postings(entry)))
    }

    fn decode_postings(&self, entry: &GramDictEntry) -> Vec<DocId> {
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        self.postings
            .as_ref()
            .and_then(|p| p.get(start..end))
            .map(delta_decode)
            .unwrap_or_default()
    }
}

/// Where a live path is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileLocation {
    segment: usize,
    path_id: PathId,
}

/// The committed state of a store at one generation, opened read-only.
///
/// Segments are laid end to end: the global id of a document is its local id
/// plus the number of documents in the segments before it, and likewise for
/// paths. Tombstoned documents never show up in lookups.
///
/// A snapshot never changes after it is opened; the store swaps in a new one
/// on commit while readers keep the old `Arc` alive.
pub struct Snapshot {
    meta: IndexMeta,
    segments: Vec<Arc<Segment>>,
    /// First global doc id of each segment, plus the total at the end
    doc_bases: Vec<DocId>,
    /// First global path id of each segment, plus the total at the end
    path_bases: Vec<PathId>,
    /// Global doc ids masked by tombstones
    dead: RoaringBitmap,
    /// Live path -> where it is stored
    live: FxHashMap<PathBuf, FileLocation>,
}

impl Snapshot {
    /// Snapshot of an index that has never been committed
    pub fn empty(meta: IndexMeta) -> Self {
        Self {
            meta,
            segments: Vec::new(),
            doc_bases: vec![0],
            path_bases: vec![0],
            dead: RoaringBitmap::new(),
            live: FxHashMap::default(),
        }
    }

    /// Open every segment listed in `meta`
    pub fn open(index_path: &Path, meta: IndexMeta) -> Result<Self> {
        Self::open_reusing(index_path, meta, None)
    }

    /// Open the segments listed in `meta`, sharing those `previous` already has open
    pub fn open_reusing(index_path: &Path, meta: IndexMeta, previous: Option<&Snapshot>) -> Result<Self> {
        let segments = meta
            .segments
            .par_iter()
            .map(|seg_meta| {
                let reused = previous
                    .and_then(|p| p.segments.iter().find(|s| s.id == seg_meta.id))
                    .filter(|s| s.doc_count() as u64 == seg_meta.doc_count as u64);
                match reused {
                    Some(segment) => Ok(segment.clone()),
                    None => Segment::open(&index_path.join(seg_meta.dir_name()), seg_meta).map(Arc::new),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Self::assemble(meta, segments)
    }

    fn assemble(meta: IndexMeta, segments: Vec<Arc<Segment>>) -> Result<Self> {
        let mut doc_bases = Vec::with_capacity(segments.len() + 1);
        let mut path_bases = Vec::with_capacity(segments.len() + 1);
        let (mut doc_base, mut path_base) = (0u64, 0u64);
        for segment in &segments {
            doc_bases.push(doc_base as DocId);
            path_bases.push(path_base as PathId);
            doc_base += segment.doc_count() as u64;
            path_base += segment.file_count() as u64;
        }
        if doc_base > DocId::MAX as u64 || path_base > PathId::MAX as u64 {
            bail!("index holds more documents than a snapshot can address");
        }
        doc_bases.push(doc_base as DocId);
        path_bases.push(path_base as PathId);

        let mut dead = RoaringBitmap::new();
        let mut live = FxHashMap::default();
        for (idx, (segment, seg_meta)) in segments.iter().zip(&meta.segments).enumerate() {
            let mut deleted = vec![false; segment.file_count()];
            for &path_id in &seg_meta.deleted {
                let Some(flag) = deleted.get_mut(path_id as usize) else {
                    bail!("tombstone for path {} outside segment {}", path_id, segment.id);
                };
                *flag = true;
                let docs = segment.file_docs(path_id);
                dead.insert_range(doc_bases[idx] + docs.start..doc_bases[idx] + docs.end);
            }

            for (path_id, path) in segment.paths.iter().enumerate() {
                if deleted[path_id] {
                    continue;
                }
                let location = FileLocation {
                    segment: idx,
                    path_id: path_id as PathId,
                };
                if live.insert(path.clone(), location).is_some() {
                    bail!("{} is live in more than one segment", path.display());
                }
            }
        }

        let live_docs = doc_base - dead.len();
        if live_docs != meta.doc_count as u64 || live.len() as u64 != meta.file_count as u64 {
            bail!(
                "meta.json lists {} documents in {} files but the segments hold {} in {}",
                meta.doc_count,
                meta.file_count,
                live_docs,
                live.len()
            );
        }

        Ok(Self {
            meta,
            segments,
            doc_bases,
            path_bases,
            dead,
            live,
        })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn generation(&self) -> u64 {
        self.meta.generation
    }

    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    /// Live documents
    pub fn doc_count(&self) -> usize {
        self.stored_doc_count() - self.dead.len() as usize
    }

    /// Documents on disk, tombstoned ones included
    pub fn stored_doc_count(&self) -> usize {
        self.doc_bases.last().copied().unwrap_or(0) as usize
    }

    pub fn dead_doc_count(&self) -> usize {
        self.dead.len() as usize
    }

    pub fn file_count(&self) -> usize {
        self.live.len()
    }

    /// Distinct gram keys over all segment dictionaries
    pub fn gram_count(&self) -> usize {
        match self.segments.as_slice() {
            [] => 0,
            [only] => only.dict.entries.len(),
            all => {
                let mut grams: Vec<Gram> = all
                    .iter()
                    .flat_map(|s| s.dict.entries.iter().map(|e| e.gram))
                    .collect();
                grams.sort_unstable();
                grams.dedup();
                grams.len()
            }
        }
    }

    /// Live documents in global doc id order, with global ids
    pub fn documents(&self) -> impl Iterator<Item = DocEntry> + '_ {
        self.segments.iter().enumerate().flat_map(move |(idx, segment)| {
            segment
                .documents
                .iter()
                .map(move |doc| self.globalize(idx, doc))
                .filter(|doc| !self.dead.contains(doc.doc_id))
        })
    }

    /// Live paths in global path id order
    pub fn indexed_paths(&self) -> Vec<&Path> {
        let mut located: Vec<(&FileLocation, &PathBuf)> = self.live.iter().map(|(p, l)| (l, p)).collect();
        located.sort_unstable_by_key(|(l, _)| (l.segment, l.path_id));
        located.into_iter().map(|(_, p)| p.as_path()).collect()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.live.contains_key(path)
    }

    /// Stored staleness stamp of a live path
    pub fn stamp(&self, path: &Path) -> Option<FileStamp> {
        let location = self.live.get(path)?;
        let segment = &self.segments[location.segment];
        let first = segment.file_docs(location.path_id).start;
        segment.documents.get(first as usize).map(DocEntry::stamp)
    }

    /// A live document, with global doc and path ids
    pub fn doc(&self, doc_id: DocId) -> Option<DocEntry> {
        if self.dead.contains(doc_id) {
            return None;
        }
        let (idx, local) = self.locate_doc(doc_id)?;
        self.segments[idx]
            .documents
            .get(local as usize)
            .map(|doc| self.globalize(idx, doc))
    }

    /// Path of a global path id
    pub fn path(&self, path_id: PathId) -> Option<&Path> {
        let idx = self.path_bases.partition_point(|&base| base <= path_id).checked_sub(1)?;
        let local = path_id - self.path_bases[idx];
        self.segments
            .get(idx)?
            .paths
            .get(local as usize)
            .map(PathBuf::as_path)
    }

    pub fn doc_path(&self, doc: &DocEntry) -> Option<&Path> {
        self.path(doc.path_id)
    }

    /// Verbatim text of a live chunk
    pub fn doc_text(&self, doc_id: DocId) -> Option<&str> {
        if self.dead.contains(doc_id) {
            return None;
        }
        let (idx, local) = self.locate_doc(doc_id)?;
        let segment = &self.segments[idx];
        let bytes = segment.data_bytes(segment.documents.get(local as usize)?)?;
        std::str::from_utf8(bytes).ok()
    }

    /// Live documents containing a gram
    pub fn gram_docs(&self, gram: Gram) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        for (idx, segment) in self.segments.iter().enumerate() {
            if let Some(entry) = segment.dict.lookup(gram) {
                let base = self.doc_bases[idx];
                docs.extend(segment.decode_postings(entry).into_iter().map(|id| base + id));
            }
        }
        docs -= &self.dead;
        docs
    }

    /// Number of stored documents containing a gram; an upper bound for live ones
    pub fn gram_doc_freq(&self, gram: Gram) -> u32 {
        self.segments
            .iter()
            .filter_map(|s| s.dict.lookup(gram))
            .map(|e| e.doc_freq)
            .sum()
    }

    /// Union of the live postings of every gram in a key range
    pub fn prefix_docs(&self, range: RangeInclusive<Gram>) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        for (idx, segment) in self.segments.iter().enumerate() {
            let base = self.doc_bases[idx];
            for entry in segment.dict.range(&range) {
                docs.extend(segment.decode_postings(entry).into_iter().map(|id| base + id));
            }
        }
        docs -= &self.dead;
        docs
    }

    /// Segment index and local path id of a live path
    pub(crate) fn locate(&self, path: &Path) -> Option<(usize, PathId)> {
        self.live.get(path).map(|l| (l.segment, l.path_id))
    }

    fn locate_doc(&self, doc_id: DocId) -> Option<(usize, DocId)> {
        let idx = self.doc_bases.partition_point(|&base| base <= doc_id).checked_sub(1)?;
        if idx >= self.segments.len() {
            return None;
        }
        Some((idx, doc_id - self.doc_bases[idx]))
    }

    fn globalize(&self, idx: usize, doc: &DocEntry) -> DocEntry {
        DocEntry {
            doc_id: self.doc_bases[idx] + doc.doc_id,
            path_id: self.path_bases[idx] + doc.path_id,
            ..*doc
        }
    }
}

/// mmap a file, `None` when it is empty (zero-length maps are not portable)
fn map_file(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    // Segment files are immutable once committed
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Some(mmap))
}

/// Validate the document table and derive each path's doc range
fn path_ranges(documents: &[DocEntry], path_count: usize, data_len: u64) -> Result<Vec<Range<DocId>>> {
    let mut ranges: Vec<Range<DocId>> = Vec::with_capacity(path_count);

    for (idx, doc) in documents.iter().enumerate() {
        if doc.doc_id as usize != idx {
            bail!("document {} is stored at position {}", doc.doc_id, idx);
        }
        if doc.data_offset + doc.data_len as u64 > data_len {
            bail!("document {} points past the end of {}", doc.doc_id, DATA_FILE);
        }

        let path_id = doc.path_id as usize;
        if path_id == ranges.len() {
            ranges.push(doc.doc_id..doc.doc_id + 1);
        } else if path_id + 1 == ranges.len() {
            ranges[path_id].end = doc.doc_id + 1;
        } else {
            bail!("chunks of path {} are not contiguous", path_id);
        }
    }

    if ranges.len() != path_count {
        bail!(
            "{} paths stored but {} have documents",
            path_count,
            ranges.len()
        );
    }
    Ok(ranges)
}

/// Read documents from docs.bin
fn read_documents(seg_dir: &Path) -> Result<Vec<DocEntry>> {
    let bytes = fs::read(seg_dir.join(DOCS_FILE)).context("Failed to read docs.bin")?;
    let count = read_u32_at(&bytes, 0).context("docs.bin is truncated")? as usize;

    let body = &bytes[4..];
    if body.len() != count * DocEntry::SIZE {
        bail!("docs.bin holds {} bytes for {} documents", body.len(), count);
    }

    body.chunks_exact(DocEntry::SIZE)
        .map(|raw| DocEntry::from_bytes(raw).context("docs.bin entry is truncated"))
        .collect()
}

/// Read paths from paths.bin
fn read_paths(seg_dir: &Path) -> Result<Vec<PathBuf>> {
    let paths_path = seg_dir.join(PATHS_FILE);
    let mut file = BufReader::new(File::open(&paths_path).context("Failed to open paths.bin")?);

    let mut buf4 = [0u8; 4];

    // Read count
    file.read_exact(&mut buf4)?;
    let count = u32::from_le_bytes(buf4) as usize;

    let mut paths = Vec::with_capacity(count);

    for _ in 0..count {
        // Read length
        file.read_exact(&mut buf4)?;
        let len = u32::from_le_bytes(buf4) as usize;

        // Read path bytes
        let mut path_bytes = vec![0u8; len];
        file.read_exact(&mut path_bytes)?;

        paths.push(path_from_bytes(path_bytes));
    }

    Ok(paths)
}

/// Read the gram dictionary (already sorted from BTreeMap write)
fn read_gram_dict(seg_dir: &Path) -> Result<GramDict> {
    let bytes = fs::read(seg_dir.join(DICT_FILE)).context("Failed to read grams.dict")?;
    let count = read_u32_at(&bytes, 0).context("grams.dict is truncated")? as usize;

    if bytes.len() != 4 + count * DICT_ENTRY_SIZE {
        bail!("grams.dict holds {} bytes for {} entries", bytes.len(), count);
    }

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let at = 4 + i * DICT_ENTRY_SIZE;
        let entry = (|| {
            Some(GramDictEntry {
                gram: read_u64_at(&bytes, at)?,
                offset: read_u64_at(&bytes, at + 8)?,
                length: read_u32_at(&bytes, at + 16)?,
                doc_freq: read_u32_at(&bytes, at + 20)?,
            })
        })()
        .context("grams.dict entry is truncated")?;
        entries.push(entry);
    }

    if entries.windows(2).any(|w| w[0].gram >= w[1].gram) {
        bail!("grams.dict is not sorted");
    }

    Ok(GramDict { entries })
}
