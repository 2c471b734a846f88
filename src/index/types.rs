use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

/// Identifier of a document (one chunk). Local to a segment on disk,
/// global (segments laid end to end) in a [`Snapshot`](crate::index::Snapshot).
pub type DocId = u32;

/// Identifier for a path in a path store
pub type PathId = u32;

/// Segments are named after the generation that wrote them
pub type SegmentId = u64;

/// On-disk format version
pub const FORMAT_VERSION: u32 = 2;

/// Field layout every index must carry in `meta.json`
pub const SCHEMA_FIELDS: [&str; 5] = ["path", "mtime", "size", "data", "line_offset"];

/// Files with more lines than this are split into several chunks
pub const DEFAULT_CHUNK_LINES: usize = 10_000;

/// A full pass merges the segments once there are more than this many
pub const DEFAULT_COMPACT_THRESHOLD: usize = 8;

/// Staleness metadata of a file: mtime in nanoseconds since the epoch, size in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileStamp {
    pub mtime: u64,
    pub size: u64,
}

impl FileStamp {
    pub fn new(mtime: u64, size: u64) -> Self {
        Self { mtime, size }
    }

    pub fn from_metadata(meta: &Metadata) -> Self {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            mtime,
            size: meta.len(),
        }
    }
}

/// A contiguous run of a file's lines, indexed as one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Number of lines preceding this chunk in the file
    pub line_offset: u32,
    pub text: String,
}

/// Everything stored for one indexed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub stamp: FileStamp,
    pub chunks: Vec<Chunk>,
}

impl FileRecord {
    /// Build a record from file text, splitting it every `chunk_lines` lines
    pub fn from_text(path: PathBuf, stamp: FileStamp, text: &str, chunk_lines: usize) -> Self {
        Self {
            path,
            stamp,
            chunks: split_chunks(text, chunk_lines),
        }
    }
}

/// Split text into chunks of at most `chunk_lines` lines.
///
/// Lines keep their terminating newline. Empty text is a single empty chunk.
pub fn split_chunks(text: &str, chunk_lines: usize) -> Vec<Chunk> {
    let chunk_lines = chunk_lines.max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut lines_in_chunk = 0usize;
    let mut line_offset = 0usize;

    for (pos, _) in text.match_indices('\n') {
        lines_in_chunk += 1;
        if lines_in_chunk == chunk_lines && pos + 1 < text.len() {
            chunks.push(Chunk {
                line_offset: line_offset as u32,
                text: text[start..=pos].to_string(),
            });
            start = pos + 1;
            line_offset += lines_in_chunk;
            lines_in_chunk = 0;
        }
    }

    chunks.push(Chunk {
        line_offset: line_offset as u32,
        text: text[start..].to_string(),
    });
    chunks
}

/// Document entry in the document table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocEntry {
    pub doc_id: DocId,
    pub path_id: PathId,
    pub mtime: u64,
    pub size: u64,
    pub line_offset: u32,
    /// Byte offset of the chunk text in `data.bin`
    pub data_offset: u64,
    pub data_len: u32,
}

impl DocEntry {
    /// Size of a document entry in bytes (fixed-size for mmap)
    pub const SIZE: usize = 4 + 4 + 8 + 8 + 4 + 8 + 4; // 40 bytes

    pub fn stamp(&self) -> FileStamp {
        FileStamp::new(self.mtime, self.size)
    }

    pub(crate) fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.doc_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.path_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.mtime.to_le_bytes());
        buf[16..24].copy_from_slice(&self.size.to_le_bytes());
        buf[24..28].copy_from_slice(&self.line_offset.to_le_bytes());
        buf[28..36].copy_from_slice(&self.data_offset.to_le_bytes());
        buf[36..40].copy_from_slice(&self.data_len.to_le_bytes());
        buf
    }

    pub(crate) fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let u64_at = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&buf[at..at + 8]);
            u64::from_le_bytes(b)
        };
        Some(Self {
            doc_id: u32_at(0),
            path_id: u32_at(4),
            mtime: u64_at(8),
            size: u64_at(16),
            line_offset: u32_at(24),
            data_offset: u64_at(28),
            data_len: u32_at(36),
        })
    }
}

/// One segment listed in meta.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: SegmentId,
    /// Documents stored in the segment, tombstoned ones included
    pub doc_count: u32,
    pub file_count: u32,
    /// Tombstones: local path ids superseded or removed by later commits
    #[serde(default)]
    pub deleted: Vec<PathId>,
}

impl SegmentMeta {
    pub fn new(id: SegmentId, doc_count: u32, file_count: u32) -> Self {
        Self {
            id,
            doc_count,
            file_count,
            deleted: Vec::new(),
        }
    }

    /// Directory name of the segment inside the store
    pub fn dir_name(&self) -> String {
        segment_dir_name(self.id)
    }
}

pub fn segment_dir_name(id: SegmentId) -> String {
    format!("seg-{:06}", id)
}

/// Index metadata stored in meta.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    pub name: String,
    pub schema: Vec<String>,
    pub generation: u64,
    /// Live documents and files over all segments
    pub doc_count: u32,
    pub file_count: u32,
    /// Oldest first
    #[serde(default)]
    pub segments: Vec<SegmentMeta>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl IndexMeta {
    pub fn new(name: &str, now: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            name: name.to_string(),
            schema: SCHEMA_FIELDS.iter().map(|s| s.to_string()).collect(),
            generation: 0,
            doc_count: 0,
            file_count: 0,
            segments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Describe why this meta cannot be read by this build, if it cannot
    pub fn incompatibility(&self) -> Option<String> {
        if self.version != FORMAT_VERSION {
            return Some(format!(
                "format version {} (expected {})",
                self.version, FORMAT_VERSION
            ));
        }
        if self.schema.iter().map(String::as_str).ne(SCHEMA_FIELDS.iter().copied()) {
            return Some(format!("schema mismatch: {:?}", self.schema));
        }
        None
    }

    /// Documents tombstoned across all segments
    pub fn dead_doc_count(&self) -> u32 {
        let stored: u32 = self.segments.iter().map(|s| s.doc_count).sum();
        stored.saturating_sub(self.doc_count)
    }
}

/// Tuning for how files become documents and when segments are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Lines per chunk for large files
    pub chunk_lines: usize,
    /// Segment count above which a full pass compacts
    pub compact_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_lines: DEFAULT_CHUNK_LINES,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_small_text_single_chunk() {
        let chunks = split_chunks("a\nb\nc", 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].line_offset, 0);
        assert_eq!(chunks[0].text, "a\nb\nc");
    }

    #[test]
    fn test_split_empty_text() {
        let chunks = split_chunks("", 10);
        assert_eq!(
            chunks,
            vec![Chunk {
                line_offset: 0,
                text: String::new()
            }]
        );
    }

    #[test]
    fn test_split_on_line_boundaries() {
        let text = "1\n2\n3\n4\n5\n6\n7";
        let chunks = split_chunks(text, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "1\n2\n3\n");
        assert_eq!(chunks[1].line_offset, 3);
        assert_eq!(chunks[1].text, "4\n5\n6\n");
        assert_eq!(chunks[2].line_offset, 6);
        assert_eq!(chunks[2].text, "7");
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_split_exact_multiple_has_no_trailing_empty_chunk() {
        let chunks = split_chunks("1\n2\n3\n", 3);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_doc_entry_bytes() {
        let doc = DocEntry {
            doc_id: 7,
            path_id: 3,
            mtime: 1_700_000_000_000_000_000,
            size: 42,
            line_offset: 10_000,
            data_offset: 1 << 40,
            data_len: 99,
        };
        assert_eq!(DocEntry::from_bytes(&doc.to_bytes()), Some(doc));
        assert_eq!(DocEntry::from_bytes(&[0u8; 10]), None);
    }

    #[test]
    fn test_meta_compatibility() {
        let meta = IndexMeta::new("proj", 0);
        assert!(meta.incompatibility().is_none());

        let mut other = meta.clone();
        other.schema.pop();
        assert!(other.incompatibility().is_some());

        let mut newer = meta;
        newer.version = FORMAT_VERSION + 1;
        assert!(newer.incompatibility().is_some());
    }

    #[test]
    fn test_dead_doc_count() {
        let mut meta = IndexMeta::new("proj", 0);
        meta.segments.push(SegmentMeta::new(1, 10, 4));
        meta.segments.push(SegmentMeta::new(3, 2, 1));
        meta.doc_count = 9;
        assert_eq!(meta.dead_doc_count(), 3);
        assert_eq!(meta.segments[1].dir_name(), "seg-000003");
    }
}
