use crate::index::types::*;
use crate::utils::{Gram, delta_encode, path_to_bytes};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub(crate) const DOCS_FILE: &str = "docs.bin";
pub(crate) const PATHS_FILE: &str = "paths.bin";
pub(crate) const DATA_FILE: &str = "data.bin";
pub(crate) const DICT_FILE: &str = "grams.dict";
pub(crate) const POSTINGS_FILE: &str = "grams.postings";

/// Size of one `grams.dict` entry: gram, offset, length, doc_freq
pub(crate) const DICT_ENTRY_SIZE: usize = 8 + 8 + 4 + 4;

/// Totals of a written segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSummary {
    pub doc_count: u32,
    pub file_count: u32,
    pub gram_count: u32,
}

/// Writes one immutable segment directory.
///
/// Chunk text is streamed to `data.bin` as documents are added; the document
/// table, path store and gram dictionary are written by [`finish`].
///
/// [`finish`]: SegmentWriter::finish
pub struct SegmentWriter {
    dir: PathBuf,
    documents: Vec<DocEntry>,
    paths: Vec<PathBuf>,
    data: BufWriter<File>,
    data_offset: u64,
    /// Gram -> doc ids (accumulated during the build)
    postings: BTreeMap<Gram, Vec<DocId>>,
}

impl SegmentWriter {
    /// Create the segment directory, replacing leftovers of an aborted commit
    pub fn create(dir: &Path) -> io::Result<Self> {
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
        let data = BufWriter::new(File::create(dir.join(DATA_FILE))?);

        Ok(Self {
            dir: dir.to_path_buf(),
            documents: Vec::new(),
            paths: Vec::new(),
            data,
            data_offset: 0,
            postings: BTreeMap::new(),
        })
    }

    /// Register a path; its chunks must follow immediately
    pub fn add_path(&mut self, path: &Path) -> PathId {
        let id = self.paths.len() as PathId;
        self.paths.push(path.to_path_buf());
        id
    }

    /// Append one chunk of `path_id` and index the given grams for it
    pub fn add_chunk(
        &mut self,
        path_id: PathId,
        stamp: FileStamp,
        line_offset: u32,
        text: &[u8],
        grams: &[Gram],
    ) -> io::Result<DocId> {
        let doc_id = self.documents.len() as DocId;

        self.data.write_all(text)?;
        self.documents.push(DocEntry {
            doc_id,
            path_id,
            mtime: stamp.mtime,
            size: stamp.size,
            line_offset,
            data_offset: self.data_offset,
            data_len: text.len() as u32,
        });
        self.data_offset += text.len() as u64;

        for &gram in grams {
            self.postings.entry(gram).or_default().push(doc_id);
        }

        Ok(doc_id)
    }

    /// Add already-known documents for a gram (carried over by compaction)
    pub fn extend_postings(&mut self, gram: Gram, doc_ids: impl IntoIterator<Item = DocId>) {
        let mut doc_ids = doc_ids.into_iter().peekable();
        if doc_ids.peek().is_some() {
            self.postings.entry(gram).or_default().extend(doc_ids);
        }
    }

    pub fn doc_count(&self) -> usize {
        self.documents.len()
    }

    /// Write the remaining files and flush everything to disk
    pub fn finish(mut self) -> io::Result<SegmentSummary> {
        self.data.flush()?;
        self.data.get_ref().sync_all()?;

        self.write_documents()?;
        self.write_paths()?;
        let gram_count = self.write_gram_index()?;

        Ok(SegmentSummary {
            doc_count: self.documents.len() as u32,
            file_count: self.paths.len() as u32,
            gram_count,
        })
    }

    /// Write document table
    fn write_documents(&self) -> io::Result<()> {
        let mut file = BufWriter::new(File::create(self.dir.join(DOCS_FILE))?);

        file.write_all(&(self.documents.len() as u32).to_le_bytes())?;
        for doc in &self.documents {
            file.write_all(&doc.to_bytes())?;
        }

        file.flush()?;
        file.get_ref().sync_all()?;
        Ok(())
    }

    /// Write path store
    fn write_paths(&self) -> io::Result<()> {
        let mut file = BufWriter::new(File::create(self.dir.join(PATHS_FILE))?);

        // Simple format: count, then [length, bytes]...
        file.write_all(&(self.paths.len() as u32).to_le_bytes())?;

        for path in &self.paths {
            let bytes = path_to_bytes(path).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("path {} has no stored form", path.display()),
                )
            })?;
            file.write_all(&(bytes.len() as u32).to_le_bytes())?;
            file.write_all(&bytes)?;
        }

        file.flush()?;
        file.get_ref().sync_all()?;
        Ok(())
    }

    /// Write gram dictionary + postings
    fn write_gram_index(&mut self) -> io::Result<u32> {
        let mut dict_file = BufWriter::new(File::create(self.dir.join(DICT_FILE))?);
        let mut postings_file = BufWriter::new(File::create(self.dir.join(POSTINGS_FILE))?);

        dict_file.write_all(&(self.postings.len() as u32).to_le_bytes())?;

        let mut postings_offset: u64 = 0;
        let mut encoded = Vec::new();

        for (&gram, doc_ids) in self.postings.iter_mut() {
            doc_ids.sort_unstable();
            doc_ids.dedup();

            encoded.clear();
            delta_encode(doc_ids, &mut encoded);

            // Dictionary entry: gram, offset, length, doc_freq
            dict_file.write_all(&gram.to_le_bytes())?;
            dict_file.write_all(&postings_offset.to_le_bytes())?;
            dict_file.write_all(&(encoded.len() as u32).to_le_bytes())?;
            dict_file.write_all(&(doc_ids.len() as u32).to_le_bytes())?;

            postings_file.write_all(&encoded)?;
            postings_offset += encoded.len() as u64;
        }

        dict_file.flush()?;
        dict_file.get_ref().sync_all()?;
        postings_file.flush()?;
        postings_file.get_ref().sync_all()?;
        Ok(self.postings.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::extract_grams;

    #[test]
    fn test_writes_all_segment_files() {
        let dir = tempfile::tempdir().unwrap();
        let seg_dir = dir.path().join("seg-000001");
        let mut writer = SegmentWriter::create(&seg_dir).unwrap();

        let path_id = writer.add_path(Path::new("/p/a.txt"));
        let text = "hello world";
        writer
            .add_chunk(path_id, FileStamp::new(1, 11), 0, text.as_bytes(), &extract_grams(text))
            .unwrap();
        let summary = writer.finish().unwrap();

        assert_eq!(summary.doc_count, 1);
        assert_eq!(summary.file_count, 1);
        assert!(summary.gram_count > 0);
        for name in [DOCS_FILE, PATHS_FILE, DATA_FILE, DICT_FILE, POSTINGS_FILE] {
            assert!(seg_dir.join(name).exists(), "{} missing", name);
        }
        assert_eq!(fs::read_to_string(seg_dir.join(DATA_FILE)).unwrap(), text);
        assert_eq!(
            fs::metadata(seg_dir.join(DOCS_FILE)).unwrap().len() as usize,
            4 + DocEntry::SIZE
        );
    }

    #[test]
    fn test_create_clears_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let seg_dir = dir.path().join("seg-000002");
        fs::create_dir_all(&seg_dir).unwrap();
        fs::write(seg_dir.join("stray"), "x").unwrap();

        let writer = SegmentWriter::create(&seg_dir).unwrap();
        writer.finish().unwrap();
        assert!(!seg_dir.join("stray").exists());
    }
}
