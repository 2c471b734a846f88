use crate::index::{IndexStore, PathId, Snapshot};
use crate::query::lines::{LineMatch, contains_folded, find_line_matches};
use crate::query::{IndexQuery, QueryLimits, SearchMode};
use crate::utils::{prefix_range, query_grams};
use roaring::RoaringBitmap;
use std::path::PathBuf;

/// One file in a result list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub path: PathBuf,
    /// Line occurrences; empty in `Files` mode
    pub lines: Vec<LineMatch>,
}

/// Flat result entry handed to a result list UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub path: PathBuf,
    pub line_number: Option<usize>,
    pub snippet: Option<String>,
}

/// Ordered, path-deduplicated results of one search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResults {
    pub query: String,
    pub mode: SearchMode,
    pub hits: Vec<SearchHit>,
    /// A result cap was reached
    pub truncated: bool,
}

impl SearchResults {
    pub fn empty(query: &str, mode: SearchMode) -> Self {
        Self {
            query: query.to_string(),
            mode,
            hits: Vec::new(),
            truncated: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.hits.len()
    }

    pub fn line_count(&self) -> usize {
        self.hits.iter().map(|h| h.lines.len()).sum()
    }

    /// Result list entries: one per file, or one per line in `Lines` mode
    pub fn items(&self) -> Vec<ResultItem> {
        match self.mode {
            SearchMode::Files => self
                .hits
                .iter()
                .map(|hit| ResultItem {
                    path: hit.path.clone(),
                    line_number: None,
                    snippet: None,
                })
                .collect(),
            SearchMode::Lines => self
                .hits
                .iter()
                .flat_map(|hit| {
                    hit.lines.iter().map(move |m| ResultItem {
                        path: hit.path.clone(),
                        line_number: Some(m.line_number),
                        snippet: Some(m.snippet.clone()),
                    })
                })
                .collect(),
        }
    }

    /// Completion message, `found: N files`
    pub fn status_line(&self) -> String {
        format!("found: {} files", self.file_count())
    }
}

/// Runs queries against index snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEngine {
    limits: QueryLimits,
}

impl QueryEngine {
    pub fn new(limits: QueryLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    /// Search the store's current snapshot; never waits for a running commit
    pub fn search(&self, store: &IndexStore, text: &str, mode: SearchMode) -> SearchResults {
        self.search_snapshot(&store.snapshot(), text, mode)
    }

    pub fn search_snapshot(&self, snapshot: &Snapshot, text: &str, mode: SearchMode) -> SearchResults {
        let query = IndexQuery::from_input(text);
        let mut results = SearchResults::empty(text, mode);

        let (candidates, verify) = match &query {
            IndexQuery::Empty => return results,
            IndexQuery::Prefix(c) => (snapshot.prefix_docs(prefix_range(*c)), false),
            IndexQuery::Phrase(phrase) => (phrase_candidates(snapshot, phrase), true),
        };
        let needle = query.needle();

        let mut last_path: Option<PathId> = None;
        let mut line_total = 0usize;

        for doc_id in candidates.iter() {
            let Some(doc) = snapshot.doc(doc_id) else {
                continue;
            };
            let same_file = last_path == Some(doc.path_id);
            if mode == SearchMode::Files && same_file {
                continue;
            }
            let Some(text) = snapshot.doc_text(doc_id) else {
                log::debug!("document {} has no readable text", doc_id);
                continue;
            };

            let lines = match mode {
                SearchMode::Files => {
                    if verify && !contains_folded(text, &needle) {
                        continue;
                    }
                    Vec::new()
                }
                SearchMode::Lines => {
                    let remaining = self.limits.max_line_results - line_total;
                    let mut found =
                        find_line_matches(text, &needle, doc.line_offset, remaining.saturating_add(1));
                    if found.is_empty() {
                        continue;
                    }
                    if found.len() > remaining {
                        found.truncate(remaining);
                        results.truncated = true;
                    }
                    line_total += found.len();
                    found
                }
            };

            if same_file {
                if let Some(hit) = results.hits.last_mut() {
                    hit.lines.extend(lines);
                }
            } else if mode == SearchMode::Files || !lines.is_empty() {
                if mode == SearchMode::Files && results.hits.len() >= self.limits.max_file_results {
                    results.truncated = true;
                    break;
                }
                let Some(path) = snapshot.doc_path(&doc) else {
                    continue;
                };
                results.hits.push(SearchHit {
                    path: path.to_path_buf(),
                    lines,
                });
                last_path = Some(doc.path_id);
            }

            if results.truncated {
                break;
            }
        }

        results
    }
}

/// Intersect bigram postings, rarest first
fn phrase_candidates(snapshot: &Snapshot, phrase: &str) -> RoaringBitmap {
    let mut grams = query_grams(phrase);
    if grams.is_empty() {
        return RoaringBitmap::new();
    }
    grams.sort_by_key(|g| snapshot.gram_doc_freq(*g));

    let mut candidates = snapshot.gram_docs(grams[0]);
    for gram in &grams[1..] {
        if candidates.is_empty() {
            break;
        }
        candidates &= snapshot.gram_docs(*gram);
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FileRecord, FileStamp, StoreConfig};
    use std::path::Path;

    fn store_with(dir: &Path, chunk_lines: usize, files: &[(&str, &str)]) -> IndexStore {
        let config = StoreConfig {
            chunk_lines,
            ..StoreConfig::default()
        };
        let store = IndexStore::open_or_create(dir, "q", config).unwrap();
        let mut tx = store.begin().unwrap();
        for (path, text) in files {
            tx.add_record(FileRecord::from_text(
                PathBuf::from(path),
                FileStamp::new(1, text.len() as u64),
                text,
                chunk_lines,
            ));
        }
        tx.commit().unwrap();
        store
    }

    fn paths(results: &SearchResults) -> Vec<&str> {
        results
            .hits
            .iter()
            .map(|h| h.path.to_str().unwrap())
            .collect()
    }

    #[test]
    fn test_phrase_is_verified() {
        let dir = tempfile::tempdir().unwrap();
        // "ab" and "bc" bigrams both occur in /x, but not as "abc"
        let store = store_with(dir.path(), 100, &[("/w", "xx abc yy"), ("/x", "ab bc")]);
        let engine = QueryEngine::default();

        let results = engine.search(&store, "ABC", SearchMode::Files);
        assert_eq!(paths(&results), vec!["/w"]);
        assert_eq!(results.status_line(), "found: 1 files");
    }

    #[test]
    fn test_single_char_matches_anywhere() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), 100, &[("/a", "hello"), ("/b", "world"), ("/c", "HOLA")]);
        let engine = QueryEngine::default();

        let results = engine.search(&store, "h", SearchMode::Files);
        assert_eq!(paths(&results), vec!["/a", "/c"]);

        let results = engine.search(&store, "x", SearchMode::Files);
        assert!(results.is_empty());
    }

    #[test]
    fn test_empty_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), 100, &[("/a", "hello")]);
        let results = QueryEngine::default().search(&store, "", SearchMode::Lines);
        assert!(results.is_empty());
        assert!(!results.truncated);
    }

    #[test]
    fn test_lines_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let text = "a\nneedle\nb\nc\nneedle\n";
        let store = store_with(dir.path(), 3, &[("/long", text)]);
        assert_eq!(store.snapshot().doc_count(), 2);

        let results = QueryEngine::default().search(&store, "needle", SearchMode::Lines);
        assert_eq!(results.file_count(), 1);
        let lines: Vec<usize> = results.hits[0].lines.iter().map(|m| m.line_number).collect();
        assert_eq!(lines, vec![2, 5]);

        let items = results.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].line_number, Some(5));
        assert_eq!(items[1].snippet.as_deref(), Some("needle"));
    }

    #[test]
    fn test_file_results_deduplicated_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), 1, &[("/multi", "foo\nfoo\nfoo\n")]);
        let results = QueryEngine::default().search(&store, "foo", SearchMode::Files);
        assert_eq!(results.file_count(), 1);
        assert_eq!(results.items().len(), 1);
    }

    #[test]
    fn test_file_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), 100, &[("/a", "zz"), ("/b", "zz"), ("/c", "zz")]);
        let engine = QueryEngine::new(QueryLimits {
            max_file_results: 2,
            max_line_results: 10,
        });

        let results = engine.search(&store, "zz", SearchMode::Files);
        assert_eq!(results.file_count(), 2);
        assert!(results.truncated);
    }

    #[test]
    fn test_line_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), 100, &[("/a", "q\nq\nq\n"), ("/b", "q\n")]);
        let engine = QueryEngine::new(QueryLimits {
            max_file_results: 10,
            max_line_results: 3,
        });

        let results = engine.search(&store, "q", SearchMode::Lines);
        assert_eq!(results.line_count(), 3);
        assert_eq!(results.file_count(), 1);
        assert!(results.truncated);

        let exact = QueryEngine::new(QueryLimits {
            max_file_results: 10,
            max_line_results: 4,
        })
        .search(&store, "q", SearchMode::Lines);
        assert_eq!(exact.line_count(), 4);
        assert!(!exact.truncated);
    }

    #[test]
    fn test_search_spans_segments() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), 2, &[("/a", "needle one\nx\nneedle two\n"), ("/b", "needle")]);

        let mut tx = store.begin().unwrap();
        tx.add_record(FileRecord::from_text(
            PathBuf::from("/a"),
            FileStamp::new(2, 3),
            "x\nx\nx\nneedle three\n",
            2,
        ));
        tx.add_record(FileRecord::from_text(PathBuf::from("/c"), FileStamp::new(2, 6), "needle", 2));
        tx.commit().unwrap();
        assert_eq!(store.snapshot().segments().len(), 2);

        let results = QueryEngine::default().search(&store, "needle", SearchMode::Lines);
        assert_eq!(paths(&results), vec!["/b", "/a", "/c"]);
        let a_lines: Vec<usize> = results.hits[1].lines.iter().map(|m| m.line_number).collect();
        assert_eq!(a_lines, vec![4]);

        let files = QueryEngine::default().search(&store, "n", SearchMode::Files);
        assert_eq!(files.file_count(), 3);
    }

    #[test]
    fn test_search_keeps_snapshot_during_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), 100, &[("/a", "before")]);
        let snapshot = store.snapshot();

        let mut tx = store.begin().unwrap();
        tx.delete_path(Path::new("/a"));
        tx.commit().unwrap();

        let engine = QueryEngine::default();
        assert_eq!(engine.search_snapshot(&snapshot, "before", SearchMode::Files).file_count(), 1);
        assert!(engine.search(&store, "before", SearchMode::Files).is_empty());
    }
}
