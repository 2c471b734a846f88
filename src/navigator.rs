//! Jump-to-result navigation over a finished search.

use crate::content::ContentSource;
use crate::query::{LineMatch, ResultItem, SearchMode, SearchResults, find_line_matches};
use std::path::{Path, PathBuf};

/// Shown in place of an empty result list
pub const NO_RESULTS: &str = "No results";

/// A result list entry the navigator can jump to
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    path: PathBuf,
    /// Set for line results; the cursor lands on this line
    line: Option<usize>,
}

/// Cursor over the occurrences of the query inside the selected file.
///
/// Occurrences are recomputed from the file's live content whenever a
/// different file is selected, so unsaved edits in an open buffer are
/// honored. Moving between line results of one file only moves the cursor.
#[derive(Debug, Clone, Default)]
pub struct ResultNavigator {
    query: String,
    targets: Vec<Target>,
    selected: Option<usize>,
    /// File the current matches were scanned from
    scanned: Option<PathBuf>,
    matches: Vec<LineMatch>,
    cursor: usize,
}

impl ResultNavigator {
    /// Navigator over file results
    pub fn new(query: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            query: query.into(),
            targets: paths.into_iter().map(|path| Target { path, line: None }).collect(),
            ..Self::default()
        }
    }

    /// Navigator over result list items, line results included
    pub fn for_items(query: impl Into<String>, items: &[ResultItem]) -> Self {
        Self {
            query: query.into(),
            targets: items
                .iter()
                .map(|item| Target {
                    path: item.path.clone(),
                    line: item.line_number,
                })
                .collect(),
            ..Self::default()
        }
    }

    /// Select result `index`. Selecting another file rescans it and resets
    /// the cursor; a line result then puts the cursor on its line. Returns
    /// whether a rescan happened.
    pub fn select(&mut self, index: usize, content: &dyn ContentSource) -> bool {
        let Some(target) = self.targets.get(index).cloned() else {
            let changed = self.selected != Some(index);
            self.selected = Some(index);
            self.scanned = None;
            self.matches.clear();
            self.cursor = 0;
            return changed;
        };
        self.selected = Some(index);

        let rescan = self.scanned.as_deref() != Some(target.path.as_path());
        if rescan {
            self.matches = match content.read_current_text(&target.path) {
                Ok(text) => find_line_matches(&text, &self.query, 0, usize::MAX),
                Err(e) => {
                    log::debug!("cannot rescan {}: {}", target.path.display(), e);
                    Vec::new()
                }
            };
            self.scanned = Some(target.path);
            self.cursor = 0;
        }

        if let Some(line) = target.line {
            if let Some(pos) = self.matches.iter().position(|m| m.line_number == line) {
                self.cursor = pos;
            }
        }
        rescan
    }

    /// Move to the next occurrence; stays put on the last one
    pub fn next(&mut self) -> Option<&LineMatch> {
        if self.cursor + 1 < self.matches.len() {
            self.cursor += 1;
        }
        self.current()
    }

    /// Move to the previous occurrence; stays put on the first one
    pub fn previous(&mut self) -> Option<&LineMatch> {
        self.cursor = self.cursor.saturating_sub(1);
        self.current()
    }

    pub fn current(&self) -> Option<&LineMatch> {
        self.matches.get(self.cursor)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn matches(&self) -> &[LineMatch] {
        &self.matches
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_path(&self) -> Option<&Path> {
        self.selected
            .and_then(|i| self.targets.get(i))
            .map(|t| t.path.as_path())
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// One search invocation: its results plus the navigator over them
#[derive(Debug, Clone)]
pub struct SearchSession {
    results: SearchResults,
    items: Vec<ResultItem>,
    navigator: ResultNavigator,
}

impl SearchSession {
    pub fn new(results: SearchResults) -> Self {
        let items = results.items();
        let navigator = ResultNavigator::for_items(results.query.clone(), &items);
        Self {
            results,
            items,
            navigator,
        }
    }

    pub fn results(&self) -> &SearchResults {
        &self.results
    }

    pub fn items(&self) -> &[ResultItem] {
        &self.items
    }

    pub fn navigator(&self) -> &ResultNavigator {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut ResultNavigator {
        &mut self.navigator
    }

    pub fn select(&mut self, index: usize, content: &dyn ContentSource) -> bool {
        self.navigator.select(index, content)
    }

    /// Labels for a result list; a single "No results" entry when empty
    pub fn display_items(&self) -> Vec<String> {
        if self.items.is_empty() {
            return vec![NO_RESULTS.to_string()];
        }

        self.items
            .iter()
            .map(|item| match (self.results.mode, item.line_number) {
                (SearchMode::Lines, Some(line)) => format!(
                    "{}:{}: {}",
                    item.path.display(),
                    line,
                    item.snippet.as_deref().unwrap_or("").trim()
                ),
                _ => item.path.display().to_string(),
            })
            .collect()
    }

    pub fn status_line(&self) -> String {
        self.results.status_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{BufferOverlay, FsContent, PendingBuffer};
    use crate::query::SearchHit;
    use std::fs;

    fn results(mode: SearchMode, paths: &[&Path]) -> SearchResults {
        SearchResults {
            query: "foo".to_string(),
            mode,
            hits: paths
                .iter()
                .map(|p| SearchHit {
                    path: p.to_path_buf(),
                    lines: Vec::new(),
                })
                .collect(),
            truncated: false,
        }
    }

    #[test]
    fn test_empty_session() {
        let session = SearchSession::new(results(SearchMode::Files, &[]));
        assert_eq!(session.display_items(), vec!["No results".to_string()]);
        assert_eq!(session.status_line(), "found: 0 files");
    }

    #[test]
    fn test_cursor_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo\nbar foo\nfoo").unwrap();

        let mut session = SearchSession::new(results(SearchMode::Files, &[path.as_path()]));
        assert!(session.select(0, &FsContent::default()));
        let nav = session.navigator_mut();
        assert_eq!(nav.matches().len(), 3);
        assert_eq!(nav.current().map(|m| m.line_number), Some(1));

        assert_eq!(nav.previous().map(|m| m.line_number), Some(1));
        assert_eq!(nav.cursor(), 0);
        assert_eq!(nav.next().map(|m| m.line_number), Some(2));
        assert_eq!(nav.next().map(|m| m.line_number), Some(3));
        assert_eq!(nav.next().map(|m| m.line_number), Some(3));
        assert_eq!(nav.cursor(), 2);
    }

    #[test]
    fn test_selection_change_rescans_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "foo foo").unwrap();
        fs::write(&b, "x\nfoo").unwrap();

        let content = FsContent::default();
        let mut session = SearchSession::new(results(SearchMode::Files, &[a.as_path(), b.as_path()]));
        session.select(0, &content);
        session.navigator_mut().next();
        assert_eq!(session.navigator().cursor(), 1);

        // Same selection keeps the cursor
        assert!(!session.select(0, &content));
        assert_eq!(session.navigator().cursor(), 1);

        assert!(session.select(1, &content));
        assert_eq!(session.navigator().cursor(), 0);
        assert_eq!(session.navigator().selected_path(), Some(b.as_path()));
        assert_eq!(session.navigator().current().map(|m| m.line_number), Some(2));
    }

    #[test]
    fn test_line_results_of_one_file_move_the_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "foo\nx\nx\nx\nfoo\n").unwrap();
        fs::write(&b, "foo\n").unwrap();

        let mut results = results(SearchMode::Lines, &[a.as_path(), b.as_path()]);
        for (hit, lines) in results.hits.iter_mut().zip([&[1usize, 5][..], &[1][..]]) {
            for &line_number in lines {
                hit.lines.push(LineMatch {
                    line_number,
                    column: 1,
                    match_range: 0..3,
                    snippet: "foo".to_string(),
                });
            }
        }

        let content = FsContent::default();
        let mut session = SearchSession::new(results);
        assert_eq!(session.items().len(), 3);

        assert!(session.select(0, &content));
        assert_eq!(session.navigator().current().map(|m| m.line_number), Some(1));

        // Line 5 of the same file: no rescan, cursor on line 5
        assert!(!session.select(1, &content));
        assert_eq!(session.navigator().cursor(), 1);
        assert_eq!(session.navigator().current().map(|m| m.line_number), Some(5));

        // Back to line 1 of the same file
        assert!(!session.select(0, &content));
        assert_eq!(session.navigator().current().map(|m| m.line_number), Some(1));

        // Another file rescans
        assert!(session.select(2, &content));
        assert_eq!(session.navigator().selected_path(), Some(b.as_path()));
        assert_eq!(session.navigator().matches().len(), 1);

        // Selecting line 5 from another file rescans and lands on it
        assert!(session.select(1, &content));
        assert_eq!(session.navigator().current().map(|m| m.line_number), Some(5));
    }

    #[test]
    fn test_rescan_uses_open_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo").unwrap();

        let overlay = BufferOverlay::new(FsContent::default());
        overlay.open(&path, PendingBuffer::loaded("edited\nfoo\nfoo"));

        let mut session = SearchSession::new(results(SearchMode::Files, &[path.as_path()]));
        session.select(0, &overlay);
        let lines: Vec<usize> = session
            .navigator()
            .matches()
            .iter()
            .map(|m| m.line_number)
            .collect();
        assert_eq!(lines, vec![2, 3]);
    }

    #[test]
    fn test_unreadable_selection_has_no_matches() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let mut session = SearchSession::new(results(SearchMode::Files, &[gone.as_path()]));
        assert!(session.select(0, &FsContent::default()));
        assert!(session.navigator().is_empty());
        assert!(session.navigator_mut().next().is_none());
    }

    #[test]
    fn test_line_mode_labels() {
        let mut results = results(SearchMode::Lines, &[Path::new("/p/a.rs")]);
        results.hits[0].lines.push(LineMatch {
            line_number: 7,
            column: 5,
            match_range: 4..7,
            snippet: "    foo()".to_string(),
        });
        let session = SearchSession::new(results);
        assert_eq!(session.display_items(), vec!["/p/a.rs:7: foo()".to_string()]);
    }
}
