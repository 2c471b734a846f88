//! Occurrence scanning over stored chunk text.

use crate::utils::{fold_char, fold_text};
use memchr::{memchr, memchr_iter, memmem, memrchr};
use std::ops::Range;

/// One occurrence of the query inside a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    /// 1-based line number within the whole file
    pub line_number: usize,
    /// 1-based char column of the match start
    pub column: usize,
    /// Byte range of the match inside `snippet`
    pub match_range: Range<usize>,
    /// The matching line, without its terminator
    pub snippet: String,
}

/// Case-folded copy of a text with a way back to original byte offsets.
///
/// Folding maps chars one-to-one but may change their UTF-8 width, so byte
/// positions only line up when no width changed.
struct FoldedText {
    folded: String,
    /// (folded byte offset, original byte offset) of every char; only kept
    /// when some folded char has a different width than its original
    offsets: Option<Vec<(usize, usize)>>,
}

impl FoldedText {
    fn new(text: &str) -> Self {
        let mut folded = String::with_capacity(text.len());
        let mut offsets: Vec<(usize, usize)> = Vec::new();
        let mut width_changed = false;

        for (orig, c) in text.char_indices() {
            let f = fold_char(c);
            offsets.push((folded.len(), orig));
            width_changed |= f.len_utf8() != c.len_utf8();
            folded.push(f);
        }

        let offsets = if width_changed {
            offsets.push((folded.len(), text.len()));
            Some(offsets)
        } else {
            None
        };

        Self { folded, offsets }
    }

    fn to_original(&self, folded_pos: usize) -> usize {
        match &self.offsets {
            None => folded_pos,
            Some(offsets) => {
                let idx = offsets.partition_point(|(f, _)| *f < folded_pos);
                offsets.get(idx).map(|(_, o)| *o).unwrap_or(folded_pos)
            }
        }
    }
}

/// Whether `text` contains `folded_query` when case-folded
pub fn contains_folded(text: &str, folded_query: &str) -> bool {
    if folded_query.is_empty() {
        return true;
    }
    if text.is_ascii() && folded_query.is_ascii() {
        return memmem::find(text.to_ascii_lowercase().as_bytes(), folded_query.as_bytes()).is_some();
    }
    memmem::find(fold_text(text).as_bytes(), folded_query.as_bytes()).is_some()
}

/// Every non-overlapping occurrence of `query` in a chunk, case-insensitively.
///
/// Line numbers are counted from the chunk start and shifted by
/// `line_offset`, the number of file lines preceding the chunk. At most
/// `limit` matches are returned.
pub fn find_line_matches(text: &str, query: &str, line_offset: u32, limit: usize) -> Vec<LineMatch> {
    let needle = fold_text(query);
    if needle.is_empty() || limit == 0 {
        return Vec::new();
    }

    let folded = FoldedText::new(text);
    let bytes = text.as_bytes();
    let mut matches = Vec::new();

    // Newlines counted up to `counted_to`
    let mut line = 0usize;
    let mut counted_to = 0usize;

    for pos in memmem::find_iter(folded.folded.as_bytes(), needle.as_bytes()) {
        let start = folded.to_original(pos);
        let end = folded.to_original(pos + needle.len());

        line += memchr_iter(b'\n', &bytes[counted_to..start]).count();
        counted_to = start;

        let line_start = memrchr(b'\n', &bytes[..start]).map_or(0, |i| i + 1);
        let mut line_end = memchr(b'\n', &bytes[start..]).map_or(bytes.len(), |i| start + i);
        if line_end > line_start && bytes[line_end - 1] == b'\r' {
            line_end -= 1;
        }
        let snippet = &text[line_start..line_end];

        let match_start = start - line_start;
        let match_end = end.min(line_end).max(start) - line_start;

        matches.push(LineMatch {
            line_number: line_offset as usize + line + 1,
            column: text[line_start..start].chars().count() + 1,
            match_range: match_start..match_end,
            snippet: snippet.to_string(),
        });

        if matches.len() >= limit {
            break;
        }
    }

    matches
}
