//! Exclusion patterns: shell globs with a literal suffix fallback.
//!
//! A pattern matches a candidate when the glob matches the whole candidate
//! or when the candidate simply ends with the pattern text, so `.min.js`
//! and `*.min.js` both exclude `app.min.js`.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;

/// A compiled set of exclusion patterns
#[derive(Debug, Clone)]
pub struct PatternSet {
    globs: GlobSet,
    literals: Vec<String>,
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl PatternSet {
    /// Compile a pattern list. Empty patterns are ignored; patterns that are
    /// not valid globs still match through the suffix rule.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut literals: Vec<String> = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            if pattern.is_empty() || literals.iter().any(|p| p == pattern) {
                continue;
            }

            match GlobBuilder::new(pattern).literal_separator(false).build() {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => log::debug!("pattern '{}' is not a glob ({}), suffix only", pattern, e),
            }
            literals.push(pattern.to_string());
        }

        let globs = builder.build().unwrap_or_else(|e| {
            log::warn!("failed to compile pattern set: {}", e);
            GlobSet::empty()
        });

        Self { globs, literals }
    }

    pub fn empty() -> Self {
        Self {
            globs: GlobSet::empty(),
            literals: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    /// The source patterns, in insertion order
    pub fn patterns(&self) -> &[String] {
        &self.literals
    }

    /// Glob match against the whole candidate, or literal suffix match
    pub fn is_match(&self, candidate: &str) -> bool {
        if self.literals.is_empty() {
            return false;
        }
        self.globs.is_match(candidate) || self.literals.iter().any(|p| candidate.ends_with(p.as_str()))
    }

    /// Match either the bare file name or the full path.
    ///
    /// This is the one rule used for both file and directory exclusion.
    pub fn matches_path(&self, path: &Path) -> bool {
        if self.literals.is_empty() {
            return false;
        }
        if let Some(name) = path.file_name() {
            if self.is_match(&name.to_string_lossy()) {
                return true;
            }
        }
        self.is_match(&path.to_string_lossy())
    }

    /// Combine several sets into one
    pub fn merged<'a>(sets: impl IntoIterator<Item = &'a PatternSet>) -> Self {
        Self::new(sets.into_iter().flat_map(|s| s.literals.iter()))
    }
}

/// One-off pattern test without keeping a compiled set around
pub fn matches<S: AsRef<str>>(candidate: &str, patterns: &[S]) -> bool {
    PatternSet::new(patterns).is_match(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_glob_match() {
        let set = PatternSet::new(["*.bin", "data_??.csv", "[ab].txt"]);
        assert!(set.is_match("b.bin"));
        assert!(set.is_match("data_01.csv"));
        assert!(set.is_match("a.txt"));
        assert!(!set.is_match("c.txt"));
        assert!(!set.is_match("data_1.csv"));
    }

    #[test]
    fn test_suffix_fallback() {
        let set = PatternSet::new([".pyc", "node_modules"]);
        assert!(set.is_match("module.pyc"));
        assert!(set.is_match("/repo/web/node_modules"));
        assert!(!set.is_match("module.py"));
    }

    #[test]
    fn test_star_crosses_separator() {
        let set = PatternSet::new(["*.log"]);
        assert!(set.is_match("/var/tmp/run.log"));
    }

    #[test]
    fn test_matches_path_name_or_full_path() {
        let set = PatternSet::new(["build*", "*/generated/*"]);
        assert!(set.matches_path(&PathBuf::from("/repo/build-out")));
        assert!(set.matches_path(&PathBuf::from("/repo/generated/x.rs")));
        assert!(!set.matches_path(&PathBuf::from("/repo/src/main.rs")));
    }

    #[test]
    fn test_empty_patterns_match_nothing() {
        let set = PatternSet::new(["", ""]);
        assert!(set.is_empty());
        assert!(!set.is_match("anything"));
        assert!(!PatternSet::empty().matches_path(Path::new("/x")));
    }

    #[test]
    fn test_invalid_glob_still_suffix_matches() {
        let set = PatternSet::new(["[unclosed"]);
        assert!(set.is_match("file[unclosed"));
        assert!(!set.is_match("file"));
    }

    #[test]
    fn test_merged_dedups() {
        let a = PatternSet::new(["*.bin", ".git"]);
        let b = PatternSet::new([".git", "*.o"]);
        let merged = PatternSet::merged([&a, &b]);
        assert_eq!(merged.len(), 3);
        assert!(merged.is_match("x.o"));
    }

    #[test]
    fn test_matches_free_fn() {
        assert!(matches("a.bin", &["*.bin"]));
        assert!(!matches("a.txt", &["*.bin"]));
    }
}
