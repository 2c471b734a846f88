//! Cached breadth-first walker producing the project's indexable files.
//!
//! The walker keeps a [`TreeCache`] of directory listings across calls to
//! [`DirectoryTree::items`]. A directory whose mtime did not move since its
//! listing was cached is not re-listed; when a cached directory turns out not
//! to be a directory anymore, its whole cached subtree is evicted and the
//! path is classified again.

pub mod cache;

pub use cache::{EntryKind, EntryType, TreeCache};

use crate::utils::pattern::PatternSet;
use cache::{DirListing, classify};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// One root folder of a project, with its merged exclusion sets
#[derive(Debug, Clone)]
pub struct RootSpec {
    pub path: PathBuf,
    pub follow_symlinks: bool,
    pub file_excludes: PatternSet,
    pub dir_excludes: PatternSet,
}

impl RootSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            follow_symlinks: false,
            file_excludes: PatternSet::empty(),
            dir_excludes: PatternSet::empty(),
        }
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn file_excludes(mut self, patterns: PatternSet) -> Self {
        self.file_excludes = patterns;
        self
    }

    pub fn dir_excludes(mut self, patterns: PatternSet) -> Self {
        self.dir_excludes = patterns;
        self
    }
}

/// Result of a walk: paths in traversal order plus a membership index
#[derive(Debug, Default)]
pub struct TrackedFiles {
    paths: Vec<PathBuf>,
    lookup: FxHashSet<PathBuf>,
}

impl TrackedFiles {
    fn from_paths(paths: Vec<PathBuf>) -> Self {
        let lookup = paths.iter().cloned().collect();
        Self { paths, lookup }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lookup.contains(path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

/// Stateful, cached walker over a project's roots
pub struct DirectoryTree {
    roots: RwLock<Vec<RootSpec>>,
    cache: Mutex<TreeCache>,
    items: RwLock<Arc<TrackedFiles>>,
}

impl DirectoryTree {
    pub fn new(roots: Vec<RootSpec>) -> Self {
        Self {
            roots: RwLock::new(roots),
            cache: Mutex::new(TreeCache::new()),
            items: RwLock::new(Arc::new(TrackedFiles::default())),
        }
    }

    /// Replace the root list; the listing cache is kept
    pub fn set_roots(&self, roots: Vec<RootSpec>) {
        *self.roots.write().unwrap_or_else(|e| e.into_inner()) = roots;
    }

    pub fn roots(&self) -> Vec<RootSpec> {
        self.roots.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Result of the last walk, without walking
    pub fn cached_items(&self) -> Arc<TrackedFiles> {
        self.items.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether `path` was part of the last walk
    pub fn is_tracked(&self, path: &Path) -> bool {
        self.cached_items().contains(path)
    }

    /// Number of cached directory listings
    pub fn cached_dirs(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Walk every root and return the current set of indexable files
    pub fn items(&self) -> Arc<TrackedFiles> {
        let roots = self.roots();
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());

        let mut walk = Walk {
            cache: &mut cache,
            visited: FxHashSet::default(),
            items: Vec::new(),
            seen_files: FxHashSet::default(),
        };
        for root in &roots {
            walk.root(root);
        }

        let tracked = Arc::new(TrackedFiles::from_paths(walk.items));
        drop(cache);

        *self.items.write().unwrap_or_else(|e| e.into_inner()) = tracked.clone();
        tracked
    }
}

/// State of one `items()` call
struct Walk<'a> {
    cache: &'a mut TreeCache,
    /// Canonical paths of expanded directories
    visited: FxHashSet<PathBuf>,
    items: Vec<PathBuf>,
    seen_files: FxHashSet<PathBuf>,
}

impl Walk<'_> {
    fn root(&mut self, root: &RootSpec) {
        let canonical = match fs::canonicalize(&root.path) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("skipping root {}: {}", root.path.display(), e);
                return;
            }
        };
        if !canonical.is_dir() {
            log::warn!("skipping root {}: not a directory", root.path.display());
            return;
        }
        if !self.visited.insert(canonical.clone()) {
            return;
        }

        // (walk path, canonical path)
        let mut queue: VecDeque<(PathBuf, PathBuf)> = VecDeque::new();
        queue.push_back((canonical.clone(), canonical));

        while let Some((dir, canonical_dir)) = queue.pop_front() {
            let children = match self.list(&dir) {
                Listed::Children(children) => children,
                Listed::NotADirectory => {
                    // Replaced by a file since it was queued
                    if let Some(ty) = classify(&dir) {
                        if ty.kind == EntryKind::File && (root.follow_symlinks || !ty.is_symlink) {
                            self.push_file(root, dir);
                        }
                    }
                    continue;
                }
                Listed::Gone => continue,
            };

            for (path, ty) in children {
                if ty.is_symlink && !root.follow_symlinks {
                    continue;
                }
                match ty.kind {
                    EntryKind::File => self.push_file(root, path),
                    EntryKind::Dir => {
                        if root.dir_excludes.matches_path(&path) {
                            continue;
                        }
                        let canonical_child = if ty.is_symlink {
                            match fs::canonicalize(&path) {
                                Ok(p) => p,
                                Err(_) => continue,
                            }
                        } else {
                            match path.file_name() {
                                Some(name) => canonical_dir.join(name),
                                None => continue,
                            }
                        };
                        if self.visited.insert(canonical_child.clone()) {
                            queue.push_back((path, canonical_child));
                        }
                    }
                }
            }
        }
    }

    fn push_file(&mut self, root: &RootSpec, path: PathBuf) {
        if root.file_excludes.matches_path(&path) {
            return;
        }
        if self.seen_files.insert(path.clone()) {
            self.items.push(path);
        }
    }

    /// Children of `dir`, from the cache when the directory did not change
    fn list(&mut self, dir: &Path) -> Listed {
        let meta = match fs::metadata(dir) {
            Ok(m) => m,
            Err(_) => {
                self.evict(dir);
                return Listed::Gone;
            }
        };
        if !meta.is_dir() {
            self.evict(dir);
            return Listed::NotADirectory;
        }
        let mtime = meta.modified().ok();

        if let Some(listing) = self.cache.get(dir) {
            if listing.is_fresh(mtime) {
                return Listed::Children(listing.children.clone());
            }
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.evict(dir);
                return match e.kind() {
                    io::ErrorKind::NotADirectory => Listed::NotADirectory,
                    io::ErrorKind::NotFound => Listed::Gone,
                    _ => {
                        log::debug!("cannot list {}: {}", dir.display(), e);
                        Listed::Gone
                    }
                };
            }
        };

        let previous = self.cache.get(dir).map(|l| {
            l.child_types()
                .into_iter()
                .map(|(p, t)| (p.to_path_buf(), t))
                .collect::<rustc_hash::FxHashMap<PathBuf, EntryType>>()
        });

        let mut children = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let cached = previous.as_ref().and_then(|m| m.get(&path).copied());
            let ty = match (cached, entry.file_type()) {
                (Some(ty), Ok(ft)) if ty.agrees_with(&ft) => Some(ty),
                (Some(ty), _) => {
                    if ty.kind == EntryKind::Dir {
                        self.evict(&path);
                    }
                    classify(&path)
                }
                (None, _) => classify(&path),
            };
            if let Some(ty) = ty {
                children.push((path, ty));
            }
        }
        children.sort_by(|a, b| a.0.cmp(&b.0));

        self.cache
            .insert(dir.to_path_buf(), DirListing::new(mtime, children.clone()));
        Listed::Children(children)
    }

    fn evict(&mut self, dir: &Path) {
        let evicted = self.cache.invalidate(dir);
        if evicted > 0 {
            log::debug!("evicted {} cached listings under {}", evicted, dir.display());
        }
    }
}

enum Listed {
    Children(Vec<(PathBuf, EntryType)>),
    NotADirectory,
    Gone,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.txt"), "hello world").unwrap();
        fs::write(root.join("b.bin"), "\0\0").unwrap();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::write(root.join("src/lib.rs"), "fn x() {}").unwrap();
        fs::write(root.join("src/nested/deep.rs"), "fn y() {}").unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        dir
    }

    fn names(tracked: &TrackedFiles, root: &Path) -> Vec<String> {
        let root = fs::canonicalize(root).unwrap();
        let mut names: Vec<String> = tracked
            .iter()
            .map(|p| p.strip_prefix(&root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_items_applies_excludes() {
        let dir = project();
        let tree = DirectoryTree::new(vec![
            RootSpec::new(dir.path())
                .file_excludes(PatternSet::new(["*.bin"]))
                .dir_excludes(PatternSet::new([".git"])),
        ]);

        let items = tree.items();
        assert_eq!(
            names(&items, dir.path()),
            vec!["a.txt", "src/lib.rs", "src/nested/deep.rs"]
        );
    }

    #[test]
    fn test_items_breadth_first() {
        let dir = project();
        let tree = DirectoryTree::new(vec![RootSpec::new(dir.path())]);
        let items = tree.items();
        let pos = |suffix: &str| items.iter().position(|p| p.ends_with(suffix)).unwrap();
        assert!(pos("a.txt") < pos("src/lib.rs"));
        assert!(pos("src/lib.rs") < pos("src/nested/deep.rs"));
    }

    #[test]
    fn test_cached_items_without_walking() {
        let dir = project();
        let tree = DirectoryTree::new(vec![RootSpec::new(dir.path())]);
        assert!(tree.cached_items().is_empty());

        let items = tree.items();
        let a = fs::canonicalize(dir.path()).unwrap().join("a.txt");
        assert!(tree.is_tracked(&a));

        fs::remove_file(&a).unwrap();
        // Not re-walked: still reports the last result
        assert!(tree.is_tracked(&a));
        assert_eq!(tree.cached_items().len(), items.len());

        tree.items();
        assert!(!tree.is_tracked(&a));
    }

    #[test]
    fn test_new_and_removed_files_are_seen() {
        let dir = project();
        let tree = DirectoryTree::new(vec![RootSpec::new(dir.path())]);
        tree.items();

        fs::write(dir.path().join("src/new.rs"), "new").unwrap();
        fs::remove_file(dir.path().join("src/lib.rs")).unwrap();

        let items = tree.items();
        let names = names(&items, dir.path());
        assert!(names.contains(&"src/new.rs".to_string()));
        assert!(!names.contains(&"src/lib.rs".to_string()));
    }

    #[test]
    fn test_dir_replaced_by_file() {
        let dir = project();
        let tree = DirectoryTree::new(vec![RootSpec::new(dir.path())]);
        tree.items();
        assert!(tree.cached_dirs() >= 3);

        fs::remove_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src"), "now a file").unwrap();

        let items = tree.items();
        let names = names(&items, dir.path());
        assert!(names.contains(&"src".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("src/")));
    }

    #[test]
    fn test_duplicate_roots_walked_once() {
        let dir = project();
        let tree = DirectoryTree::new(vec![
            RootSpec::new(dir.path()),
            RootSpec::new(dir.path().join("src")),
        ]);
        let items = tree.items();
        let lib_count = items.iter().filter(|p| p.ends_with("src/lib.rs")).count();
        assert_eq!(lib_count, 1);
    }

    #[test]
    fn test_missing_root_is_skipped() {
        let dir = project();
        let tree = DirectoryTree::new(vec![
            RootSpec::new(dir.path().join("missing")),
            RootSpec::new(dir.path()),
        ]);
        assert!(!tree.items().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_followed_only_when_enabled() {
        let dir = project();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("linked.txt"), "linked").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("ext")).unwrap();
        // A cycle back to the root
        std::os::unix::fs::symlink(dir.path(), dir.path().join("src/loop")).unwrap();

        let plain = DirectoryTree::new(vec![RootSpec::new(dir.path())]);
        let items = plain.items();
        assert!(!items.iter().any(|p| p.ends_with("linked.txt")));

        let following = DirectoryTree::new(vec![RootSpec::new(dir.path()).follow_symlinks(true)]);
        let items = following.items();
        assert!(items.iter().any(|p| p.ends_with("ext/linked.txt")));
        assert_eq!(items.iter().filter(|p| p.ends_with("a.txt")).count(), 1);
    }
}
