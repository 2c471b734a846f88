use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fs::{self, FileType};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Listings younger than this are not trusted on the next walk: a change
/// landing in the same mtime tick would otherwise go unnoticed.
const RACY_LISTING_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// Classification of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryType {
    pub kind: EntryKind,
    pub is_symlink: bool,
}

impl EntryType {
    /// Whether a fresh `read_dir` file type still agrees with this entry.
    ///
    /// Symlink targets are not visible through the listing, so only the
    /// link flag is compared for them.
    pub fn agrees_with(&self, file_type: &FileType) -> bool {
        if file_type.is_symlink() {
            return self.is_symlink;
        }
        !self.is_symlink
            && match self.kind {
                EntryKind::File => file_type.is_file(),
                EntryKind::Dir => file_type.is_dir(),
            }
    }
}

/// Stat a path and classify it. Returns `None` for vanished paths, dangling
/// symlinks and special files.
pub fn classify(path: &Path) -> Option<EntryType> {
    let meta = fs::symlink_metadata(path).ok()?;
    let is_symlink = meta.file_type().is_symlink();
    let meta = if is_symlink {
        fs::metadata(path).ok()?
    } else {
        meta
    };

    let kind = if meta.is_file() {
        EntryKind::File
    } else if meta.is_dir() {
        EntryKind::Dir
    } else {
        return None;
    };

    Some(EntryType { kind, is_symlink })
}

/// Cached children of one directory
#[derive(Debug, Clone, Default)]
pub struct DirListing {
    /// Directory mtime the listing was taken at; `None` forces a re-list
    pub mtime: Option<SystemTime>,
    pub children: Vec<(PathBuf, EntryType)>,
}

impl DirListing {
    pub fn new(mtime: Option<SystemTime>, children: Vec<(PathBuf, EntryType)>) -> Self {
        let trusted = mtime.filter(|m| {
            SystemTime::now()
                .duration_since(*m)
                .map(|age| age >= RACY_LISTING_WINDOW)
                .unwrap_or(false)
        });
        Self {
            mtime: trusted,
            children,
        }
    }

    pub fn is_fresh(&self, mtime: Option<SystemTime>) -> bool {
        self.mtime.is_some() && self.mtime == mtime
    }

    pub fn child_types(&self) -> FxHashMap<&Path, EntryType> {
        self.children
            .iter()
            .map(|(p, t)| (p.as_path(), *t))
            .collect()
    }
}

/// Directory path -> cached listing.
///
/// Kept in an ordered map: `Path` ordering is component-wise, so a
/// directory and all of its descendants form one contiguous key range.
#[derive(Debug, Default)]
pub struct TreeCache {
    dirs: BTreeMap<PathBuf, DirListing>,
}

impl TreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dir: &Path) -> Option<&DirListing> {
        self.dirs.get(dir)
    }

    pub fn insert(&mut self, dir: PathBuf, listing: DirListing) {
        self.dirs.insert(dir, listing);
    }

    /// Drop the listing of `dir` and of every directory below it.
    /// Returns the number of evicted listings.
    pub fn invalidate(&mut self, dir: &Path) -> usize {
        let stale: Vec<PathBuf> = self
            .dirs
            .range::<Path, _>((std::ops::Bound::Included(dir), std::ops::Bound::Unbounded))
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(dir))
            .cloned()
            .collect();

        for key in &stale {
            self.dirs.remove(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> DirListing {
        DirListing {
            mtime: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_invalidate_is_prefix_scoped() {
        let mut cache = TreeCache::new();
        for dir in ["/r", "/r/a", "/r/a/b", "/r/a/b/c", "/r/a-sibling", "/r/ab", "/r/z"] {
            cache.insert(PathBuf::from(dir), listing());
        }

        let evicted = cache.invalidate(Path::new("/r/a"));
        assert_eq!(evicted, 3);
        assert!(cache.get(Path::new("/r/a")).is_none());
        assert!(cache.get(Path::new("/r/a/b/c")).is_none());
        assert!(cache.get(Path::new("/r/a-sibling")).is_some());
        assert!(cache.get(Path::new("/r/ab")).is_some());
        assert!(cache.get(Path::new("/r/z")).is_some());
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_invalidate_missing_dir() {
        let mut cache = TreeCache::new();
        cache.insert(PathBuf::from("/r/b"), listing());
        assert_eq!(cache.invalidate(Path::new("/r/a")), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_recent_listing_not_trusted() {
        let now = SystemTime::now();
        let fresh = DirListing::new(Some(now), Vec::new());
        assert!(!fresh.is_fresh(Some(now)));

        let old = now - Duration::from_secs(60);
        let settled = DirListing::new(Some(old), Vec::new());
        assert!(settled.is_fresh(Some(old)));
        assert!(!settled.is_fresh(Some(now)));
    }

    #[test]
    fn test_classify() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "x").unwrap();

        assert_eq!(
            classify(&file),
            Some(EntryType {
                kind: EntryKind::File,
                is_symlink: false
            })
        );
        assert_eq!(classify(dir.path()).map(|t| t.kind), Some(EntryKind::Dir));
        assert_eq!(classify(&dir.path().join("missing")), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        fs::create_dir(&target).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let ty = classify(&link).unwrap();
        assert_eq!(ty.kind, EntryKind::Dir);
        assert!(ty.is_symlink);

        let dangling = dir.path().join("dangling");
        std::os::unix::fs::symlink(dir.path().join("nope"), &dangling).unwrap();
        assert_eq!(classify(&dangling), None);
    }
}
