//! Resolved project settings.
//!
//! A project file is plain JSON:
//!
//! ```json
//! {
//!   "project_name": "web",
//!   "index_directory": "/home/me/.cache/gramdex",
//!   "roots": [
//!     { "path": ".", "dir_exclude_patterns": ["node_modules"] },
//!     { "path": "../shared", "follow_symlinks": true }
//!   ],
//!   "binary_patterns": ["*.png"],
//!   "file_exclude_patterns": ["*.min.js"],
//!   "dir_exclude_patterns": [".git"]
//! }
//! ```

use crate::error::{Error, Result};
use crate::tree::RootSpec;
use crate::utils::{PatternSet, default_index_dir, project_name_for, sanitize_name};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

const MAX_STORE_NAME_CHARS: usize = 64;

/// One root folder as written in a project file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    pub path: PathBuf,

    #[serde(default)]
    pub follow_symlinks: bool,

    #[serde(default)]
    pub file_exclude_patterns: Vec<String>,

    #[serde(default)]
    pub dir_exclude_patterns: Vec<String>,

    /// Files never worth reading (images, archives); excluded like files
    #[serde(default)]
    pub binary_patterns: Vec<String>,
}

impl RootConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            follow_symlinks: false,
            file_exclude_patterns: Vec::new(),
            dir_exclude_patterns: Vec::new(),
            binary_patterns: Vec::new(),
        }
    }
}

/// Everything the indexer needs to know about one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project_name: String,

    /// Parent directory of the project's index; created when absent
    #[serde(default)]
    pub index_directory: Option<PathBuf>,

    #[serde(default)]
    pub roots: Vec<RootConfig>,

    #[serde(default)]
    pub binary_patterns: Vec<String>,

    #[serde(default)]
    pub file_exclude_patterns: Vec<String>,

    #[serde(default)]
    pub dir_exclude_patterns: Vec<String>,
}

impl ProjectConfig {
    pub fn new(project_name: impl Into<String>, index_directory: impl Into<PathBuf>) -> Self {
        Self {
            project_name: project_name.into(),
            index_directory: Some(index_directory.into()),
            roots: Vec::new(),
            binary_patterns: Vec::new(),
            file_exclude_patterns: Vec::new(),
            dir_exclude_patterns: Vec::new(),
        }
    }

    pub fn with_root(mut self, root: RootConfig) -> Self {
        self.roots.push(root);
        self
    }

    /// Single-root project for a directory, indexed under the app data dir
    pub fn for_directory(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .map_err(|e| Error::Config(format!("cannot resolve {}: {}", root.display(), e)))?;
        let index_directory =
            default_index_dir().map_err(|e| Error::Config(format!("{:#}", e)))?;

        Ok(Self::new(project_name_for(&root), index_directory).with_root(RootConfig::new(root)))
    }

    /// Load a project file; relative root paths resolve against its directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config: ProjectConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid project file {}: {}", path.display(), e)))?;

        let base = path.parent().unwrap_or(Path::new("."));
        for root in &mut config.roots {
            if root.path.is_relative() {
                root.path = base.join(&root.path);
            }
        }
        if let Some(dir) = &mut config.index_directory {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_name.trim().is_empty() {
            return Err(Error::Config("project name is empty".to_string()));
        }
        if self.index_directory.is_none() {
            return Err(Error::Config(format!(
                "project '{}' has no index directory",
                self.project_name
            )));
        }
        Ok(())
    }

    /// The index directory, created when absent
    pub fn index_directory(&self) -> Result<PathBuf> {
        self.validate()?;
        let dir = self
            .index_directory
            .clone()
            .ok_or_else(|| Error::Config("missing index directory".to_string()))?;
        fs::create_dir_all(&dir).map_err(|e| {
            Error::Config(format!("cannot create index directory {}: {}", dir.display(), e))
        })?;
        Ok(dir)
    }

    /// Name of the on-disk store for this project.
    ///
    /// Names that sanitizing changed get a hash of the original appended, so
    /// "my app" and "my_app" never share a store.
    pub fn store_name(&self) -> String {
        let sanitized = sanitize_name(&self.project_name, MAX_STORE_NAME_CHARS);
        if sanitized == self.project_name {
            return sanitized;
        }

        let mut hasher = DefaultHasher::new();
        self.project_name.hash(&mut hasher);
        format!(
            "{}-{:08x}",
            sanitize_name(&self.project_name, MAX_STORE_NAME_CHARS - 9),
            hasher.finish() as u32
        )
    }

    /// Walker roots with the global and binary patterns merged in
    pub fn root_specs(&self) -> Vec<RootSpec> {
        self.roots
            .iter()
            .map(|root| {
                let file_excludes = PatternSet::new(
                    self.file_exclude_patterns
                        .iter()
                        .chain(&self.binary_patterns)
                        .chain(&root.file_exclude_patterns)
                        .chain(&root.binary_patterns),
                );
                let dir_excludes = PatternSet::new(
                    self.dir_exclude_patterns
                        .iter()
                        .chain(&root.dir_exclude_patterns),
                );

                RootSpec::new(root.path.clone())
                    .follow_symlinks(root.follow_symlinks)
                    .file_excludes(file_excludes)
                    .dir_excludes(dir_excludes)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_file_resolves_relative_roots() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("web.json");
        fs::write(
            &project,
            r#"{
                "project_name": "web",
                "index_directory": "idx",
                "roots": [{ "path": "src" }, { "path": "/abs/lib", "follow_symlinks": true }],
                "dir_exclude_patterns": [".git"]
            }"#,
        )
        .unwrap();

        let config = ProjectConfig::from_file(&project).unwrap();
        assert_eq!(config.project_name, "web");
        assert_eq!(config.roots[0].path, dir.path().join("src"));
        assert_eq!(config.roots[1].path, PathBuf::from("/abs/lib"));
        assert!(config.roots[1].follow_symlinks);
        assert_eq!(config.index_directory, Some(dir.path().join("idx")));
    }

    #[test]
    fn test_missing_index_directory_is_config_error() {
        let config = ProjectConfig {
            index_directory: None,
            ..ProjectConfig::new("p", "/tmp")
        };
        assert!(matches!(config.index_directory(), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_name_is_config_error() {
        let config = ProjectConfig::new("  ", "/tmp");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("bad.json");
        fs::write(&project, "{ not json").unwrap();
        assert!(matches!(ProjectConfig::from_file(&project), Err(Error::Config(_))));
        assert!(matches!(
            ProjectConfig::from_file(&dir.path().join("missing.json")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_index_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a").join("b");
        let config = ProjectConfig::new("p", &target);
        assert_eq!(config.index_directory().unwrap(), target);
        assert!(target.is_dir());
    }

    #[test]
    fn test_root_specs_merge_patterns() {
        let mut root = RootConfig::new("/r");
        root.file_exclude_patterns.push("*.log".to_string());
        let mut config = ProjectConfig::new("p", "/tmp").with_root(root);
        config.binary_patterns.push("*.bin".to_string());
        config.dir_exclude_patterns.push("target".to_string());

        let specs = config.root_specs();
        assert_eq!(specs.len(), 1);
        assert!(specs[0].file_excludes.matches_path(Path::new("/r/b.bin")));
        assert!(specs[0].file_excludes.matches_path(Path::new("/r/x.log")));
        assert!(!specs[0].file_excludes.matches_path(Path::new("/r/a.txt")));
        assert!(specs[0].dir_excludes.matches_path(Path::new("/r/target")));
    }

    #[test]
    fn test_store_name_is_sanitized() {
        assert_eq!(ProjectConfig::new("my_app", "/tmp").store_name(), "my_app");

        let spaced = ProjectConfig::new("my app", "/tmp").store_name();
        assert!(spaced.starts_with("my_app-"), "{}", spaced);
        assert_ne!(spaced, "my_app");
        assert_ne!(spaced, ProjectConfig::new("my/app", "/tmp").store_name());
        assert!(!ProjectConfig::new("my app/v2", "/tmp").store_name().contains('/'));
    }
}
