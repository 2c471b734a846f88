//! Tests driving the gramdex binary through a project file.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

struct Project {
    dir: TempDir,
    project_file: PathBuf,
}

impl Project {
    fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Project file pointing at ./src, with its index under ./indexes
fn setup() -> Project {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(&src).unwrap();

    fs::write(
        src.join("main.rs"),
        "fn main() {\n    println!(\"Hello, world!\");\n}\n",
    )
    .unwrap();
    fs::write(src.join("lib.rs"), "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n").unwrap();
    fs::write(src.join("notes.tmp"), "hello from a temp file\n").unwrap();

    let project_file = dir.path().join("project.json");
    fs::write(
        &project_file,
        r#"{
    "project_name": "cli-test",
    "index_directory": "indexes",
    "roots": [{ "path": "src" }],
    "file_exclude_patterns": ["*.tmp"]
}"#,
    )
    .unwrap();

    Project { dir, project_file }
}

/// Run gramdex with the app data dir redirected into the project
fn run(project: &Project, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_gramdex"))
        .args(args)
        .env("XDG_DATA_HOME", project.path().join("data"))
        .env("HOME", project.path())
        .output()
        .expect("Failed to run gramdex");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn project_arg(project: &Project) -> String {
    project.project_file.to_string_lossy().into_owned()
}

#[test]
fn test_index_then_search_files() {
    let project = setup();
    let file = project_arg(&project);

    let (out, err, ok) = run(&project, &["index", "--project", &file]);
    assert!(ok, "index failed: {}", err);
    assert!(out.contains("Indexed 2 files"), "unexpected output: {}", out);

    let (out, err, ok) = run(&project, &["search", "HELLO", "--project", &file, "--no-color"]);
    assert!(ok, "search failed: {}", err);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2, "unexpected output: {}", out);
    assert!(lines[0].ends_with("main.rs"));
    assert_eq!(lines[1], "found: 1 files");
}

#[test]
fn test_search_lines() {
    let project = setup();
    let file = project_arg(&project);
    run(&project, &["index", "--project", &file]);

    let (out, _, ok) = run(&project, &["search", "a + b", "--lines", "--project", &file, "--no-color"]);
    assert!(ok);
    let first = out.lines().next().unwrap_or_default();
    assert!(first.ends_with("lib.rs:2:    a + b"), "unexpected output: {}", out);
}

#[test]
fn test_search_without_index_fails() {
    let project = setup();
    let file = project_arg(&project);

    let (_, err, ok) = run(&project, &["search", "main", "--project", &file]);
    assert!(!ok);
    assert!(err.contains("gramdex index"), "unexpected error: {}", err);
}

#[test]
fn test_update_and_remove() {
    let project = setup();
    let file = project_arg(&project);
    run(&project, &["index", "--project", &file]);

    let main_rs = project.path().join("src").join("main.rs");
    fs::write(&main_rs, "fn main() {\n    run_updated_code();\n}\n").unwrap();
    let (out, err, ok) = run(&project, &["update", main_rs.to_str().unwrap(), "--project", &file]);
    assert!(ok, "update failed: {}", err);
    assert!(out.contains("Updated"), "unexpected output: {}", out);

    let (out, _, _) = run(&project, &["search", "updated_code", "--project", &file, "--no-color"]);
    assert!(out.contains("found: 1 files"));

    let (out, _, ok) = run(&project, &["stats", "--project", &file]);
    assert!(ok);
    assert!(out.contains("File count:       2"), "unexpected output: {}", out);
    assert!(out.contains("Segments:         2"), "unexpected output: {}", out);

    let (out, err, ok) = run(&project, &["compact", "--project", &file]);
    assert!(ok, "compact failed: {}", err);
    assert!(out.contains("Compacted 2 segments into 1"), "unexpected output: {}", out);
    let (out, _, _) = run(&project, &["search", "updated_code", "--project", &file, "--no-color"]);
    assert!(out.contains("found: 1 files"));

    let (_, _, ok) = run(&project, &["remove", "--project", &file]);
    assert!(ok);
    let (_, _, ok) = run(&project, &["search", "main", "--project", &file]);
    assert!(!ok);
}
