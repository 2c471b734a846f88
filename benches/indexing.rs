//! End-to-end indexing benchmarks over a generated project tree.
//!
//! Run with: `cargo bench --bench indexing`
//! Save baseline: `cargo bench -- --save-baseline main`
//! Compare: `cargo bench -- --baseline main`
//!
//! Set `GRAMDEX_BENCH_REPO` to also index a real checkout.

use criterion::{Criterion, criterion_group, criterion_main};
use gramdex::config::{ProjectConfig, RootConfig};
use gramdex::content::FsContent;
use gramdex::indexer::{IndexEvent, Indexer};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn no_events(_: &IndexEvent) {}

/// 2000 files spread over 20 directories
fn create_tree() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for d in 0..20 {
        let sub = dir.path().join("src").join(format!("module_{}", d));
        fs::create_dir_all(&sub).expect("Failed to create dir");
        for f in 0..100 {
            let body: String = (0..50)
                .map(|line| format!("let value_{}_{} = compute({}, \"{}\");\n", d, f, line, f * line))
                .collect();
            fs::write(sub.join(format!("file_{}.rs", f)), body).expect("Failed to write file");
        }
    }
    dir
}

fn project(root: &Path, index_dir: &Path) -> ProjectConfig {
    let mut config = ProjectConfig::new("bench", index_dir).with_root(RootConfig::new(root));
    config.dir_exclude_patterns = vec![".git".to_string(), "target".to_string()];
    config
}

fn bench_generated(c: &mut Criterion) {
    let tree = create_tree();
    let index_dir = tree.path().join("indexes");
    let config = project(&tree.path().join("src"), &index_dir);
    let content = FsContent::default();

    let mut group = c.benchmark_group("indexing");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(30));

    group.bench_function("full_2k_files", |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;
            for _ in 0..iters {
                let indexer = Indexer::default();
                let start = Instant::now();
                indexer.rebuild(&config, &content, &no_events).expect("rebuild failed");
                total += start.elapsed();
            }
            total
        })
    });

    // Nothing changed: stat every file, commit nothing
    let indexer = Indexer::default();
    indexer.full_reindex(&config, &content, &no_events).expect("index failed");
    group.bench_function("noop_2k_files", |b| {
        b.iter(|| indexer.full_reindex(&config, &content, &no_events).expect("index failed"))
    });

    // One saved file: writes a segment holding only that file
    let saved = tree
        .path()
        .join("src/module_0/file_0.rs")
        .canonicalize()
        .expect("Failed to resolve file");
    let mut round = 0u64;
    group.bench_function("update_one_of_2k_files", |b| {
        b.iter(|| {
            round += 1;
            fs::write(&saved, format!("let saved = {};\n", round)).expect("Failed to write file");
            indexer
                .incremental_update(&config, &saved, &content)
                .expect("update failed")
        })
    });

    group.finish();
}

fn bench_repo(c: &mut Criterion) {
    let Some(repo) = std::env::var_os("GRAMDEX_BENCH_REPO").map(PathBuf::from) else {
        eprintln!("Skipping repo benchmark - GRAMDEX_BENCH_REPO not set");
        return;
    };
    if !repo.exists() {
        eprintln!("Skipping repo benchmark - path not found: {}", repo.display());
        return;
    }

    let index_dir = TempDir::new().expect("Failed to create temp dir");
    let config = project(&repo, index_dir.path());
    let content = FsContent::default();

    let mut group = c.benchmark_group("indexing");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(300));

    group.bench_function("repo_full", |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;
            for _ in 0..iters {
                let indexer = Indexer::default();
                let start = Instant::now();
                indexer.rebuild(&config, &content, &no_events).expect("rebuild failed");
                total += start.elapsed();
            }
            total
        })
    });

    group.finish();
}

criterion_group!(benches, bench_generated, bench_repo);
criterion_main!(benches);
