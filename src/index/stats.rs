use crate::index::{IndexMeta, IndexStore};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// One store found under an index directory
#[derive(Debug, Clone)]
pub struct IndexListing {
    pub name: String,
    pub path: PathBuf,
    /// None when meta.json is missing or unreadable
    pub meta: Option<IndexMeta>,
}

/// Display index statistics
pub fn show_stats(store: &IndexStore) -> Result<()> {
    let snapshot = store.snapshot();
    let meta = snapshot.meta();

    println!("Index Statistics");
    println!("================");
    println!();
    println!("Name:             {}", store.name());
    println!("Index location:   {}", store.index_path().display());
    println!("Index version:    {}", meta.version);
    println!("Generation:       {}", meta.generation);
    println!("File count:       {}", snapshot.file_count());
    println!("Document count:   {}", snapshot.doc_count());
    println!("Distinct grams:   {}", snapshot.gram_count());
    println!("Segments:         {}", snapshot.segments().len());
    if snapshot.dead_doc_count() > 0 {
        println!("Tombstoned docs:  {}", snapshot.dead_doc_count());
    }

    let chunked = snapshot
        .documents()
        .filter(|doc| doc.line_offset > 0)
        .count();
    if chunked > 0 {
        println!("Extra chunks:     {}", chunked);
    }

    if let Ok(size) = dir_size(store.index_path()) {
        println!();
        println!("Index size:       {}", format_size(size));
    }

    println!();
    println!("Created:          {}", format_timestamp(meta.created_at));
    println!("Updated:          {}", format_timestamp(meta.updated_at));

    Ok(())
}

/// Every store directory under `index_dir`, sorted by name
pub fn find_indexes(index_dir: &Path) -> Result<Vec<IndexListing>> {
    let mut listings = Vec::new();
    if !index_dir.is_dir() {
        return Ok(listings);
    }

    for entry in fs::read_dir(index_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let meta = fs::read(path.join("meta.json"))
            .ok()
            .and_then(|bytes| serde_json::from_slice::<IndexMeta>(&bytes).ok());
        listings.push(IndexListing {
            name: entry.file_name().to_string_lossy().into_owned(),
            path,
            meta,
        });
    }

    listings.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listings)
}

/// List all stores under `index_dir`
pub fn list_indexes(index_dir: &Path) -> Result<()> {
    let listings = find_indexes(index_dir)?;

    if listings.is_empty() {
        println!("No indexes found in {}.", index_dir.display());
        return Ok(());
    }

    println!("Indexes");
    println!("=======");
    println!();

    for listing in listings {
        match &listing.meta {
            Some(meta) => {
                let status = match meta.incompatibility() {
                    Some(reason) => format!(" [needs rebuild: {}]", reason),
                    None => String::new(),
                };
                println!("  {}{}", listing.name, status);
                println!(
                    "    {} files, {} documents, updated {}",
                    meta.file_count,
                    meta.doc_count,
                    format_timestamp(meta.updated_at)
                );
            }
            None => println!("  {} [unreadable]", listing.name),
        }
        println!("    Index: {}", listing.path.display());
        println!();
    }

    Ok(())
}

/// Calculate directory size recursively
fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut size = 0;
    if path.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                size += entry.metadata()?.len();
            } else if path.is_dir() {
                size += dir_size(&path)?;
            }
        }
    }
    Ok(size)
}

/// Format byte size to human readable
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format unix timestamp
fn format_timestamp(ts: u64) -> String {
    use std::time::{Duration, UNIX_EPOCH};
    let datetime = UNIX_EPOCH + Duration::from_secs(ts);
    format!("{:?}", datetime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::StoreConfig;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_find_indexes() {
        let dir = tempfile::tempdir().unwrap();
        IndexStore::open_or_create(dir.path(), "beta", StoreConfig::default()).unwrap();
        IndexStore::open_or_create(dir.path(), "alpha", StoreConfig::default()).unwrap();
        fs::create_dir(dir.path().join("broken")).unwrap();
        fs::write(dir.path().join("stray.txt"), "x").unwrap();

        let listings = find_indexes(dir.path()).unwrap();
        let names: Vec<&str> = listings.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "broken"]);
        assert!(listings[0].meta.is_some());
        assert!(listings[2].meta.is_none());
    }

    #[test]
    fn test_missing_index_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_indexes(&dir.path().join("none")).unwrap().is_empty());
    }
}
