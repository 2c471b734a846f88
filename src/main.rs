use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use gramdex::config::ProjectConfig;
use gramdex::content::FsContent;
use gramdex::index::{IndexStore, stats};
use gramdex::indexer::{IndexEvent, Indexer, IndexerSettings};
use gramdex::output::{self, OutputOptions};
use gramdex::query::{QueryEngine, QueryLimits, SearchMode};
use gramdex::utils::progress;
use gramdex::utils::{AppConfig, default_index_dir};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "gramdex")]
#[command(about = "Incremental n-gram index and substring search for project trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Which project a command works on
#[derive(clap::Args)]
struct ProjectArgs {
    /// Project directory (single root, default settings)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Project file (JSON) with roots and exclusion patterns; overrides PATH
    #[arg(long)]
    project: Option<PathBuf>,
}

impl ProjectArgs {
    fn resolve(&self) -> Result<ProjectConfig> {
        let config = match &self.project {
            Some(file) => ProjectConfig::from_file(file)?,
            None => ProjectConfig::for_directory(&self.path)?,
        };
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the project's index up to date
    Index {
        #[command(flatten)]
        project: ProjectArgs,

        /// Discard the stored index and rebuild it from scratch
        #[arg(short, long)]
        rebuild: bool,
    },
    /// Re-index a single saved file
    Update {
        /// File to re-index
        file: PathBuf,

        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Search the index
    Search {
        /// Text to look for (case-insensitive)
        query: String,

        #[command(flatten)]
        project: ProjectArgs,

        /// Report every matching line instead of matching files
        #[arg(short, long)]
        lines: bool,

        /// Group matching lines under their file name
        #[arg(long)]
        heading: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
    /// Show index statistics
    Stats {
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// List all indexes in an index directory
    List {
        /// Index directory (defaults to the app data directory)
        #[arg(long)]
        index_dir: Option<PathBuf>,
    },
    /// Merge the index segments, dropping replaced file versions
    Compact {
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Remove a project's index
    Remove {
        #[command(flatten)]
        project: ProjectArgs,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let app = AppConfig::load()?;

    match cli.command {
        Commands::Index { project, rebuild } => {
            run_index(&app, &project.resolve()?, rebuild)?;
        }
        Commands::Update { file, project } => {
            run_update(&app, &project.resolve()?, &file)?;
        }
        Commands::Search {
            query,
            project,
            lines,
            heading,
            no_color,
        } => {
            let store = open_store(&app, &project.resolve()?)?;
            let mode = if lines {
                SearchMode::Lines
            } else {
                SearchMode::Files
            };
            let results = QueryEngine::new(QueryLimits::from(&app)).search(&store, &query, mode);
            output::print_results(
                &results,
                OutputOptions {
                    color: !no_color,
                    heading,
                    status: true,
                },
            )?;
        }
        Commands::Stats { project } => {
            let store = open_store(&app, &project.resolve()?)?;
            stats::show_stats(&store)?;
        }
        Commands::List { index_dir } => {
            let index_dir = match index_dir {
                Some(dir) => dir,
                None => default_index_dir()?,
            };
            stats::list_indexes(&index_dir)?;
        }
        Commands::Compact { project } => {
            let store = open_store(&app, &project.resolve()?)?;
            let segments = store.snapshot().segments().len();
            if store.compact()? {
                println!("Compacted {} segments into 1", segments);
            } else {
                println!("Nothing to compact.");
            }
        }
        Commands::Remove { project } => {
            let config = project.resolve()?;
            let index_dir = config.index_directory()?;
            let name = config.store_name();
            if !IndexStore::exists(&index_dir, &name) {
                bail!("no index found for project '{}'", config.project_name);
            }
            let path = index_dir.join(&name);
            fs::remove_dir_all(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
            println!("Removed index for: {}", config.project_name);
        }
    }

    Ok(())
}

fn open_store(app: &AppConfig, config: &ProjectConfig) -> Result<IndexStore> {
    let store = IndexStore::open(&config.index_directory()?, &config.store_name(), app.store_config())
        .with_context(|| format!("run `gramdex index` for project '{}' first", config.project_name))?;
    Ok(store)
}

fn run_index(app: &AppConfig, config: &ProjectConfig, rebuild: bool) -> Result<()> {
    let indexer = Indexer::new(IndexerSettings::from(app));
    let content = FsContent::new(app.max_file_size);

    println!("Indexing: {}", config.project_name);

    let progress_bar = progress::indexing_bar();
    let pb = progress_bar.clone();
    let observer = move |event: &IndexEvent| match event {
        IndexEvent::Started { total, .. } => {
            pb.set_length(*total as u64);
            pb.set_message("Processing files...");
        }
        IndexEvent::Progress(p) => pb.set_position(p.found as u64),
        IndexEvent::Finished { .. } => pb.finish_and_clear(),
    };

    let report = if rebuild {
        indexer.rebuild(config, &content, &observer)?
    } else {
        indexer.full_reindex(config, &content, &observer)?
    };

    println!(
        "Indexed {} files: {} reindexed, {} unchanged, {} skipped, {} removed",
        report.processed, report.reindexed, report.unchanged, report.skipped, report.removed
    );
    Ok(())
}

fn run_update(app: &AppConfig, config: &ProjectConfig, file: &Path) -> Result<()> {
    let file = file
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", file.display()))?;
    let indexer = Indexer::new(IndexerSettings::from(app));

    // A fresh process has no walk to check membership against
    indexer.session(config)?.tree().items();

    let outcome = indexer.incremental_update(config, &file, &FsContent::new(app.max_file_size))?;
    println!("{}: {:?}", file.display(), outcome);
    Ok(())
}
