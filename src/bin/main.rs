mod util;

use audiosearch::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_DURATION_SECS, DEFAULT_SAMPLE_RATE, default_scratch_dir,
};
use audiosearch::{
    AudioIndexer, AudioSearchDirs, AudioSettings, Collection, DEFAULT_EMBEDDER_URL,
    EMBEDDING_DIMENSION, LazyEmbedder, MetadataFilter, SearchResponse, SearchService,
    SqliteVectorStore,
};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "audiosearch")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity,
    /// Database file path (default: platform data directory)
    #[clap(
        long,
        global = true,
        env = "AUDIOSEARCH_DB",
        help = "Path to the SQLite database file."
    )]
    db: Option<PathBuf>,
    /// Base URL of the CLAP embedding server
    #[clap(
        long,
        global = true,
        env = "AUDIOSEARCH_EMBEDDER_URL",
        default_value = DEFAULT_EMBEDDER_URL
    )]
    embedder_url: String,
    #[clap(flatten)]
    audio: AudioArgs,
}

#[derive(Args)]
struct AudioArgs {
    /// Sample rate the embedding model expects
    #[clap(long, global = true, env = "AUDIOSEARCH_SAMPLE_RATE", default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,
    /// Longest audio span handed to the model, in seconds
    #[clap(long, global = true, env = "AUDIOSEARCH_MAX_DURATION", default_value_t = DEFAULT_MAX_DURATION_SECS)]
    max_duration: f64,
    /// Files per embedding call
    #[clap(long, global = true, env = "AUDIOSEARCH_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Directory for resampled scratch files
    #[clap(long, global = true, env = "AUDIOSEARCH_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,
}

impl AudioArgs {
    fn settings(&self) -> AudioSettings {
        AudioSettings {
            target_sample_rate: self.sample_rate,
            max_duration_secs: self.max_duration,
            batch_size: self.batch_size,
            scratch_dir: self.scratch_dir.clone().unwrap_or_else(default_scratch_dir),
        }
    }
}

#[derive(Args)]
struct QueryArgs {
    /// Maximum number of results to return
    #[clap(long, default_value = "10", help = "Maximum number of search results to return.")]
    limit: usize,
    /// Metadata filter as JSON, e.g. '{"extension": ".wav"}'
    #[clap(long)]
    filter: Option<String>,
    /// Collection to search: samples or project_clips
    #[clap(long, default_value = "samples")]
    collection: Collection,
    /// Output results as pretty format instead of json text
    #[clap(long, help = "Output search results in pretty format instead of json text.")]
    pretty: bool,
}

impl QueryArgs {
    fn parse_filter(&self) -> anyhow::Result<Option<MetadataFilter>> {
        self.filter
            .as_deref()
            .map(|raw| {
                let value: serde_json::Value = serde_json::from_str(raw)
                    .map_err(|e| anyhow::anyhow!("Invalid --filter JSON: {}", e))?;
                MetadataFilter::from_json(&value)
            })
            .transpose()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Index audio files from directories or individual files
    Index {
        /// Directories to scan or audio files to index
        #[clap(required = true)]
        paths: Vec<PathBuf>,
        /// Collection to index into: samples or project_clips
        #[clap(long, default_value = "samples")]
        collection: Collection,
        /// Output the report as pretty format instead of json text
        #[clap(long)]
        pretty: bool,
    },
    /// Search indexed audio with a text description
    Search {
        /// Search query, e.g. "dusty vinyl snare"
        query: String,
        #[clap(flatten)]
        args: QueryArgs,
    },
    /// Find indexed audio that sounds like a reference file
    Similar {
        /// Reference audio file
        file: PathBuf,
        #[clap(flatten)]
        args: QueryArgs,
    },
    /// Show record counts per collection
    Stats {
        #[clap(long)]
        pretty: bool,
    },
}

fn validate_db_presence(db_path: &Path) -> anyhow::Result<()> {
    if !db_path.exists() {
        return Err(anyhow::anyhow!(
            "Database file '{}' does not exist. Please run the 'index' command first to create and populate the database.",
            db_path.display()
        ));
    }
    Ok(())
}

fn resolve_db_path(db: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => {
            let dirs = AudioSearchDirs::new();
            dirs.ensure_db_dir()?;
            Ok(dirs.default_db_path())
        }
    }
}

fn search_service(
    store: &SqliteVectorStore,
    embedder: Arc<LazyEmbedder>,
    settings: &AudioSettings,
) -> SearchService {
    Collection::ALL
        .iter()
        .fold(SearchService::new(embedder, settings), |service, collection| {
            service.with_collection(*collection, Arc::new(store.collection(*collection)))
        })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let db_path = resolve_db_path(cli.db)?;
    let settings = cli.audio.settings();
    let embedder = Arc::new(LazyEmbedder::clap_http(
        cli.embedder_url.as_str(),
        EMBEDDING_DIMENSION,
    ));

    match cli.command {
        Commands::Index {
            paths,
            collection,
            pretty,
        } => {
            if pretty {
                println!(
                    "Indexing audio into '{}' in database: {}",
                    collection,
                    db_path.display()
                );
            }
            let store = SqliteVectorStore::open(&db_path)?;
            let indexer = AudioIndexer::new(
                embedder,
                Arc::new(store.collection(collection)),
                &settings,
            );
            let report = util::ingest::ingest(&indexer, &paths)?;
            util::output::print_index_report(&report, collection, pretty)?;
        }
        Commands::Search { query, args } => {
            validate_db_presence(&db_path)?;
            let filter = args.parse_filter()?;
            let store = SqliteVectorStore::open(&db_path)?;
            let service = search_service(&store, embedder, &settings);

            let hits =
                service.search_by_text(&query, args.limit, filter.as_ref(), args.collection)?;
            let response = SearchResponse::from_hits(hits, query);
            util::output::print_search_response(&response, args.pretty)?;
        }
        Commands::Similar { file, args } => {
            validate_db_presence(&db_path)?;
            let filter = args.parse_filter()?;
            let store = SqliteVectorStore::open(&db_path)?;
            let service = search_service(&store, embedder, &settings);

            let hits =
                service.search_by_similarity(&file, args.limit, filter.as_ref(), args.collection)?;
            let response = SearchResponse::from_hits(hits, SearchResponse::similarity_label(&file));
            util::output::print_search_response(&response, args.pretty)?;
        }
        Commands::Stats { pretty } => {
            validate_db_presence(&db_path)?;
            let store = SqliteVectorStore::open(&db_path)?;
            util::output::print_stats(&db_path, &store.stats()?, pretty)?;
        }
    }
    Ok(())
}
