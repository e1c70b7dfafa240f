//! # Audio Search
//!
//! A local audio indexing and search sidecar built in Rust with CLAP embeddings and SQLite storage.
//!
//! ## Features
//!
//! - Text-to-audio and audio-to-audio search over learned embeddings
//! - Recursive library scanning with deduplication against the existing index
//! - Resampling and trimming to the embedding model's input envelope
//! - Per-file failure reporting; one bad file never aborts a run
//! - SQLite-based vector storage with Chroma-style metadata filters
//! - Both library and CLI interfaces
//!
//! ## Embedding server
//!
//! Embeddings are not computed in-process. [`ClapHttpEmbedder`] talks to a CLAP
//! model (LAION CLAP or any model with a joint audio/text space) wrapped in a
//! small HTTP server that runs on the same machine. The CLI reads its address
//! from `--embedder-url` or `AUDIOSEARCH_EMBEDDER_URL` and defaults to
//! [`DEFAULT_EMBEDDER_URL`] (`http://127.0.0.1:9410`).
//!
//! The server must answer three JSON routes:
//!
//! | Route | Request body | Response body |
//! |---|---|---|
//! | `GET /health` | none | any 2xx once the model is loaded |
//! | `POST /embed/audio` | `{"paths": ["/abs/kick.wav", ...]}` | `{"embeddings": [[f32; 512], ...]}` |
//! | `POST /embed/text` | `{"texts": ["punchy kick", ...]}` | `{"embeddings": [[f32; 512], ...]}` |
//!
//! Audio paths are absolute local files the server reads itself. They are
//! mono WAVs at 48 kHz and no longer than 30 s whenever the source needed
//! resampling or trimming. Vectors come back in request order, one per input,
//! with [`EMBEDDING_DIMENSION`] entries. They are L2-normalized on receipt, so
//! the server may return raw projections. Any non-2xx status is a failure of
//! the whole batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use audiosearch::{
//!     AudioIndexer, AudioSearchDirs, AudioSettings, Collection, LazyEmbedder, SearchService,
//!     SqliteVectorStore, scan_directory, EMBEDDING_DIMENSION, DEFAULT_EMBEDDER_URL,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dirs = AudioSearchDirs::new();
//! let store = SqliteVectorStore::open(dirs.ensure_db_dir()?.join("audiosearch.db"))?;
//! let samples = Arc::new(store.collection(Collection::Samples));
//!
//! // The CLAP server is contacted on first use
//! let embedder = Arc::new(LazyEmbedder::clap_http(DEFAULT_EMBEDDER_URL, EMBEDDING_DIMENSION));
//! let settings = AudioSettings::default();
//!
//! // Index a sample folder
//! let files = scan_directory(Path::new("/path/to/samples"))?;
//! let indexer = AudioIndexer::new(embedder.clone(), samples.clone(), &settings);
//! let report = indexer.index_files(&files, None)?;
//! println!("indexed {} of {} new files", report.indexed, report.new);
//!
//! // Search
//! let search = SearchService::new(embedder, &settings).with_collection(Collection::Samples, samples);
//! let hits = search.search_by_text("punchy kick drum", 10, None, Collection::Samples)?;
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub use traits::{
    EmbeddingProvider, GetRequest, Include, IndexedVector, Metadata, MetadataValue, SearchHit,
    StoredRecord, VectorIndex,
};

pub mod config;
pub use config::{
    AudioSearchDirs, AudioSettings, Collection, DEFAULT_EMBEDDER_URL, EMBEDDING_DIMENSION,
};

pub mod filter;
pub use filter::MetadataFilter;

pub mod audio;

pub mod embed;
pub use embed::{ClapHttpEmbedder, LazyEmbedder};

pub mod engines;
pub use engines::{SqliteCollection, SqliteVectorStore};

pub mod indexer;
pub use indexer::{AudioIndexer, FailureStage, FileFailure, IndexReport, scan_directory};

pub mod search;
pub use search::{SearchResponse, SearchResultItem, SearchService};
