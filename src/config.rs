use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Sample rate the CLAP audio tower expects.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Longest clip handed to the embedder, in seconds.
pub const DEFAULT_MAX_DURATION_SECS: f64 = 30.0;

/// Number of files embedded per provider call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Maximum number of paths sent in a single existence lookup.
pub const DEDUP_PAGE_SIZE: usize = 500;

/// Dimension of CLAP audio and text embeddings.
pub const EMBEDDING_DIMENSION: usize = 512;

/// Where the CLAP inference server listens by default.
pub const DEFAULT_EMBEDDER_URL: &str = "http://127.0.0.1:9410";

/// File extensions (lower-case, without the dot) picked up by directory scans.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["wav", "mp3", "aiff", "aif", "flac", "ogg"];

/// Returns true if the path has one of the [`SUPPORTED_EXTENSIONS`], ignoring case.
pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Named vector namespaces. Both share the same schema and cosine distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// The local sample library.
    Samples,
    /// Clips rendered out of DAW projects.
    ProjectClips,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Samples, Collection::ProjectClips];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Samples => "samples",
            Collection::ProjectClips => "project_clips",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "samples" => Ok(Collection::Samples),
            "project_clips" | "clips" => Ok(Collection::ProjectClips),
            other => Err(format!(
                "unknown collection '{}', expected 'samples' or 'project_clips'",
                other
            )),
        }
    }
}

/// Audio envelope and batching used by the indexer and the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    pub target_sample_rate: u32,
    pub max_duration_secs: f64,
    pub batch_size: usize,
    /// Resampled copies are written here and removed once embedded.
    pub scratch_dir: PathBuf,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            target_sample_rate: DEFAULT_SAMPLE_RATE,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
            scratch_dir: default_scratch_dir(),
        }
    }
}

/// Shared scratch directory for resampled audio.
pub fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("audiosearch_audio")
}

/// Configuration for audiosearch project directories
pub struct AudioSearchDirs {
    project_dirs: Option<ProjectDirs>,
}

impl AudioSearchDirs {
    /// Create a new AudioSearchDirs instance
    pub fn new() -> Self {
        let project_dirs = ProjectDirs::from("com", "audiosearch", "audiosearch");
        Self { project_dirs }
    }

    /// Get the default database directory
    pub fn default_db_dir(&self) -> PathBuf {
        match &self.project_dirs {
            Some(dirs) => dirs.data_dir().to_path_buf(),
            None => {
                // No home directory; keep the index next to the caller
                std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
            }
        }
    }

    /// Get the default database file path
    pub fn default_db_path(&self) -> PathBuf {
        self.default_db_dir().join("audiosearch.db")
    }

    /// Ensure the database directory exists
    pub fn ensure_db_dir(&self) -> std::io::Result<PathBuf> {
        let db_dir = self.default_db_dir();
        std::fs::create_dir_all(&db_dir)?;
        Ok(db_dir)
    }
}

impl Default for AudioSearchDirs {
    fn default() -> Self {
        Self::new()
    }
}
