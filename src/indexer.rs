use crate::audio::{AudioMetadata, AudioNormalizer, PreparedAudio, absolute_path, extract_metadata};
use crate::config::{AudioSettings, DEDUP_PAGE_SIZE, is_supported_audio};
use crate::filter::MetadataFilter;
use crate::traits::{EmbeddingProvider, GetRequest, Include, IndexedVector, Metadata, VectorIndex};
use anyhow::{Result, bail};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use walkdir::WalkDir;

/// Recursively lists supported audio files under `dir`, sorted by path.
///
/// Symlinked directories are not descended into; symlinked files are listed
/// under their link path. Unreadable entries are skipped.
pub fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_supported_audio(path))
        .collect();
    files.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));

    debug!("Scanned {}: {} audio files", dir.display(), files.len());
    Ok(files)
}

/// Stable vector id for an absolute file path.
pub fn vector_id(absolute_path: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, absolute_path.as_bytes()).to_string()
}

/// Pipeline step at which a file was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Normalize,
    Metadata,
    Embed,
    Upsert,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub stage: FailureStage,
    pub error: String,
}

impl FileFailure {
    fn new(path: &Path, stage: FailureStage, error: &anyhow::Error) -> Self {
        FileFailure {
            path: path.to_string_lossy().to_string(),
            stage,
            error: format!("{:#}", error),
        }
    }
}

/// Outcome of one [`AudioIndexer::index_files`] run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    /// Candidate paths received.
    pub total: usize,
    /// Candidates not already present in the collection.
    pub new: usize,
    /// Files successfully upserted during this run.
    pub indexed: usize,
    pub failures: Vec<FileFailure>,
}

struct PendingFile {
    path: PathBuf,
    prepared: PreparedAudio,
    metadata: Metadata,
    document: String,
}

/// Drives scan results through normalize, metadata, embed and upsert.
pub struct AudioIndexer {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    normalizer: AudioNormalizer,
    batch_size: usize,
    extract: fn(&Path) -> Result<AudioMetadata>,
}

impl AudioIndexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        settings: &AudioSettings,
    ) -> Self {
        AudioIndexer {
            embedder,
            index,
            normalizer: AudioNormalizer::from_settings(settings),
            batch_size: settings.batch_size.max(1),
            extract: extract_metadata,
        }
    }

    /// Replaces the metadata extractor used for each file.
    pub fn with_metadata_extractor(mut self, extract: fn(&Path) -> Result<AudioMetadata>) -> Self {
        self.extract = extract;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Indexes every path not yet present in the collection.
    ///
    /// Per-file and per-batch errors end up in [`IndexReport::failures`] and
    /// the run continues. The only error returned is a provider that cannot be
    /// initialized. `on_progress` receives `(indexed_so_far, new)` after each
    /// batch.
    pub fn index_files(
        &self,
        paths: &[PathBuf],
        mut on_progress: Option<&mut dyn FnMut(usize, usize)>,
    ) -> Result<IndexReport> {
        if paths.is_empty() {
            return Ok(IndexReport::default());
        }

        self.embedder.ensure_ready()?;

        let mut seen = HashSet::new();
        let candidates: Vec<PathBuf> = paths
            .iter()
            .map(|p| absolute_path(p))
            .filter(|p| seen.insert(p.clone()))
            .collect();
        let existing = self.existing_paths(&candidates);
        let new_files: Vec<PathBuf> = candidates
            .into_iter()
            .filter(|p| !existing.contains(p.to_string_lossy().as_ref()))
            .collect();

        let mut report = IndexReport {
            total: paths.len(),
            new: new_files.len(),
            ..Default::default()
        };
        info!(
            "Indexing into '{}': {} candidates, {} new",
            self.index.name(),
            report.total,
            report.new
        );

        for (batch_number, batch) in new_files.chunks(self.batch_size).enumerate() {
            let indexed = self.process_batch(batch, &mut report.failures);
            report.indexed += indexed;
            debug!(
                "Batch {} done: {}/{} indexed",
                batch_number + 1,
                indexed,
                batch.len()
            );
            if let Some(callback) = on_progress.as_deref_mut() {
                callback(report.indexed, report.new);
            }
        }

        info!(
            "Indexing complete: {} indexed, {} failed",
            report.indexed,
            report.failures.len()
        );
        Ok(report)
    }

    /// `file_path` values already stored, looked up in pages.
    fn existing_paths(&self, candidates: &[PathBuf]) -> HashSet<String> {
        let mut existing = HashSet::new();
        for chunk in candidates.chunks(DEDUP_PAGE_SIZE) {
            let request = GetRequest {
                filter: Some(MetadataFilter::is_in(
                    "file_path",
                    chunk.iter().map(|p| p.to_string_lossy().to_string()),
                )),
                include: Include::metadatas(),
                ..Default::default()
            };
            match self.index.get(&request) {
                Ok(records) => existing.extend(records.into_iter().filter_map(|record| {
                    record
                        .metadata
                        .and_then(|m| m.get("file_path").and_then(|v| v.as_str().map(String::from)))
                })),
                Err(e) => warn!(
                    "Dedup lookup failed on '{}', treating {} paths as new: {:#}",
                    self.index.name(),
                    chunk.len(),
                    e
                ),
            }
        }
        existing
    }

    fn process_batch(&self, batch: &[PathBuf], failures: &mut Vec<FileFailure>) -> usize {
        let mut pending = Vec::with_capacity(batch.len());
        for path in batch {
            let prepared = match self.normalizer.prepare(path) {
                Ok(prepared) => prepared,
                Err(e) => {
                    warn!("Normalization failed for {}: {:#}", path.display(), e);
                    failures.push(FileFailure::new(path, FailureStage::Normalize, &e));
                    continue;
                }
            };
            let audio = match (self.extract)(path) {
                Ok(audio) => audio,
                Err(e) => {
                    warn!("Metadata extraction failed for {}: {:#}", path.display(), e);
                    failures.push(FileFailure::new(path, FailureStage::Metadata, &e));
                    continue;
                }
            };
            pending.push(PendingFile {
                path: path.clone(),
                prepared,
                metadata: audio.to_metadata(now_secs()),
                document: audio.file_name,
            });
        }

        if pending.is_empty() {
            return 0;
        }

        let audio_paths: Vec<PathBuf> = pending
            .iter()
            .map(|file| file.prepared.path().to_path_buf())
            .collect();
        let embeddings = match self.embedder.embed_audio(&audio_paths) {
            Ok(embeddings) if embeddings.len() == pending.len() => embeddings,
            Ok(embeddings) => {
                let e = anyhow::anyhow!(
                    "Provider returned {} embeddings for {} files",
                    embeddings.len(),
                    pending.len()
                );
                fail_all(&pending, FailureStage::Embed, &e, failures);
                return 0;
            }
            Err(e) => {
                fail_all(&pending, FailureStage::Embed, &e, failures);
                return 0;
            }
        };

        let records: Vec<IndexedVector> = pending
            .iter()
            .zip(embeddings)
            .map(|(file, embedding)| IndexedVector {
                id: vector_id(&file.path.to_string_lossy()),
                embedding,
                metadata: file.metadata.clone(),
                document: Some(file.document.clone()),
            })
            .collect();

        match self.index.upsert(&records) {
            Ok(()) => records.len(),
            Err(e) => {
                fail_all(&pending, FailureStage::Upsert, &e, failures);
                0
            }
        }
    }
}

fn fail_all(
    pending: &[PendingFile],
    stage: FailureStage,
    error: &anyhow::Error,
    failures: &mut Vec<FileFailure>,
) {
    warn!("Batch of {} files failed at {:?}: {:#}", pending.len(), stage, error);
    failures.extend(
        pending
            .iter()
            .map(|file| FileFailure::new(&file.path, stage, error)),
    );
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
