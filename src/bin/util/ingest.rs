use audiosearch::{AudioIndexer, IndexReport, scan_directory};
use audiosearch::config::is_supported_audio;
use log::{debug, info};
use std::path::PathBuf;

/// Expands CLI arguments into the candidate list: directories are scanned,
/// supported files are taken as is.
pub fn collect_candidates(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    for input in inputs {
        if !input.exists() {
            anyhow::bail!("Path does not exist: {}", input.display());
        }
        info!("Starting ingestion with path: {}", input.display());

        if input.is_dir() {
            let files = scan_directory(input)?;
            eprintln!("Found {} audio files in {}", files.len(), input.display());
            candidates.extend(files);
        } else if is_supported_audio(input) {
            candidates.push(input.clone());
        } else {
            eprintln!("Skipping unsupported file: {}", input.display());
            debug!("Unsupported extension: {:?}", input.extension());
        }
    }
    Ok(candidates)
}

/// Runs the indexer, reporting batch progress on stderr.
pub fn ingest(indexer: &AudioIndexer, inputs: &[PathBuf]) -> anyhow::Result<IndexReport> {
    let candidates = collect_candidates(inputs)?;
    let mut on_progress = |indexed: usize, new: usize| {
        let percent = if new == 0 {
            100
        } else {
            (indexed as f32 / new as f32 * 100.0) as u32
        };
        eprintln!("Indexed {} of {} new files ({}%)", indexed, new, percent);
    };
    indexer.index_files(&candidates, Some(&mut on_progress))
}

