mod common;

use audiosearch::indexer::vector_id;
use audiosearch::traits::{GetRequest, Include};
use audiosearch::{
    AudioIndexer, Collection, EmbeddingProvider, FailureStage, LazyEmbedder, MetadataFilter,
    SqliteVectorStore, VectorIndex, scan_directory,
};
use common::{ObservedIndex, StubEmbedder, keyword_vector, settings, write_library, write_wav};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn open_store(temp_dir: &TempDir) -> SqliteVectorStore {
    SqliteVectorStore::open(temp_dir.path().join("index.db")).expect("Failed to open store")
}

#[test]
fn test_new_files_are_indexed_with_distinct_ids() {
    let temp_dir = TempDir::new().unwrap();
    let paths = write_library(temp_dir.path(), &["kick01", "snare01", "hat01"]);
    let store = open_store(&temp_dir);
    let samples = Arc::new(store.collection(Collection::Samples));
    let indexer = AudioIndexer::new(Arc::new(StubEmbedder::default()), samples.clone(), &settings(&temp_dir));

    let report = indexer.index_files(&paths, None).unwrap();
    assert_eq!((report.total, report.new, report.indexed), (3, 3, 3));
    assert!(report.failures.is_empty());

    let records = samples
        .get(&GetRequest {
            include: Include::metadatas(),
            ..Default::default()
        })
        .unwrap();
    let ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids.len(), 3);
}

#[test]
fn test_reindexing_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let paths = write_library(temp_dir.path(), &["kick01", "snare01", "hat01"]);
    let store = open_store(&temp_dir);
    let samples = Arc::new(store.collection(Collection::Samples));
    let embedder = Arc::new(StubEmbedder::default());
    let indexer = AudioIndexer::new(embedder.clone(), samples.clone(), &settings(&temp_dir));

    indexer.index_files(&paths, None).unwrap();
    let second = indexer.index_files(&paths, None).unwrap();

    assert_eq!((second.total, second.new, second.indexed), (3, 0, 0));
    assert_eq!(samples.count().unwrap(), 3);
    assert_eq!(embedder.audio_batch_sizes(), vec![3]);
}

#[test]
fn test_dedup_across_page_boundary() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let samples = store.collection(Collection::Samples);

    // 500 already indexed; they need not exist on disk since dedup reads metadata only
    let candidates: Vec<PathBuf> = (0..501)
        .map(|i| temp_dir.path().join(format!("take{:03}.wav", i)))
        .collect();
    let existing: Vec<_> = candidates[..500]
        .iter()
        .map(|path| {
            let file_path = path.to_string_lossy().to_string();
            let mut metadata = audiosearch::Metadata::new();
            metadata.insert("file_path".to_string(), file_path.clone().into());
            audiosearch::IndexedVector {
                id: vector_id(&file_path),
                embedding: keyword_vector(&file_path),
                metadata,
                document: None,
            }
        })
        .collect();
    samples.upsert(&existing).unwrap();
    write_wav(&candidates[500]);

    let observed = Arc::new(ObservedIndex::new(samples));
    let embedder = Arc::new(StubEmbedder::default());
    let indexer = AudioIndexer::new(embedder.clone(), observed.clone(), &settings(&temp_dir));

    let report = indexer.index_files(&candidates, None).unwrap();
    assert_eq!((report.total, report.new, report.indexed), (501, 1, 1));
    assert_eq!(*observed.get_sizes.lock().unwrap(), vec![500, 1]);
    assert_eq!(embedder.audio_batch_sizes(), vec![1]);
    assert_eq!(observed.count().unwrap(), 501);
}

#[test]
fn test_failed_dedup_lookup_treats_everything_as_new() {
    let temp_dir = TempDir::new().unwrap();
    let paths = write_library(temp_dir.path(), &["kick01", "snare01"]);
    let store = open_store(&temp_dir);
    let mut observed = ObservedIndex::new(store.collection(Collection::Samples));
    observed.fail_get = true;
    let indexer = AudioIndexer::new(
        Arc::new(StubEmbedder::default()),
        Arc::new(observed),
        &settings(&temp_dir),
    );

    indexer.index_files(&paths, None).unwrap();
    let second = indexer.index_files(&paths, None).unwrap();

    assert_eq!((second.total, second.new, second.indexed), (2, 2, 2));
    assert_eq!(store.collection(Collection::Samples).count().unwrap(), 2);
}

#[test]
fn test_batch_size_does_not_change_outcome() {
    let names = ["kick01", "kick02", "snare01", "hat01", "pad01"];
    for batch_size in [1, 2, 32, names.len()] {
        let temp_dir = TempDir::new().unwrap();
        let paths = write_library(temp_dir.path(), &names);
        let store = open_store(&temp_dir);
        let samples = Arc::new(store.collection(Collection::Samples));
        let indexer = AudioIndexer::new(
            Arc::new(StubEmbedder::default()),
            samples.clone(),
            &settings(&temp_dir),
        )
        .with_batch_size(batch_size);

        let report = indexer.index_files(&paths, None).unwrap();
        assert_eq!(report.indexed, names.len(), "batch size {}", batch_size);
        assert_eq!(samples.count().unwrap(), names.len(), "batch size {}", batch_size);
    }
}

#[test]
fn test_unreadable_file_only_drops_itself() {
    let temp_dir = TempDir::new().unwrap();
    let mut paths = write_library(
        temp_dir.path(),
        &["a_kick", "b_snare", "d_hat", "e_pad", "f_kick", "g_snare", "h_hat"],
    );
    let broken = temp_dir.path().join("c_broken.wav");
    std::fs::write(&broken, b"RIFF but not really").unwrap();
    paths.insert(2, broken.clone());

    let store = open_store(&temp_dir);
    let samples = Arc::new(store.collection(Collection::Samples));
    let embedder = Arc::new(StubEmbedder::default());
    let indexer = AudioIndexer::new(embedder.clone(), samples.clone(), &settings(&temp_dir))
        .with_batch_size(4);

    let mut progress = Vec::new();
    let mut on_progress = |indexed: usize, new: usize| progress.push((indexed, new));
    let report = indexer.index_files(&paths, Some(&mut on_progress)).unwrap();

    assert_eq!((report.total, report.new, report.indexed), (8, 8, 7));
    assert_eq!(progress, vec![(3, 8), (7, 8)]);
    assert_eq!(embedder.audio_batch_sizes(), vec![3, 4]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::Normalize);
    assert!(report.failures[0].path.ends_with("c_broken.wav"));

    let broken_records = samples
        .get(&GetRequest {
            filter: Some(MetadataFilter::eq(
                "file_path",
                broken.to_string_lossy().to_string(),
            )),
            include: Include::metadatas(),
            ..Default::default()
        })
        .unwrap();
    assert!(broken_records.is_empty());
}

#[test]
fn test_embeddings_stay_paired_with_their_files() {
    let temp_dir = TempDir::new().unwrap();
    let names = ["pad01", "kick01", "hat01", "snare01"];
    let paths = write_library(temp_dir.path(), &names);
    let store = open_store(&temp_dir);
    let samples = Arc::new(store.collection(Collection::Samples));
    let embedder = Arc::new(StubEmbedder::default());
    let indexer = AudioIndexer::new(embedder.clone(), samples.clone(), &settings(&temp_dir));

    indexer.index_files(&paths, None).unwrap();
    assert_eq!(*embedder.audio_calls.lock().unwrap(), vec![paths.clone()]);

    for (name, path) in names.iter().zip(&paths) {
        let records = samples
            .get(&GetRequest {
                ids: Some(vec![vector_id(&path.to_string_lossy())]),
                include: Include {
                    metadatas: true,
                    documents: true,
                    embeddings: true,
                },
                ..Default::default()
            })
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].embedding.as_deref(), Some(keyword_vector(name).as_slice()));
        assert_eq!(records[0].document.as_deref(), Some(*name));
    }
}

#[test]
fn test_stored_metadata_fields() {
    let temp_dir = TempDir::new().unwrap();
    let paths = write_library(temp_dir.path(), &["kick01"]);
    let store = open_store(&temp_dir);
    let samples = Arc::new(store.collection(Collection::Samples));
    let indexer = AudioIndexer::new(Arc::new(StubEmbedder::default()), samples.clone(), &settings(&temp_dir));
    indexer.index_files(&paths, None).unwrap();

    let records = samples
        .get(&GetRequest {
            include: Include::metadatas(),
            ..Default::default()
        })
        .unwrap();
    let metadata = records[0].metadata.as_ref().unwrap();
    let keys: Vec<&str> = metadata.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec![
            "channels",
            "directory",
            "duration_seconds",
            "extension",
            "file_name",
            "file_path",
            "file_size_bytes",
            "indexed_at",
            "rms_energy",
            "sample_rate",
        ]
    );
    assert_eq!(metadata["file_name"].as_str(), Some("kick01"));
    assert_eq!(metadata["extension"].as_str(), Some(".wav"));
    assert_eq!(metadata["sample_rate"].as_f64(), Some(48_000.0));
    assert_eq!(metadata["duration_seconds"].as_f64(), Some(0.1));
    assert!(metadata["rms_energy"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_projects_collection_is_separate() {
    let temp_dir = TempDir::new().unwrap();
    let paths = write_library(temp_dir.path(), &["bounce01"]);
    let store = open_store(&temp_dir);
    let embedder = Arc::new(StubEmbedder::default());
    let settings = settings(&temp_dir);

    let clips = AudioIndexer::new(embedder.clone(), Arc::new(store.collection(Collection::ProjectClips)), &settings);
    assert_eq!(clips.index_files(&paths, None).unwrap().indexed, 1);

    let samples = AudioIndexer::new(embedder, Arc::new(store.collection(Collection::Samples)), &settings);
    let report = samples.index_files(&paths, None).unwrap();
    assert_eq!((report.new, report.indexed), (1, 1));
}

#[test]
fn test_provider_init_failure_is_fatal_and_retried() {
    let temp_dir = TempDir::new().unwrap();
    let paths = write_library(temp_dir.path(), &["kick01"]);
    let store = open_store(&temp_dir);
    let samples = Arc::new(store.collection(Collection::Samples));

    let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = attempts.clone();
    let embedder = Arc::new(LazyEmbedder::new(common::DIMENSION, move || {
        if counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
            anyhow::bail!("model weights not downloaded");
        }
        Ok(Box::new(StubEmbedder::default()) as Box<dyn EmbeddingProvider>)
    }));
    let indexer = AudioIndexer::new(embedder.clone(), samples.clone(), &settings(&temp_dir));

    let err = indexer.index_files(&paths, None).unwrap_err();
    assert!(err.to_string().contains("model weights"));
    assert_eq!(samples.count().unwrap(), 0);

    let report = indexer.index_files(&paths, None).unwrap();
    assert_eq!(report.indexed, 1);
    assert!(embedder.is_initialized());
}

#[test]
fn test_scan_is_deterministic_and_filters_extensions() {
    let temp_dir = TempDir::new().unwrap();
    let library = temp_dir.path().join("library");
    std::fs::create_dir_all(&library).unwrap();
    write_library(&library, &["kick01", "snare01"]);
    std::fs::write(library.join("readme.txt"), b"notes").unwrap();

    let first = scan_directory(&library).unwrap();
    let second = scan_directory(&library).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, vec![library.join("kick01.wav"), library.join("snare01.wav")]);
}

/// Refuses paths that cannot be sent over JSON, like the HTTP embedder.
#[cfg(target_os = "linux")]
#[derive(Default)]
struct Utf8OnlyEmbedder {
    inner: StubEmbedder,
}

#[cfg(target_os = "linux")]
impl EmbeddingProvider for Utf8OnlyEmbedder {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed_audio(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<Vec<f32>>> {
        if let Some(bad) = paths.iter().find(|p| p.to_str().is_none()) {
            anyhow::bail!("Path is not valid UTF-8: {}", bad.display());
        }
        self.inner.embed_audio(paths)
    }

    fn embed_text(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.inner.embed_text(texts)
    }
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_file_name_does_not_sink_its_batch() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp_dir = TempDir::new().unwrap();
    let good = temp_dir.path().join("kick.wav");
    let odd = temp_dir.path().join(OsStr::from_bytes(b"snare\xff.wav"));
    write_wav(&good);
    write_wav(&odd);
    let store = open_store(&temp_dir);
    let samples = Arc::new(store.collection(Collection::Samples));
    let embedder = Arc::new(Utf8OnlyEmbedder::default());
    let indexer = AudioIndexer::new(embedder.clone(), samples.clone(), &settings(&temp_dir));

    let report = indexer.index_files(&[good, odd], None).unwrap();
    assert_eq!((report.total, report.new, report.indexed), (2, 2, 2));
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(embedder.inner.audio_batch_sizes(), vec![2]);
    let sent = embedder.inner.audio_calls.lock().unwrap();
    assert!(sent[0].iter().all(|p| p.to_str().is_some()));
    assert_eq!(samples.count().unwrap(), 2);
}
