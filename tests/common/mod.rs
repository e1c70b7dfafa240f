#![allow(dead_code)]

use audiosearch::traits::{GetRequest, IndexedVector, SearchHit, StoredRecord};
use audiosearch::{AudioSettings, EmbeddingProvider, MetadataFilter, VectorIndex};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub const DIMENSION: usize = 8;

const KEYWORDS: [&str; 4] = ["kick", "snare", "hat", "pad"];

/// Deterministic stand-in for CLAP: a keyword axis plus a small hash-derived
/// tail so distinct inputs get distinct vectors.
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector = vec![0.0f32; DIMENSION];
    for (axis, keyword) in KEYWORDS.iter().enumerate() {
        if lower.contains(keyword) {
            vector[axis] = 1.0;
        }
    }
    let mut hasher = DefaultHasher::new();
    lower.hash(&mut hasher);
    let mut bits = hasher.finish();
    for value in vector.iter_mut().skip(KEYWORDS.len()) {
        *value = (bits & 0xff) as f32 / 255.0 * 0.1;
        bits >>= 8;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector;
    }
    vector.iter().map(|x| x / norm).collect()
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Embeds audio by file stem and text by content; records every call.
#[derive(Default)]
pub struct StubEmbedder {
    pub audio_calls: Mutex<Vec<Vec<PathBuf>>>,
    pub text_calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn audio_batch_sizes(&self) -> Vec<usize> {
        self.audio_calls.lock().unwrap().iter().map(Vec::len).collect()
    }
}

impl EmbeddingProvider for StubEmbedder {
    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn embed_audio(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.audio_calls.lock().unwrap().push(paths.to_vec());
        Ok(paths.iter().map(|p| keyword_vector(&stem(p))).collect())
    }

    fn embed_text(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Delegates to an inner index and counts lookups; optionally fails them.
pub struct ObservedIndex<I: VectorIndex> {
    pub inner: I,
    pub get_sizes: Mutex<Vec<usize>>,
    pub fail_get: bool,
}

impl<I: VectorIndex> ObservedIndex<I> {
    pub fn new(inner: I) -> Self {
        ObservedIndex {
            inner,
            get_sizes: Mutex::new(Vec::new()),
            fail_get: false,
        }
    }
}

impl<I: VectorIndex> VectorIndex for ObservedIndex<I> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn upsert(&self, records: &[IndexedVector]) -> anyhow::Result<()> {
        self.inner.upsert(records)
    }

    fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> anyhow::Result<Vec<SearchHit>> {
        self.inner.query(embedding, k, filter)
    }

    fn get(&self, request: &GetRequest) -> anyhow::Result<Vec<StoredRecord>> {
        let size = match &request.filter {
            Some(MetadataFilter::Field { op, .. }) => match op {
                audiosearch::filter::Comparison::In(values) => values.len(),
                _ => 1,
            },
            _ => 0,
        };
        self.get_sizes.lock().unwrap().push(size);
        if self.fail_get {
            anyhow::bail!("index offline");
        }
        self.inner.get(request)
    }

    fn count(&self) -> anyhow::Result<usize> {
        self.inner.count()
    }
}

/// Writes a short mono 16-bit WAV at the model rate.
pub fn write_wav(path: &Path) {
    write_wav_with(path, 48_000, 0.1);
}

pub fn write_wav_with(path: &Path, sample_rate: u32, seconds: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (sample_rate as f32 * seconds) as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let value = 0.5 * (2.0 * std::f32::consts::PI * 220.0 * t).sin();
        writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Creates `names` as WAV fixtures in `dir` and returns their paths in order.
pub fn write_library(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(format!("{}.wav", name));
            write_wav(&path);
            path
        })
        .collect()
}

pub fn settings(temp_dir: &TempDir) -> AudioSettings {
    AudioSettings {
        scratch_dir: temp_dir.path().join("scratch"),
        ..Default::default()
    }
}
