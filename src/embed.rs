use crate::traits::EmbeddingProvider;
use anyhow::{Result, anyhow, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Serialize)]
struct AudioEmbeddingRequest<'a> {
    paths: Vec<&'a str>,
}

#[derive(Serialize)]
struct TextEmbeddingRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// CLAP embeddings served by a local inference process.
///
/// The server exposes `GET /health`, `POST /embed/audio` with `{"paths": [...]}`
/// and `POST /embed/text` with `{"texts": [...]}`; both embed routes answer
/// `{"embeddings": [[f32; dim], ...]}` in request order. Returned vectors are
/// L2-normalized.
pub struct ClapHttpEmbedder {
    client: reqwest::blocking::Client,
    base_url: String,
    dimension: usize,
}

impl ClapHttpEmbedder {
    /// Connects to the inference server and checks that it is up.
    pub fn connect(base_url: &str, dimension: usize) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<std::time::Duration>)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        let embedder = ClapHttpEmbedder {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            dimension,
        };

        let health_url = format!("{}/health", embedder.base_url);
        let response = embedder
            .client
            .get(&health_url)
            .send()
            .map_err(|e| anyhow!("CLAP server unreachable at {}: {}", health_url, e))?;
        if !response.status().is_success() {
            bail!(
                "CLAP server at {} is not ready: HTTP {}",
                health_url,
                response.status()
            );
        }

        info!("Connected to CLAP embedding server at {}", embedder.base_url);
        Ok(embedder)
    }

    fn post_embed<B: Serialize>(
        &self,
        route: &str,
        body: &B,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/{}", self.base_url, route);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| anyhow!("Embedding request to {} failed: {}", url, e))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            bail!("Embedding request to {} failed: HTTP {} {}", url, status, detail);
        }
        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| anyhow!("Invalid embedding response from {}: {}", url, e))?;

        if parsed.embeddings.len() != expected {
            bail!(
                "Embedding server returned {} vectors for {} inputs",
                parsed.embeddings.len(),
                expected
            );
        }
        if let Some(bad) = parsed.embeddings.iter().find(|e| e.len() != self.dimension) {
            bail!(
                "Embedding server returned a {}-dimensional vector, expected {}",
                bad.len(),
                self.dimension
            );
        }
        debug!("Received {} embeddings from {}", expected, url);
        Ok(parsed.embeddings.iter().map(|e| normalize_l2(e)).collect())
    }
}

impl EmbeddingProvider for ClapHttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_audio(&self, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let paths = paths
            .iter()
            .map(|p| {
                p.to_str()
                    .ok_or_else(|| anyhow!("Path is not valid UTF-8: {}", p.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        let expected = paths.len();
        self.post_embed("embed/audio", &AudioEmbeddingRequest { paths }, expected)
    }

    fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.post_embed("embed/text", &TextEmbeddingRequest { texts }, texts.len())
    }
}

type ProviderFactory = Box<dyn Fn() -> Result<Box<dyn EmbeddingProvider>> + Send + Sync>;

/// Process-wide embedding handle that builds its provider on first use.
///
/// Construction runs under a lock, so concurrent first callers still build the
/// provider once. A failed construction leaves the slot empty and the next call
/// tries again. The lock is held for the duration of every embedding call, so
/// the wrapped provider never sees concurrent use.
pub struct LazyEmbedder {
    factory: ProviderFactory,
    dimension: usize,
    slot: Mutex<Option<Box<dyn EmbeddingProvider>>>,
}

impl LazyEmbedder {
    pub fn new<F>(dimension: usize, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn EmbeddingProvider>> + Send + Sync + 'static,
    {
        LazyEmbedder {
            factory: Box::new(factory),
            dimension,
            slot: Mutex::new(None),
        }
    }

    /// Lazily connects a [`ClapHttpEmbedder`] to `base_url`.
    pub fn clap_http(base_url: impl Into<String>, dimension: usize) -> Self {
        let base_url = base_url.into();
        Self::new(dimension, move || {
            let embedder = ClapHttpEmbedder::connect(&base_url, dimension)?;
            Ok(Box::new(embedder) as Box<dyn EmbeddingProvider>)
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn with_provider<T>(&self, f: impl FnOnce(&dyn EmbeddingProvider) -> Result<T>) -> Result<T> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("Embedding provider lock poisoned"))?;
        let provider = match slot.take() {
            Some(provider) => provider,
            None => {
                info!("Loading embedding provider (first use)");
                (self.factory)()?
            }
        };
        let provider = slot.insert(provider);
        f(provider.as_ref())
    }
}

impl EmbeddingProvider for LazyEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn ensure_ready(&self) -> Result<()> {
        self.with_provider(|provider| provider.ensure_ready())
    }

    fn embed_audio(&self, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>> {
        self.with_provider(|provider| provider.embed_audio(paths))
    }

    fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.with_provider(|provider| provider.embed_text(texts))
    }
}

/// Normalizes an embedding vector using L2 normalization.
pub fn normalize_l2(embedding: &[f32]) -> Vec<f32> {
    let norm = (embedding.iter().map(|x| x * x).sum::<f32>()).sqrt();
    if norm < 1e-5 {
        debug!(
            "Embedding norm {} is less than 1e-5, returning original embedding",
            norm
        );
        embedding.to_vec()
    } else {
        embedding.iter().map(|x| x / norm).collect()
    }
}
