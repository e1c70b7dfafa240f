use crate::audio::AudioNormalizer;
use crate::config::{AudioSettings, Collection};
use crate::filter::MetadataFilter;
use crate::traits::{EmbeddingProvider, Metadata, SearchHit, VectorIndex};
use anyhow::{Result, anyhow};
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Text-to-audio and audio-to-audio queries over one or more collections.
pub struct SearchService {
    embedder: Arc<dyn EmbeddingProvider>,
    normalizer: AudioNormalizer,
    collections: HashMap<Collection, Arc<dyn VectorIndex>>,
}

impl SearchService {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, settings: &AudioSettings) -> Self {
        SearchService {
            embedder,
            normalizer: AudioNormalizer::from_settings(settings),
            collections: HashMap::new(),
        }
    }

    pub fn with_collection(mut self, collection: Collection, index: Arc<dyn VectorIndex>) -> Self {
        self.collections.insert(collection, index);
        self
    }

    fn index(&self, collection: Collection) -> Result<&Arc<dyn VectorIndex>> {
        self.collections
            .get(&collection)
            .ok_or_else(|| anyhow!("Collection '{}' is not available", collection))
    }

    /// Embeds `query` as text and returns the nearest audio, closest first.
    pub fn search_by_text(
        &self,
        query: &str,
        n_results: usize,
        filter: Option<&MetadataFilter>,
        collection: Collection,
    ) -> Result<Vec<SearchHit>> {
        let index = self.index(collection)?;
        info!("Text search on '{}': \"{}\"", collection, query);

        let embedding = self
            .embedder
            .embed_text(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Embedding provider returned no vector for query"))?;

        let hits = index.query(&embedding, n_results, filter)?;
        debug!("Text search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Finds audio that sounds like the file at `reference`.
    pub fn search_by_similarity(
        &self,
        reference: &Path,
        n_results: usize,
        filter: Option<&MetadataFilter>,
        collection: Collection,
    ) -> Result<Vec<SearchHit>> {
        let index = self.index(collection)?;
        info!("Similarity search on '{}': {}", collection, reference.display());

        let prepared = self.normalizer.prepare(reference)?;
        let embedding = self
            .embedder
            .embed_audio(&[prepared.path().to_path_buf()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Embedding provider returned no vector for reference"))?;

        let hits = index.query(&embedding, n_results, filter)?;
        debug!("Similarity search returned {} hits", hits.len());
        Ok(hits)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub distance: f64,
    pub duration_seconds: f64,
    pub metadata: Metadata,
}

/// Response shape shared by text and similarity queries.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub query: String,
    pub total: usize,
}

impl SearchResponse {
    pub fn from_hits(hits: Vec<SearchHit>, query: impl Into<String>) -> Self {
        let results: Vec<SearchResultItem> = hits
            .into_iter()
            .map(|hit| SearchResultItem {
                file_path: metadata_string(&hit.metadata, "file_path"),
                file_name: metadata_string(&hit.metadata, "file_name"),
                duration_seconds: hit
                    .metadata
                    .get("duration_seconds")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0),
                id: hit.id,
                distance: hit.distance,
                metadata: hit.metadata,
            })
            .collect();
        SearchResponse {
            total: results.len(),
            results,
            query: query.into(),
        }
    }

    /// Label used for similarity queries.
    pub fn similarity_label(reference: &Path) -> String {
        format!("similar:{}", reference.display())
    }
}

fn metadata_string(metadata: &Metadata, key: &str) -> String {
    metadata
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::SqliteVectorStore;
    use crate::traits::{IndexedVector, MetadataValue};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct KeywordEmbedder;

    impl EmbeddingProvider for KeywordEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        fn embed_audio(&self, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>> {
            Ok(paths.iter().map(|_| vec![0.0, 1.0]).collect())
        }

        fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("kick") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }
    }

    fn record(id: &str, name: &str, embedding: Vec<f32>) -> IndexedVector {
        let mut metadata = Metadata::new();
        metadata.insert("file_path".to_string(), format!("/lib/{}.wav", name).into());
        metadata.insert("file_name".to_string(), name.into());
        metadata.insert("duration_seconds".to_string(), MetadataValue::Float(0.5));
        IndexedVector {
            id: id.to_string(),
            embedding,
            metadata,
            document: Some(name.to_string()),
        }
    }

    fn service(temp_dir: &TempDir) -> SearchService {
        let store = SqliteVectorStore::open(temp_dir.path().join("search.db")).unwrap();
        let samples = store.collection(Collection::Samples);
        samples
            .upsert(&[
                record("kick", "kick01", vec![1.0, 0.0]),
                record("pad", "pad01", vec![0.0, 1.0]),
            ])
            .unwrap();
        SearchService::new(Arc::new(KeywordEmbedder), &AudioSettings::default())
            .with_collection(Collection::Samples, Arc::new(samples))
    }

    #[test]
    fn test_text_search_ranks_nearest_first() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);

        let hits = service
            .search_by_text("kick drum", 10, None, Collection::Samples)
            .unwrap();
        assert_eq!(hits[0].id, "kick");
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_unknown_collection_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        assert!(
            service
                .search_by_text("kick", 5, None, Collection::ProjectClips)
                .is_err()
        );
    }

    #[test]
    fn test_similarity_of_unreadable_reference_fails() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let broken = temp_dir.path().join("broken.wav");
        std::fs::write(&broken, b"not audio").unwrap();
        assert!(
            service
                .search_by_similarity(&broken, 5, None, Collection::Samples)
                .is_err()
        );
    }

    #[test]
    fn test_response_shape() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let hits = service
            .search_by_text("kick", 1, None, Collection::Samples)
            .unwrap();

        let response = SearchResponse::from_hits(hits, "kick");
        assert_eq!(response.total, 1);
        assert_eq!(response.query, "kick");
        let item = &response.results[0];
        assert_eq!(item.file_path, "/lib/kick01.wav");
        assert_eq!(item.file_name, "kick01");
        assert_eq!(item.duration_seconds, 0.5);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["results"][0]["id"], "kick");
        assert_eq!(
            SearchResponse::similarity_label(Path::new("/lib/ref.wav")),
            "similar:/lib/ref.wav"
        );
    }
}
