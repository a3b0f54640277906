pub mod cache;
pub mod embedder;
pub mod index;

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tellr_core::config::RetrievalConfig;
use tellr_core::domain::{Category, Language, Passage, RetrievalResult, ScoredPassage};
use tellr_core::errors::CollaboratorError;
use tracing::debug;

use crate::retry::{with_retries, RetryPolicy};

pub use self::cache::TtlCache;
pub use self::embedder::{HashingEmbedder, HttpEmbedder};
pub use self::index::InMemoryVectorIndex;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        k: usize,
    ) -> Result<Vec<(Passage, f32)>, CollaboratorError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SearchFilter {
    pub language: Language,
    pub category: Option<Category>,
}

impl SearchFilter {
    pub fn matches(&self, passage: &Passage) -> bool {
        passage.language == self.language
            && self.category.map_or(true, |category| passage.category == category)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    filter: SearchFilter,
    k: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetrieverSettings {
    pub top_k: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub min_score: f32,
    pub retry: RetryPolicy,
}

impl RetrieverSettings {
    pub fn from_config(config: &RetrievalConfig, max_retries: u32) -> Self {
        Self {
            top_k: config.top_k,
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            cache_capacity: config.cache_capacity,
            min_score: config.min_score,
            retry: RetryPolicy::new(max_retries),
        }
    }
}

/// Metadata-filtered semantic search with a short-lived result cache.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    cache: TtlCache<CacheKey, RetrievalResult>,
    settings: RetrieverSettings,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, settings: RetrieverSettings) -> Self {
        Self {
            embedder,
            index,
            cache: TtlCache::new(settings.cache_capacity, settings.cache_ttl),
            settings,
        }
    }

    pub fn default_k(&self) -> usize {
        self.settings.top_k
    }

    /// Top-`k` passages for `query` within `language` and the optional category. An empty
    /// result is a valid answer meaning "no grounding available".
    pub async fn retrieve(
        &self,
        query: &str,
        language: Language,
        category: Option<Category>,
        k: usize,
    ) -> Result<RetrievalResult, CollaboratorError> {
        let filter = SearchFilter { language, category };
        let key = CacheKey { query: normalize_query(query), filter, k };
        let normalized = key.query.clone();

        let (result, hit) = self
            .cache
            .get_or_try_insert_with(key, || self.search(normalized, filter, k))
            .await?;

        debug!(
            event_name = if hit { "retrieval.cache_hit" } else { "retrieval.cache_miss" },
            language = language.tag(),
            category = category.map(|category| category.key()).unwrap_or("any"),
            passages = result.len(),
            "retrieval completed"
        );
        Ok(result)
    }

    async fn search(
        &self,
        query: String,
        filter: SearchFilter,
        k: usize,
    ) -> Result<RetrievalResult, CollaboratorError> {
        let vector = with_retries(self.settings.retry, "retrieval.embed", || self.embedder.embed(&query)).await?;
        let hits = with_retries(self.settings.retry, "retrieval.search", || {
            self.index.search(&vector, &filter, k)
        })
        .await?;

        let mut passages: Vec<ScoredPassage> = hits
            .into_iter()
            .filter(|(_, score)| *score >= self.settings.min_score)
            .map(|(passage, score)| ScoredPassage { passage, score })
            .collect();
        passages.sort_by(|left, right| {
            right
                .score
                .partial_cmp(&left.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.passage.id.cmp(&right.passage.id))
        });
        passages.truncate(k);

        Ok(RetrievalResult { query, language: filter.language, filter: filter.category, passages })
    }
}

/// Lowercased, trimmed, whitespace collapsed.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
