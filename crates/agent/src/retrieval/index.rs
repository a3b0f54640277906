use std::cmp::Ordering;

use async_trait::async_trait;
use tellr_core::domain::Passage;
use tellr_core::errors::CollaboratorError;
use tokio::sync::RwLock;

use crate::retrieval::{Embedder, SearchFilter, VectorIndex};

#[derive(Clone, Debug)]
struct IndexedPassage {
    passage: Passage,
    vector: Vec<f32>,
}

/// Brute-force cosine index. Language and category are applied before scoring, so a filtered
/// search never returns passages outside the filter.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<Vec<IndexedPassage>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embeds and stores passages. Re-ingesting a passage id replaces the old entry.
    pub async fn insert(
        &self,
        embedder: &dyn Embedder,
        passages: Vec<Passage>,
    ) -> Result<usize, CollaboratorError> {
        let mut embedded = Vec::with_capacity(passages.len());
        for passage in passages {
            let vector = embedder.embed(&passage.text).await?;
            embedded.push(IndexedPassage { passage, vector });
        }

        let inserted = embedded.len();
        let mut entries = self.entries.write().await;
        for item in embedded {
            entries.retain(|existing| existing.passage.id != item.passage.id);
            entries.push(item);
        }
        Ok(inserted)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        k: usize,
    ) -> Result<Vec<(Passage, f32)>, CollaboratorError> {
        let entries = self.entries.read().await;
        let mut scored: Vec<(Passage, f32)> = entries
            .iter()
            .filter(|entry| filter.matches(&entry.passage))
            .map(|entry| (entry.passage.clone(), cosine_similarity(vector, &entry.vector)))
            .collect();

        scored.sort_by(|left, right| {
            right.1.partial_cmp(&left.1).unwrap_or(Ordering::Equal).then_with(|| left.0.id.cmp(&right.0.id))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}
