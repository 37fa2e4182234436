// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Embedding cache
//!
//! Caches embedding vectors keyed by `(model_id, text)` in a bounded,
//! access-ordered (LRU) in-process cache. A miss can optionally fall through
//! to a second-tier [`EmbeddingStore`] shared across processes; failures in
//! that tier are logged and reported as a miss.

use crate::error::MemoryResult;
use async_trait::async_trait;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cache key: model id plus a digest of the embedded text.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EmbeddingKey {
    model_id: String,
    text_hash: [u8; 32],
}

impl EmbeddingKey {
    pub fn new(model_id: &str, text: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            text_hash: *blake3::hash(text.as_bytes()).as_bytes(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Hex digest of the text, for stores that need a string key.
    pub fn text_digest(&self) -> String {
        blake3::Hash::from(self.text_hash).to_hex().to_string()
    }
}

impl fmt::Debug for EmbeddingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EmbeddingKey({}:{})", self.model_id, &self.text_digest()[..12])
    }
}

/// Second-tier embedding storage (for example a cache shared across
/// processes).
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn get(&self, key: &EmbeddingKey) -> MemoryResult<Option<Vec<f32>>>;
    async fn put(&self, key: &EmbeddingKey, vector: &[f32]) -> MemoryResult<()>;
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddingCacheStats {
    pub hits: u64,
    pub secondary_hits: u64,
    pub misses: u64,
    pub entry_count: u64,
}

impl EmbeddingCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.secondary_hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.secondary_hits) as f64 / total as f64
        }
    }
}

/// Bounded LRU cache of embeddings.
pub struct EmbeddingCache {
    cache: Cache<EmbeddingKey, Arc<Vec<f32>>>,
    secondary: Option<Arc<dyn EmbeddingStore>>,
    hits: AtomicU64,
    secondary_hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(capacity: u64) -> Self {
        Self::build(capacity, None)
    }

    pub fn with_secondary(capacity: u64, secondary: Arc<dyn EmbeddingStore>) -> Self {
        Self::build(capacity, Some(secondary))
    }

    fn build(capacity: u64, secondary: Option<Arc<dyn EmbeddingStore>>) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self {
            cache,
            secondary,
            hits: AtomicU64::new(0),
            secondary_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up an embedding, consulting the second tier on a local miss.
    pub async fn get(&self, model_id: &str, text: &str) -> Option<Arc<Vec<f32>>> {
        let key = EmbeddingKey::new(model_id, text);

        if let Some(vector) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(vector);
        }

        if let Some(secondary) = &self.secondary {
            match secondary.get(&key).await {
                Ok(Some(vector)) => {
                    let vector = Arc::new(vector);
                    self.cache.insert(key, vector.clone());
                    self.secondary_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(vector);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(?key, "Secondary embedding cache unavailable, treating as miss: {}", e);
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store an embedding locally and, best effort, in the second tier.
    pub async fn set(&self, model_id: &str, text: &str, vector: Vec<f32>) -> Arc<Vec<f32>> {
        let key = EmbeddingKey::new(model_id, text);

        if let Some(secondary) = &self.secondary {
            if let Err(e) = secondary.put(&key, &vector).await {
                tracing::warn!(?key, "Failed to write embedding to secondary cache: {}", e);
            }
        }

        let vector = Arc::new(vector);
        self.cache.insert(key, vector.clone());
        vector
    }

    /// Local lookup only; never touches the second tier or the counters.
    pub fn peek(&self, model_id: &str, text: &str) -> Option<Arc<Vec<f32>>> {
        self.cache.get(&EmbeddingKey::new(model_id, text))
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Apply pending evictions so that counts are exact.
    pub fn sync(&self) {
        self.cache.run_pending_tasks();
    }

    pub fn stats(&self) -> EmbeddingCacheStats {
        EmbeddingCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            secondary_hits: self.secondary_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.cache.entry_count(),
        }
    }
}
