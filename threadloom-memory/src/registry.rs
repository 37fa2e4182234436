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

//! Process-wide registry of per-session retrieval caches.
//!
//! Caches live as long as the session they belong to, not as long as a
//! single context-assembly request. The registry is an ordinary value that
//! callers construct and share (usually behind an `Arc`); separate
//! instances never see each other's sessions.

use crate::config::RetrievalCacheConfig;
use crate::embedding::{EmbeddingCache, EmbeddingStore};
use crate::retrieval::SessionRetrievalCache;
use crate::turns::TurnHistory;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// All retrieval state owned by one session.
pub struct SessionCaches {
    session_id: String,
    config: RetrievalCacheConfig,
    /// Similarity-threshold result cache.
    pub retrieval: Mutex<SessionRetrievalCache>,
    /// Prior retrieval turns for aggregation.
    pub turns: Mutex<TurnHistory>,
    /// Embedding vectors keyed by model and text.
    pub embeddings: EmbeddingCache,
}

impl SessionCaches {
    fn new(
        session_id: &str,
        config: RetrievalCacheConfig,
        secondary: Option<Arc<dyn EmbeddingStore>>,
    ) -> Self {
        let embeddings = match secondary {
            Some(store) => EmbeddingCache::with_secondary(config.embedding_cache_capacity, store),
            None => EmbeddingCache::new(config.embedding_cache_capacity),
        };

        Self {
            session_id: session_id.to_string(),
            retrieval: Mutex::new(SessionRetrievalCache::new(config.result_cache_capacity)),
            turns: Mutex::new(TurnHistory::new(config.max_history_turns)),
            embeddings,
            config,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &RetrievalCacheConfig {
        &self.config
    }

    fn clear(&self) {
        self.retrieval.lock().clear();
        self.turns.lock().clear();
        self.embeddings.invalidate_all();
    }
}

/// Registry of session caches, created lazily on first access.
pub struct RetrievalCacheRegistry {
    sessions: DashMap<String, Arc<SessionCaches>>,
    default_config: RetrievalCacheConfig,
    secondary: Option<Arc<dyn EmbeddingStore>>,
}

impl Default for RetrievalCacheRegistry {
    fn default() -> Self {
        Self::new(RetrievalCacheConfig::default())
    }
}

impl RetrievalCacheRegistry {
    pub fn new(default_config: RetrievalCacheConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            default_config,
            secondary: None,
        }
    }

    /// Share a second-tier embedding store across every session.
    pub fn with_secondary_store(mut self, store: Arc<dyn EmbeddingStore>) -> Self {
        self.secondary = Some(store);
        self
    }

    /// Get the caches for `session_id`, creating them with the registry's
    /// default configuration on first access.
    pub fn get_session_retrieval_cache(&self, session_id: &str) -> Arc<SessionCaches> {
        self.get_or_create_with(session_id, &self.default_config)
    }

    /// Get the caches for `session_id`, creating them with `config` on first
    /// access. An existing session keeps the configuration it was created with.
    pub fn get_or_create_with(
        &self,
        session_id: &str,
        config: &RetrievalCacheConfig,
    ) -> Arc<SessionCaches> {
        if let Some(existing) = self.sessions.get(session_id) {
            return existing.clone();
        }

        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id = %session_id, "Creating session retrieval cache");
                Arc::new(SessionCaches::new(
                    session_id,
                    config.clone(),
                    self.secondary.clone(),
                ))
            })
            .clone()
    }

    /// Destroy a session's caches. Returns whether the session was present.
    pub fn clear_session_cache(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, caches)) => {
                caches.clear();
                info!(session_id = %session_id, "Cleared session retrieval cache");
                true
            }
            None => false,
        }
    }

    /// Destroy every session's caches.
    pub fn clear_all_caches(&self) {
        let count = self.sessions.len();
        for entry in self.sessions.iter() {
            entry.value().clear();
        }
        self.sessions.clear();
        info!(sessions = count, "Cleared all retrieval caches");
    }

    pub fn contains_session(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
