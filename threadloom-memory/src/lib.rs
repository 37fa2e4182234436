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

//! Threadloom Memory
//!
//! Session-scoped retrieval caching for context assembly:
//!
//! - [`EmbeddingCache`]: bounded LRU cache of embedding vectors keyed by
//!   `(model_id, text)`, with an optional second-tier [`EmbeddingStore`]
//! - [`SessionRetrievalCache`]: FIFO-bounded cache of retrieval results,
//!   looked up by exact query text or by cosine similarity
//! - [`TurnHistory`]: blends the current turn's results with earlier turns
//!   under a decay factor
//! - [`RetrievalCacheRegistry`]: owns all of the above per session id
//!
//! ## Example
//!
//! ```rust
//! use threadloom_memory::{RetrievalCacheEntry, RetrievalCacheRegistry, RetrievalResult};
//!
//! let registry = RetrievalCacheRegistry::default();
//! let caches = registry.get_session_retrieval_cache("session-1");
//!
//! caches.retrieval.lock().add(RetrievalCacheEntry::new(
//!     "what is rust?",
//!     Some(vec![1.0, 0.0]),
//!     vec![RetrievalResult::new("doc-1", "Rust is a language", 0.9)],
//! ));
//!
//! let hit = caches.retrieval.lock().find_similar(&[1.0, 0.0], 0.95).is_some();
//! assert!(hit);
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod registry;
pub mod retrieval;
pub mod turns;

pub use config::RetrievalCacheConfig;
pub use embedding::{EmbeddingCache, EmbeddingCacheStats, EmbeddingKey, EmbeddingStore};
pub use error::{MemoryError, MemoryResult};
pub use registry::{RetrievalCacheRegistry, SessionCaches};
pub use retrieval::{cosine_similarity, RetrievalCacheEntry, RetrievalResult, SessionRetrievalCache};
pub use turns::{AggregatedResult, TurnHistory, TurnRecord};
