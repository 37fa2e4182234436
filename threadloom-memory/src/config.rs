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

//! Retrieval cache configuration

use serde::{Deserialize, Serialize};

/// Capacities and aggregation settings for a session's retrieval caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCacheConfig {
    /// Maximum cached query results per session (FIFO eviction).
    #[serde(default = "default_result_capacity")]
    pub result_cache_capacity: usize,

    /// Maximum cached embeddings per session (LRU eviction).
    #[serde(default = "default_embedding_capacity")]
    pub embedding_cache_capacity: u64,

    /// Prior turns blended into the current turn's results.
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// Weight multiplier per turn of age (0.0-1.0).
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f32,
}

fn default_result_capacity() -> usize {
    32
}

fn default_embedding_capacity() -> u64 {
    256
}

fn default_max_history_turns() -> usize {
    3
}

fn default_decay_factor() -> f32 {
    0.5
}

impl Default for RetrievalCacheConfig {
    fn default() -> Self {
        Self {
            result_cache_capacity: default_result_capacity(),
            embedding_cache_capacity: default_embedding_capacity(),
            max_history_turns: default_max_history_turns(),
            decay_factor: default_decay_factor(),
        }
    }
}

impl RetrievalCacheConfig {
    /// Decay factor clamped into `[0, 1]`; NaN is treated as 0.
    pub fn effective_decay(&self) -> f32 {
        if self.decay_factor.is_nan() {
            0.0
        } else {
            self.decay_factor.clamp(0.0, 1.0)
        }
    }
}
