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

//! Multi-turn retrieval aggregation.
//!
//! Each retrieval turn is recorded; the current turn's results are blended
//! with those of the previous turns, each older turn weighted down by the
//! decay factor.

use crate::retrieval::RetrievalResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Results of one retrieval turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub query: String,
    pub results: Vec<RetrievalResult>,
    pub timestamp: DateTime<Utc>,
}

impl TurnRecord {
    pub fn new(query: impl Into<String>, results: Vec<RetrievalResult>) -> Self {
        Self {
            query: query.into(),
            results,
            timestamp: Utc::now(),
        }
    }
}

/// A result after blending across turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub result: RetrievalResult,
    /// `score * decay^age`
    pub weighted_score: f32,
    /// 0 for the newest turn.
    pub turn_age: usize,
}

/// Bounded history of retrieval turns for one session.
#[derive(Debug, Clone)]
pub struct TurnHistory {
    turns: VecDeque<TurnRecord>,
    max_history_turns: usize,
}

impl TurnHistory {
    pub fn new(max_history_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_history_turns,
        }
    }

    /// Record a turn; only the newest turn plus `max_history_turns` prior
    /// turns are retained.
    pub fn record(&mut self, turn: TurnRecord) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_history_turns + 1 {
            self.turns.pop_front();
        }
    }

    /// Blend all retained turns. Results appearing in several turns keep
    /// their best weighted score. Sorted by weighted score descending, ties
    /// by id, truncated to `limit`.
    pub fn aggregate(&self, decay: f32, limit: usize) -> Vec<AggregatedResult> {
        let mut best: HashMap<&str, AggregatedResult> = HashMap::new();

        for (age, turn) in self.turns.iter().rev().enumerate() {
            let weight = decay.powi(age as i32);
            for result in &turn.results {
                let weighted_score = result.score * weight;
                let replace = best
                    .get(result.id.as_str())
                    .map_or(true, |current| weighted_score > current.weighted_score);
                if replace {
                    best.insert(
                        result.id.as_str(),
                        AggregatedResult {
                            result: result.clone(),
                            weighted_score,
                            turn_age: age,
                        },
                    );
                }
            }
        }

        let mut aggregated: Vec<AggregatedResult> = best.into_values().collect();
        aggregated.sort_by(|a, b| {
            b.weighted_score
                .partial_cmp(&a.weighted_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.result.id.cmp(&b.result.id))
        });
        aggregated.truncate(limit);
        aggregated
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn latest(&self) -> Option<&TurnRecord> {
        self.turns.back()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
