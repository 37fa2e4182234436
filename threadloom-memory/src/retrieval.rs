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

//! Per-session retrieval result cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One retrieved knowledge item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub content: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl RetrievalResult {
    pub fn new(id: impl Into<String>, content: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            score,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A cached query together with the results it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCacheEntry {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    pub results: Vec<RetrievalResult>,
    pub timestamp: DateTime<Utc>,
}

impl RetrievalCacheEntry {
    pub fn new(query: impl Into<String>, vector: Option<Vec<f32>>, results: Vec<RetrievalResult>) -> Self {
        Self {
            query: query.into(),
            vector,
            results,
            timestamp: Utc::now(),
        }
    }
}

/// Cosine similarity of two vectors.
///
/// `None` when the dimensions differ, either vector is empty, or either has
/// zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
        (0.0f64, 0.0f64, 0.0f64),
        |(dot, na, nb), (&x, &y)| {
            let (x, y) = (x as f64, y as f64);
            (dot + x * y, na + x * x, nb + y * y)
        },
    );

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    Some((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}

/// Bounded, insertion-ordered cache of retrieval results.
///
/// When full, the oldest inserted entry is evicted regardless of how
/// recently it was matched.
#[derive(Debug, Clone)]
pub struct SessionRetrievalCache {
    entries: VecDeque<RetrievalCacheEntry>,
    capacity: usize,
}

impl SessionRetrievalCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// First entry (oldest first) whose vector has the same dimensionality
    /// and a cosine similarity of at least `threshold`.
    pub fn find_similar(&self, vector: &[f32], threshold: f32) -> Option<&RetrievalCacheEntry> {
        self.entries.iter().find(|entry| {
            entry
                .vector
                .as_deref()
                .and_then(|cached| cosine_similarity(cached, vector))
                .is_some_and(|similarity| similarity >= threshold)
        })
    }

    /// Entry cached for exactly this query text.
    pub fn find_by_text(&self, text: &str) -> Option<&RetrievalCacheEntry> {
        self.entries.iter().find(|entry| entry.query == text)
    }

    /// Append an entry, evicting the oldest when at capacity.
    pub fn add(&mut self, entry: RetrievalCacheEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> impl Iterator<Item = &RetrievalCacheEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(query: &str, vector: Option<Vec<f32>>) -> RetrievalCacheEntry {
        RetrievalCacheEntry::new(query, vector, vec![RetrievalResult::new(query, "doc", 0.9)])
    }

    #[test]
    fn test_cosine_similarity_basics() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[], &[]), None);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut cache = SessionRetrievalCache::new(4);
        cache.add(entry("q", Some(vec![3.0, 4.0])));

        assert!(cache.find_similar(&[3.0, 4.0], 1.0).is_some());
        assert!(cache.find_similar(&[3.0, 4.0], 1.01).is_none());
    }

    #[test]
    fn test_dimension_mismatch_never_matches() {
        let mut cache = SessionRetrievalCache::new(4);
        cache.add(entry("q", Some(vec![1.0, 0.0, 0.0])));
        cache.add(entry("no vector", None));
        assert!(cache.find_similar(&[1.0, 0.0], 0.0).is_none());
    }

    #[test]
    fn test_find_similar_returns_first_match() {
        let mut cache = SessionRetrievalCache::new(4);
        cache.add(entry("older", Some(vec![1.0, 0.1])));
        cache.add(entry("newer", Some(vec![1.0, 0.0])));
        assert_eq!(cache.find_similar(&[1.0, 0.0], 0.9).unwrap().query, "older");
    }

    #[test]
    fn test_fifo_eviction() {
        let mut cache = SessionRetrievalCache::new(2);
        cache.add(entry("a", None));
        cache.add(entry("b", None));
        assert!(cache.find_by_text("a").is_some());
        cache.add(entry("c", None));

        assert_eq!(cache.len(), 2);
        assert!(cache.find_by_text("a").is_none());
        assert!(cache.find_by_text("b").is_some());
        assert!(cache.find_by_text("c").is_some());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = SessionRetrievalCache::new(0);
        cache.add(entry("a", None));
        assert!(cache.is_empty());
    }
}
