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

//! Knowledge retrieval stage.
//!
//! Looks up knowledge for the newest user message through the session's
//! retrieval caches, falling back to the external embedder and retriever,
//! and injects the blended results as one system message.

use super::context::{LogLevel, PipelineContext};
use super::{stage, ContextProcessor};
use crate::config::{AnchorPosition, RetrievalSettings};
use crate::error::ContextResult;
use crate::injection::{AnchorInjection, DepthInjection};
use crate::message::{ContextMessage, MessageOrigin};
use async_trait::async_trait;
use serde_json::json;
use std::fmt::Write;
use std::sync::Arc;
use threadloom_core::Role;
use threadloom_memory::{
    AggregatedResult, MemoryResult, RetrievalCacheEntry, RetrievalCacheRegistry, RetrievalResult,
    SessionCaches, TurnRecord,
};
use tracing::{debug, warn};

/// Produces embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, model_id: &str) -> MemoryResult<Vec<f32>>;
}

/// Searches a knowledge base.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        vector: &[f32],
        top_k: usize,
    ) -> MemoryResult<Vec<RetrievalResult>>;
}

/// Render aggregated results as the body of the knowledge message.
pub fn format_knowledge(results: &[AggregatedResult]) -> String {
    let mut out = String::from("Relevant knowledge:");
    for (index, item) in results.iter().enumerate() {
        let _ = write!(out, "\n[{}] {}", index + 1, item.result.content.trim());
        if let Some(source) = item.result.source.as_deref() {
            let _ = write!(out, " (source: {source})");
        }
    }
    out
}

/// Where the results of a lookup came from.
#[derive(Debug, Clone, Copy)]
enum LookupSource {
    ExactQuery,
    SimilarQuery,
    Retriever,
}

impl LookupSource {
    fn as_str(&self) -> &'static str {
        match self {
            LookupSource::ExactQuery => "exact_query",
            LookupSource::SimilarQuery => "similar_query",
            LookupSource::Retriever => "retriever",
        }
    }
}

/// Pipeline stage injecting retrieved knowledge.
///
/// Runs only when the agent has retrieval enabled.
pub struct KnowledgeRetrievalProcessor {
    registry: Arc<RetrievalCacheRegistry>,
    embedder: Arc<dyn Embedder>,
    retriever: Arc<dyn KnowledgeRetriever>,
}

impl KnowledgeRetrievalProcessor {
    pub fn new(
        registry: Arc<RetrievalCacheRegistry>,
        embedder: Arc<dyn Embedder>,
        retriever: Arc<dyn KnowledgeRetriever>,
    ) -> Self {
        Self {
            registry,
            embedder,
            retriever,
        }
    }

    /// Results for `query`, served from the session caches when possible.
    async fn lookup(
        &self,
        caches: &SessionCaches,
        settings: &RetrievalSettings,
        query: &str,
        model_id: &str,
    ) -> ContextResult<(Vec<RetrievalResult>, LookupSource)> {
        let exact = caches
            .retrieval
            .lock()
            .find_by_text(query)
            .map(|entry| entry.results.clone());
        if let Some(results) = exact {
            return Ok((results, LookupSource::ExactQuery));
        }

        let vector = match caches.embeddings.get(model_id, query).await {
            Some(vector) => vector,
            None => {
                let vector = self.embedder.embed(query, model_id).await?;
                caches.embeddings.set(model_id, query, vector).await
            }
        };

        let similar = caches
            .retrieval
            .lock()
            .find_similar(&vector, settings.similarity_threshold)
            .map(|entry| entry.results.clone());
        if let Some(results) = similar {
            return Ok((results, LookupSource::SimilarQuery));
        }

        let results = self.retriever.retrieve(query, &vector, settings.top_k).await?;
        caches.retrieval.lock().add(RetrievalCacheEntry::new(
            query.to_string(),
            Some(vector.to_vec()),
            results.clone(),
        ));
        Ok((results, LookupSource::Retriever))
    }
}

#[async_trait]
impl ContextProcessor for KnowledgeRetrievalProcessor {
    fn id(&self) -> &str {
        stage::KNOWLEDGE_RETRIEVAL
    }

    fn priority(&self) -> i32 {
        stage::KNOWLEDGE_RETRIEVAL_PRIORITY
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> ContextResult<()> {
        let Some(settings) = ctx.agent.retrieval.clone().filter(|s| s.enabled) else {
            return Ok(());
        };

        let query = ctx
            .history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text().trim().to_string())
            .filter(|q| !q.is_empty());
        let Some(query) = query else {
            ctx.log(self.id(), LogLevel::Debug, "No user query; retrieval skipped");
            return Ok(());
        };

        let caches = self
            .registry
            .get_or_create_with(&ctx.session.id, &settings.cache_config());
        let model_id = settings
            .embedding_model_id
            .clone()
            .unwrap_or_else(|| ctx.model_id.clone());

        let (results, source) = match self.lookup(&caches, &settings, &query, &model_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(session_id = %ctx.session.id, error = %e, "Knowledge lookup failed; skipping retrieval");
                ctx.log(
                    self.id(),
                    LogLevel::Warn,
                    format!("Knowledge lookup failed: {e}; retrieval skipped"),
                );
                return Ok(());
            }
        };

        let fetched = results.len();
        let aggregated = {
            let mut turns = caches.turns.lock();
            // Regenerating the same message must not push out earlier turns.
            if turns.latest().map_or(true, |turn| turn.query != query) {
                turns.record(TurnRecord::new(query.clone(), results));
            }
            turns.aggregate(caches.config().effective_decay(), settings.top_k)
        };
        debug!(
            session_id = %ctx.session.id,
            source = source.as_str(),
            fetched,
            aggregated = aggregated.len(),
            "Knowledge lookup finished"
        );

        if aggregated.is_empty() {
            ctx.log(self.id(), LogLevel::Debug, "No knowledge found");
            return Ok(());
        }

        let message = ContextMessage::new(
            Role::System,
            format_knowledge(&aggregated),
            MessageOrigin::Knowledge,
        );
        let placement = if ctx.has_anchor(&settings.anchor) {
            ctx.anchor_injections.push(AnchorInjection {
                message,
                anchor_target: settings.anchor.clone(),
                position: AnchorPosition::After,
                order: 0,
            });
            format!("anchor:{}", settings.anchor)
        } else {
            ctx.depth_injections.push(DepthInjection {
                message,
                depth: 0,
                order: 0,
            });
            "depth:0".to_string()
        };

        let ids: Vec<&str> = aggregated.iter().map(|a| a.result.id.as_str()).collect();
        let details = json!({
            "source": source.as_str(),
            "placement": placement,
            "results": ids,
        });
        ctx.log_with_details(
            self.id(),
            LogLevel::Info,
            format!("Injected {} knowledge results", aggregated.len()),
            details,
        );
        Ok(())
    }
}
