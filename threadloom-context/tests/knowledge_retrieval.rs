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

//! Knowledge retrieval stage against the session retrieval caches.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use threadloom_context::{
    stage, AgentConfig, ContextPipeline, Embedder, KnowledgeRetrievalProcessor, KnowledgeRetriever,
    LogLevel, MessageOrigin, PipelineContext, PresetMessage, RetrievalSettings,
};
use threadloom_core::{ConversationSession, HeuristicTokenCalculator, Role};
use threadloom_memory::{MemoryError, MemoryResult, RetrievalCacheRegistry, RetrievalResult};

/// Embeds text as `[len, vowels]`; fails for "fail".
#[derive(Default)]
struct CountingEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, text: &str, _model_id: &str) -> MemoryResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text == "fail" {
            return Err(MemoryError::EmbeddingError("embedder offline".into()));
        }
        let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
        Ok(vec![text.len() as f32, vowels as f32])
    }
}

#[derive(Default)]
struct CountingRetriever {
    calls: AtomicUsize,
}

#[async_trait]
impl KnowledgeRetriever for CountingRetriever {
    async fn retrieve(
        &self,
        query: &str,
        _vector: &[f32],
        top_k: usize,
    ) -> MemoryResult<Vec<RetrievalResult>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if query == "outage" {
            return Err(MemoryError::RetrievalError("index unavailable".into()));
        }
        Ok((0..top_k.min(2))
            .map(|i| RetrievalResult::new(format!("{query}-{call}-{i}"), format!("fact {i} about {query}"), 0.9 - i as f32 * 0.1))
            .collect())
    }
}

struct Harness {
    registry: Arc<RetrievalCacheRegistry>,
    embedder: Arc<CountingEmbedder>,
    retriever: Arc<CountingRetriever>,
    pipeline: ContextPipeline,
}

fn harness() -> Harness {
    let registry = Arc::new(RetrievalCacheRegistry::default());
    let embedder = Arc::new(CountingEmbedder::default());
    let retriever = Arc::new(CountingRetriever::default());
    let pipeline = ContextPipeline::standard(Arc::new(HeuristicTokenCalculator::new()));
    pipeline.register(Arc::new(KnowledgeRetrievalProcessor::new(
        registry.clone(),
        embedder.clone(),
        retriever.clone(),
    )));
    Harness {
        registry,
        embedder,
        retriever,
        pipeline,
    }
}

fn agent(with_anchor: bool) -> Arc<AgentConfig> {
    let mut agent = AgentConfig::new("rag").with_retrieval(RetrievalSettings {
        similarity_threshold: 0.999,
        ..Default::default()
    });
    agent = agent.with_preset(PresetMessage::new("sys", Role::System, "system"));
    if with_anchor {
        agent = agent.with_preset(PresetMessage::anchor("k", "knowledge"));
    }
    Arc::new(agent.with_preset(PresetMessage::anchor("h", "chat_history")))
}

fn session(id: &str, query: &str) -> ConversationSession {
    let mut session = ConversationSession::new(id, "RAG");
    session.append_message(Role::User, query).unwrap();
    session
}

#[tokio::test]
async fn test_knowledge_lands_at_anchor() {
    let h = harness();
    let mut ctx = PipelineContext::new(session("s1", "dragons"), agent(true));
    h.pipeline.run(&mut ctx).await;

    assert_eq!(ctx.messages.len(), 3);
    assert_eq!(ctx.messages[1].origin, MessageOrigin::Knowledge);
    assert!(ctx.messages[1].text().starts_with("Relevant knowledge:"));
    assert_eq!(ctx.messages[2].text(), "dragons");
}

#[tokio::test]
async fn test_knowledge_falls_back_to_depth_zero() {
    let h = harness();
    let mut ctx = PipelineContext::new(session("s1", "dragons"), agent(false));
    h.pipeline.run(&mut ctx).await;

    let last = ctx.messages.last().unwrap();
    assert_eq!(last.origin, MessageOrigin::Knowledge);
}

#[tokio::test]
async fn test_repeated_query_hits_cache_across_requests() {
    let h = harness();
    for _ in 0..3 {
        let mut ctx = PipelineContext::new(session("s1", "dragons"), agent(true));
        h.pipeline.run(&mut ctx).await;
    }

    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.retriever.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.registry.session_count(), 1);
}

#[tokio::test]
async fn test_similar_query_reuses_results() {
    let h = harness();
    let mut ctx = PipelineContext::new(session("s1", "dragons"), agent(true));
    h.pipeline.run(&mut ctx).await;

    // Same length and vowel count: identical direction, similarity 1.0.
    let mut ctx = PipelineContext::new(session("s1", "drugons"), agent(true));
    h.pipeline.run(&mut ctx).await;

    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.retriever.calls.load(Ordering::SeqCst), 1);
    let entry = ctx
        .logs_for(stage::KNOWLEDGE_RETRIEVAL)
        .find(|e| e.level == LogLevel::Info)
        .unwrap();
    assert_eq!(entry.details.as_ref().unwrap()["source"], "similar_query");
}

#[tokio::test]
async fn test_sessions_do_not_share_cache() {
    let h = harness();
    let mut ctx = PipelineContext::new(session("A", "dragons"), agent(true));
    h.pipeline.run(&mut ctx).await;
    let mut ctx = PipelineContext::new(session("B", "dragons"), agent(true));
    h.pipeline.run(&mut ctx).await;

    assert_eq!(h.retriever.calls.load(Ordering::SeqCst), 2);

    assert!(h.registry.clear_session_cache("A"));
    let mut ctx = PipelineContext::new(session("A", "dragons"), agent(true));
    h.pipeline.run(&mut ctx).await;
    assert_eq!(h.retriever.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_embedder_failure_skips_stage() {
    let h = harness();
    let mut ctx = PipelineContext::new(session("s1", "fail"), agent(true));
    h.pipeline.run(&mut ctx).await;

    assert_eq!(ctx.messages.len(), 2);
    assert!(ctx
        .logs_for(stage::KNOWLEDGE_RETRIEVAL)
        .any(|e| e.level == LogLevel::Warn));
    assert!(ctx.logs.iter().all(|e| e.level != LogLevel::Error));
}

#[tokio::test]
async fn test_retriever_failure_caches_nothing() {
    let h = harness();
    let mut ctx = PipelineContext::new(session("s1", "outage"), agent(true));
    h.pipeline.run(&mut ctx).await;

    assert_eq!(ctx.messages.len(), 2);
    let warning = ctx
        .logs_for(stage::KNOWLEDGE_RETRIEVAL)
        .find(|e| e.level == LogLevel::Warn)
        .unwrap();
    assert!(warning.message.contains("Retrieval error: index unavailable"));

    let caches = h.registry.get_session_retrieval_cache("s1");
    assert!(caches.retrieval.lock().is_empty());
    assert!(caches.turns.lock().is_empty());
}

#[tokio::test]
async fn test_regenerating_same_message_records_one_turn() {
    let h = harness();
    for query in ["dragons", "knights", "knights", "knights"] {
        let mut ctx = PipelineContext::new(session("s1", query), agent(true));
        h.pipeline.run(&mut ctx).await;
    }

    let caches = h.registry.get_session_retrieval_cache("s1");
    let turns = caches.turns.lock();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns.latest().unwrap().query, "knights");
}

#[tokio::test]
async fn test_retrieval_disabled_is_noop() {
    let h = harness();
    let agent = Arc::new(AgentConfig::new("plain"));
    let mut ctx = PipelineContext::new(session("s1", "dragons"), agent);
    h.pipeline.run(&mut ctx).await;

    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.registry.session_count(), 0);
}
