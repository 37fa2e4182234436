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

//! Context assembly pipeline.
//!
//! A request runs a list of [`ContextProcessor`]s over one shared
//! [`PipelineContext`]. Processors run in ascending priority; ties keep
//! registration order. A processor that fails is logged and skipped, and
//! the remaining processors still run.

mod context;
mod retrieval;
mod stages;

pub use context::{LogLevel, PipelineContext, PipelineLogEntry};
pub use retrieval::{format_knowledge, Embedder, KnowledgeRetrievalProcessor, KnowledgeRetriever};
pub use stages::{
    ContextLimitProcessor, HistoryLoaderProcessor, InjectionClassifierProcessor,
    MessageAssemblerProcessor, RegexProcessor,
};

use crate::error::ContextResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use threadloom_core::TokenCalculator;
use tracing::{debug, warn};

/// Built-in processor ids and priorities.
pub mod stage {
    pub const HISTORY_LOADER: &str = "history-loader";
    pub const REGEX_PROCESSOR: &str = "regex-processor";
    pub const INJECTION_CLASSIFIER: &str = "injection-classifier";
    pub const KNOWLEDGE_RETRIEVAL: &str = "knowledge-retrieval";
    pub const CONTEXT_LIMITER: &str = "context-limiter";
    pub const MESSAGE_ASSEMBLER: &str = "message-assembler";

    pub const HISTORY_LOADER_PRIORITY: i32 = 100;
    pub const REGEX_PROCESSOR_PRIORITY: i32 = 200;
    pub const INJECTION_CLASSIFIER_PRIORITY: i32 = 300;
    pub const KNOWLEDGE_RETRIEVAL_PRIORITY: i32 = 400;
    pub const CONTEXT_LIMITER_PRIORITY: i32 = 500;
    pub const MESSAGE_ASSEMBLER_PRIORITY: i32 = 600;
}

/// One step of the pipeline.
#[async_trait]
pub trait ContextProcessor: Send + Sync {
    fn id(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    async fn execute(&self, ctx: &mut PipelineContext) -> ContextResult<()>;
}

struct RegisteredProcessor {
    processor: Arc<dyn ContextProcessor>,
    sequence: u64,
}

/// Ordered registry of processors.
pub struct ContextPipeline {
    processors: RwLock<Vec<RegisteredProcessor>>,
    next_sequence: AtomicU64,
}

impl Default for ContextPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextPipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self {
            processors: RwLock::new(Vec::new()),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Pipeline with the built-in stages (everything except knowledge
    /// retrieval, which needs external services).
    pub fn standard(calculator: Arc<dyn TokenCalculator>) -> Self {
        let pipeline = Self::new();
        pipeline.register(Arc::new(HistoryLoaderProcessor));
        pipeline.register(Arc::new(RegexProcessor::new()));
        pipeline.register(Arc::new(InjectionClassifierProcessor));
        pipeline.register(Arc::new(ContextLimitProcessor::new(calculator)));
        pipeline.register(Arc::new(MessageAssemblerProcessor));
        pipeline
    }

    pub fn register(&self, processor: Arc<dyn ContextProcessor>) {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        debug!(
            processor_id = %processor.id(),
            priority = processor.priority(),
            "Registering context processor"
        );
        self.processors.write().push(RegisteredProcessor {
            processor,
            sequence,
        });
    }

    /// Remove every processor with `id`. Returns whether any was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut processors = self.processors.write();
        let before = processors.len();
        processors.retain(|p| p.processor.id() != id);
        processors.len() != before
    }

    /// Processors in execution order.
    pub fn ordered(&self) -> Vec<Arc<dyn ContextProcessor>> {
        let processors = self.processors.read();
        let mut ordered: Vec<&RegisteredProcessor> = processors.iter().collect();
        ordered.sort_by_key(|p| (p.processor.priority(), p.sequence));
        ordered.into_iter().map(|p| p.processor.clone()).collect()
    }

    pub fn processor_ids(&self) -> Vec<String> {
        self.ordered().iter().map(|p| p.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.processors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.read().is_empty()
    }

    /// Run every processor over `ctx`.
    pub async fn run(&self, ctx: &mut PipelineContext) {
        for processor in self.ordered() {
            let id = processor.id().to_string();
            if let Err(e) = processor.execute(ctx).await {
                warn!(processor_id = %id, session_id = %ctx.session.id, error = %e, "Context processor failed");
                ctx.log(&id, LogLevel::Error, e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::error::ContextError;
    use threadloom_core::ConversationSession;

    struct Recorder {
        id: &'static str,
        priority: i32,
        fail: bool,
    }

    #[async_trait]
    impl ContextProcessor for Recorder {
        fn id(&self) -> &str {
            self.id
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn execute(&self, ctx: &mut PipelineContext) -> ContextResult<()> {
            if self.fail {
                return Err(ContextError::processor(self.id, "failed on purpose"));
            }
            ctx.log(self.id, LogLevel::Info, "ran");
            Ok(())
        }
    }

    fn recorder(id: &'static str, priority: i32, fail: bool) -> Arc<dyn ContextProcessor> {
        Arc::new(Recorder { id, priority, fail })
    }

    fn context() -> PipelineContext {
        PipelineContext::new(
            ConversationSession::new("s", "test"),
            Arc::new(AgentConfig::new("agent")),
        )
    }

    #[test]
    fn test_priority_then_registration_order() {
        let pipeline = ContextPipeline::new();
        pipeline.register(recorder("late", 20, false));
        pipeline.register(recorder("tie-first", 10, false));
        pipeline.register(recorder("tie-second", 10, false));

        assert_eq!(pipeline.processor_ids(), vec!["tie-first", "tie-second", "late"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_pipeline() {
        let pipeline = ContextPipeline::new();
        pipeline.register(recorder("broken", 1, true));
        pipeline.register(recorder("after", 2, false));

        let mut ctx = context();
        pipeline.run(&mut ctx).await;

        assert_eq!(ctx.logs.len(), 2);
        assert_eq!(ctx.logs[0].processor_id, "broken");
        assert_eq!(ctx.logs[0].level, LogLevel::Error);
        assert_eq!(ctx.logs[1].processor_id, "after");
    }

    #[test]
    fn test_unregister() {
        let pipeline = ContextPipeline::standard(Arc::new(threadloom_core::HeuristicTokenCalculator::new()));
        assert_eq!(pipeline.len(), 5);
        assert!(pipeline.unregister(stage::REGEX_PROCESSOR));
        assert!(!pipeline.unregister(stage::REGEX_PROCESSOR));
        assert_eq!(
            pipeline.processor_ids(),
            vec![
                stage::HISTORY_LOADER,
                stage::INJECTION_CLASSIFIER,
                stage::CONTEXT_LIMITER,
                stage::MESSAGE_ASSEMBLER
            ]
        );
    }
}
