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

//! Threadloom Context
//!
//! Turns the active path of a conversation tree plus layered configuration
//! into the message list sent to a model.
//!
//! ## Stages
//!
//! | Priority | Stage | Purpose |
//! |---|---|---|
//! | 100 | `history-loader` | Active path to history |
//! | 200 | `regex-processor` | Request-stage regex rules |
//! | 300 | `injection-classifier` | Skeleton, depth and anchor injections |
//! | 400 | `knowledge-retrieval` | Optional retrieved knowledge |
//! | 500 | `context-limiter` | Token budget |
//! | 600 | `message-assembler` | Final message list |
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use threadloom_context::{AgentConfig, ContextPipeline, PipelineContext};
//! use threadloom_core::{ConversationSession, HeuristicTokenCalculator, Role};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = ConversationSession::new("s1", "Demo");
//! session.append_message(Role::User, "Hello!")?;
//!
//! let pipeline = ContextPipeline::standard(Arc::new(HeuristicTokenCalculator::new()));
//! let mut ctx = PipelineContext::new(session, Arc::new(AgentConfig::new("assistant")));
//! pipeline.run(&mut ctx).await;
//!
//! for message in &ctx.messages {
//!     println!("{}: {}", message.role, message.text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod injection;
pub mod limiter;
pub mod message;
pub mod pipeline;
pub mod regex;

pub use config::{
    AgentConfig, AnchorPosition, ContextLimitSettings, ContextSettings, GlobalConfig,
    InjectionStrategy, PresetMessage, RetrievalSettings, UserProfile, CHAT_HISTORY_ANCHOR,
    KNOWLEDGE_ANCHOR, USER_PROFILE_ANCHOR,
};
pub use error::{ContextError, ContextResult};
pub use injection::{
    apply_depth_injections, classify_preset_messages, expand_depth_specs, group_anchor_injections,
    AnchorBuckets, AnchorInjection, ClassifiedPresets, DepthInjection, DepthSpec,
};
pub use limiter::{
    apply_context_limit, truncate_content, LimitedHistory, TRUNCATION_PLACEHOLDER,
    TRUNCATION_SUFFIX,
};
pub use message::{ContextMessage, MessageOrigin};
pub use pipeline::{
    format_knowledge, stage, ContextLimitProcessor, ContextPipeline, ContextProcessor, Embedder,
    HistoryLoaderProcessor, InjectionClassifierProcessor, KnowledgeRetrievalProcessor,
    KnowledgeRetriever, LogLevel, MessageAssemblerProcessor, PipelineContext, PipelineLogEntry,
    RegexProcessor,
};
pub use crate::regex::{
    apply_render_rules, apply_rules_to_messages, filter_rules_by_depth, filter_rules_by_role,
    resolve_raw_rules, ChatRegexConfig, ChatRegexRule, PatternCache, RegexPreset, RegexStage,
    ResolvedRule, RuleResolver,
};
