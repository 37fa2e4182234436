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

//! Per-request pipeline state.

use crate::config::{AgentConfig, GlobalConfig, PresetMessage, UserProfile};
use crate::injection::{AnchorInjection, DepthInjection};
use crate::limiter::LimitedHistory;
use crate::message::ContextMessage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use threadloom_core::ConversationSession;

/// Severity of a pipeline log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Audit record of what a processor did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineLogEntry {
    pub processor_id: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Mutable state shared by the processors of one assembly request.
pub struct PipelineContext {
    /// The conversation; token counts are written back to its nodes.
    pub session: ConversationSession,
    pub agent: Arc<AgentConfig>,
    pub global: Option<Arc<GlobalConfig>>,
    pub user: Option<Arc<UserProfile>>,
    /// Model used for token counting.
    pub model_id: String,

    /// Messages loaded from the active path.
    pub history: Vec<ContextMessage>,
    /// Presets without a placement, anchors included.
    pub skeleton: Vec<PresetMessage>,
    pub depth_injections: Vec<DepthInjection>,
    pub anchor_injections: Vec<AnchorInjection>,
    pub limit: Option<LimitedHistory>,

    /// Final message list.
    pub messages: Vec<ContextMessage>,
    pub logs: Vec<PipelineLogEntry>,
}

impl PipelineContext {
    pub fn new(session: ConversationSession, agent: Arc<AgentConfig>) -> Self {
        let model_id = agent
            .model_id
            .clone()
            .unwrap_or_else(|| crate::config::ContextSettings::default().default_model_id);
        Self {
            session,
            agent,
            global: None,
            user: None,
            model_id,
            history: Vec::new(),
            skeleton: Vec::new(),
            depth_injections: Vec::new(),
            anchor_injections: Vec::new(),
            limit: None,
            messages: Vec::new(),
            logs: Vec::new(),
        }
    }

    /// Attach the global layer; its default model applies when the agent
    /// names none.
    pub fn with_global(mut self, global: Arc<GlobalConfig>) -> Self {
        if self.agent.model_id.is_none() {
            self.model_id = global.context.default_model_id.clone();
        }
        self.global = Some(global);
        self
    }

    pub fn with_user(mut self, user: Arc<UserProfile>) -> Self {
        self.user = Some(user);
        self
    }

    pub fn log(&mut self, processor_id: &str, level: LogLevel, message: impl Into<String>) {
        self.logs.push(PipelineLogEntry {
            processor_id: processor_id.to_string(),
            level,
            message: message.into(),
            details: None,
        });
    }

    pub fn log_with_details(
        &mut self,
        processor_id: &str,
        level: LogLevel,
        message: impl Into<String>,
        details: serde_json::Value,
    ) {
        self.logs.push(PipelineLogEntry {
            processor_id: processor_id.to_string(),
            level,
            message: message.into(),
            details: Some(details),
        });
    }

    /// Log entries written by `processor_id`.
    pub fn logs_for<'a>(&'a self, processor_id: &'a str) -> impl Iterator<Item = &'a PipelineLogEntry> {
        self.logs.iter().filter(move |e| e.processor_id == processor_id)
    }

    /// Whether the skeleton contains an anchor named `name`.
    pub fn has_anchor(&self, name: &str) -> bool {
        self.skeleton
            .iter()
            .any(|p| p.anchor.as_deref() == Some(name))
    }
}
