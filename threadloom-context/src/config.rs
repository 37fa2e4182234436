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

//! Configuration layers consumed by the context pipeline.
//!
//! Three read-only sources feed a request: the process-wide
//! [`GlobalConfig`], the [`AgentConfig`] of the agent being talked to, and
//! an optional [`UserProfile`] persona. Each can carry regex rules; the
//! agent also carries the preset messages that form the prompt skeleton.

use crate::error::ContextResult;
use crate::regex::ChatRegexConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use threadloom_core::{MessageContent, Role};
use threadloom_memory::RetrievalCacheConfig;

/// Anchor where the conversation history is spliced in.
pub const CHAT_HISTORY_ANCHOR: &str = "chat_history";
/// Anchor where the user persona text is placed.
pub const USER_PROFILE_ANCHOR: &str = "user_profile";
/// Default anchor for retrieved knowledge.
pub const KNOWLEDGE_ANCHOR: &str = "knowledge";

fn parse_toml<T: DeserializeOwned>(input: &str) -> ContextResult<T> {
    Ok(toml::from_str(input)?)
}

fn parse_json<T: DeserializeOwned>(input: &str) -> ContextResult<T> {
    Ok(serde_json::from_str(input)?)
}

fn default_true() -> bool {
    true
}

/// Process-wide settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub regex: Option<ChatRegexConfig>,

    #[serde(default)]
    pub context: ContextSettings,

    /// Presets shared by every agent, ordered before the agent's own.
    #[serde(default)]
    pub preset_messages: Vec<PresetMessage>,
}

impl GlobalConfig {
    pub fn with_preset(mut self, preset: PresetMessage) -> Self {
        self.preset_messages.push(preset);
        self
    }

    pub fn from_toml_str(input: &str) -> ContextResult<Self> {
        parse_toml(input)
    }

    pub fn from_json_str(input: &str) -> ContextResult<Self> {
        parse_json(input)
    }
}

/// Defaults applied when an agent does not specify its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Model id used for token counting when the agent names none.
    #[serde(default = "default_model_id")]
    pub default_model_id: String,

    /// Characters per token for the heuristic token calculator.
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f64,
}

fn default_model_id() -> String {
    "default".to_string()
}

fn default_chars_per_token() -> f64 {
    4.0
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            default_model_id: default_model_id(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

/// Per-agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub model_id: Option<String>,

    /// Authored prompt messages, in order.
    #[serde(default)]
    pub preset_messages: Vec<PresetMessage>,

    #[serde(default)]
    pub regex: Option<ChatRegexConfig>,

    #[serde(default)]
    pub context_limit: ContextLimitSettings,

    #[serde(default)]
    pub retrieval: Option<RetrievalSettings>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            model_id: None,
            preset_messages: Vec::new(),
            regex: None,
            context_limit: ContextLimitSettings::default(),
            retrieval: None,
        }
    }

    pub fn from_toml_str(input: &str) -> ContextResult<Self> {
        parse_toml(input)
    }

    pub fn from_json_str(input: &str) -> ContextResult<Self> {
        parse_json(input)
    }

    pub fn with_preset(mut self, preset: PresetMessage) -> Self {
        self.preset_messages.push(preset);
        self
    }

    pub fn with_context_limit(mut self, limit: ContextLimitSettings) -> Self {
        self.context_limit = limit;
        self
    }

    pub fn with_regex(mut self, regex: ChatRegexConfig) -> Self {
        self.regex = Some(regex);
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalSettings) -> Self {
        self.retrieval = Some(retrieval);
        self
    }
}

/// User persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Persona text placed at the `user_profile` anchor.
    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub regex: Option<ChatRegexConfig>,

    /// Persona presets, ordered after the agent's.
    #[serde(default)]
    pub preset_messages: Vec<PresetMessage>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            content: content.into(),
            regex: None,
            preset_messages: Vec::new(),
        }
    }

    pub fn with_preset(mut self, preset: PresetMessage) -> Self {
        self.preset_messages.push(preset);
        self
    }

    pub fn from_toml_str(input: &str) -> ContextResult<Self> {
        parse_toml(input)
    }

    pub fn from_json_str(input: &str) -> ContextResult<Self> {
        parse_json(input)
    }
}

/// Token budget for the assembled context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextLimitSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Total budget including preset messages.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: i64,

    /// Characters kept from each truncated message; 0 (or negative)
    /// replaces the whole content with a placeholder.
    #[serde(default)]
    pub retained_characters: i64,
}

fn default_max_context_tokens() -> i64 {
    8000
}

impl Default for ContextLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_context_tokens: default_max_context_tokens(),
            retained_characters: 0,
        }
    }
}

impl ContextLimitSettings {
    pub fn new(max_context_tokens: i64, retained_characters: i64) -> Self {
        Self {
            enabled: true,
            max_context_tokens,
            retained_characters,
        }
    }
}

/// Knowledge retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Cosine similarity at or above which a cached query is reused.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_embedding_cache_capacity")]
    pub embedding_cache_capacity: u64,

    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    #[serde(default = "default_decay_factor")]
    pub decay_factor: f32,

    /// Anchor the knowledge message is placed after.
    #[serde(default = "default_anchor")]
    pub anchor: String,

    /// Embedding model; the chat model id is used when unset.
    #[serde(default)]
    pub embedding_model_id: Option<String>,
}

fn default_top_k() -> usize {
    5
}

fn default_similarity_threshold() -> f32 {
    0.95
}

fn default_cache_capacity() -> usize {
    32
}

fn default_embedding_cache_capacity() -> u64 {
    256
}

fn default_max_history_turns() -> usize {
    3
}

fn default_decay_factor() -> f32 {
    0.5
}

fn default_anchor() -> String {
    KNOWLEDGE_ANCHOR.to_string()
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            cache_capacity: default_cache_capacity(),
            embedding_cache_capacity: default_embedding_cache_capacity(),
            max_history_turns: default_max_history_turns(),
            decay_factor: default_decay_factor(),
            anchor: default_anchor(),
            embedding_model_id: None,
        }
    }
}

impl RetrievalSettings {
    /// Cache configuration for a session created under these settings.
    pub fn cache_config(&self) -> RetrievalCacheConfig {
        RetrievalCacheConfig {
            result_cache_capacity: self.cache_capacity,
            embedding_cache_capacity: self.embedding_cache_capacity,
            max_history_turns: self.max_history_turns,
            decay_factor: self.decay_factor,
        }
    }
}

/// One authored prompt message.
///
/// A preset with `anchor` set is a placeholder marking a named insertion
/// point (for example `chat_history`); its own content is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetMessage {
    pub id: String,

    #[serde(default = "default_role")]
    pub role: Role,

    #[serde(default)]
    pub content: MessageContent,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub anchor: Option<String>,

    #[serde(default)]
    pub injection_strategy: Option<InjectionStrategy>,
}

fn default_role() -> Role {
    Role::System
}

impl PresetMessage {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            enabled: true,
            anchor: None,
            injection_strategy: None,
        }
    }

    /// Placeholder for a named anchor.
    pub fn anchor(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            anchor: Some(name.into()),
            ..Self::new(id, Role::System, "")
        }
    }

    pub fn with_strategy(mut self, strategy: InjectionStrategy) -> Self {
        self.injection_strategy = Some(strategy);
        self
    }

    pub fn is_anchor(&self) -> bool {
        self.anchor.is_some()
    }
}

/// Side of an anchor an injection lands on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorPosition {
    Before,
    #[default]
    After,
}

/// Placement of an injected preset.
///
/// `depth` wins over `depth_spec`, which wins over `anchor_target`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InjectionStrategy {
    /// Messages from the end of the history (0 = after the newest).
    #[serde(default)]
    pub depth: Option<usize>,

    /// Depth list such as `"3,5"` or `"2-10/2"`.
    #[serde(default)]
    pub depth_spec: Option<String>,

    #[serde(default)]
    pub anchor_target: Option<String>,

    #[serde(default)]
    pub anchor_position: AnchorPosition,

    /// Tie-break among injections at the same place; lower is older.
    #[serde(default)]
    pub order: Option<i32>,
}

impl InjectionStrategy {
    pub fn at_depth(depth: usize) -> Self {
        Self {
            depth: Some(depth),
            ..Default::default()
        }
    }

    pub fn at_depths(spec: impl Into<String>) -> Self {
        Self {
            depth_spec: Some(spec.into()),
            ..Default::default()
        }
    }

    pub fn at_anchor(target: impl Into<String>, position: AnchorPosition) -> Self {
        Self {
            anchor_target: Some(target.into()),
            anchor_position: position,
            ..Default::default()
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }
}
