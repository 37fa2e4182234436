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

//! Built-in pipeline stages.

use super::context::{LogLevel, PipelineContext};
use super::{stage, ContextProcessor};
use crate::config::{PresetMessage, CHAT_HISTORY_ANCHOR, USER_PROFILE_ANCHOR};
use crate::error::ContextResult;
use crate::injection::{
    apply_depth_injections, classify_preset_messages, expand_depth_specs, group_anchor_injections,
};
use crate::limiter::apply_context_limit;
use crate::message::{ContextMessage, MessageOrigin};
use crate::regex::{apply_rules_to_messages, PatternCache, RegexStage, RuleResolver};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use threadloom_core::{Role, TokenCalculator};
use tracing::{debug, warn};

/// Loads the active path of the session into `ctx.history`.
///
/// Disabled nodes are skipped, as is the root when it has no content.
pub struct HistoryLoaderProcessor;

#[async_trait]
impl ContextProcessor for HistoryLoaderProcessor {
    fn id(&self) -> &str {
        stage::HISTORY_LOADER
    }

    fn priority(&self) -> i32 {
        stage::HISTORY_LOADER_PRIORITY
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> ContextResult<()> {
        let root_id = ctx.session.root_node_id.clone();
        let path = ctx.session.active_path();
        let path_len = path.len();

        let history: Vec<ContextMessage> = path
            .into_iter()
            .filter(|node| node.metadata.is_enabled)
            .filter(|node| !(node.id == root_id && node.content.is_empty()))
            .map(ContextMessage::from_node)
            .collect();

        let skipped = path_len - history.len();
        ctx.history = history;
        ctx.log_with_details(
            self.id(),
            LogLevel::Debug,
            format!("Loaded {} history messages", ctx.history.len()),
            json!({ "active_leaf_id": ctx.session.active_leaf_id, "skipped": skipped }),
        );
        Ok(())
    }
}

/// Applies request-stage regex rules from every configuration layer to the
/// history.
pub struct RegexProcessor {
    resolver: Arc<RuleResolver>,
    patterns: PatternCache,
}

impl Default for RegexProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexProcessor {
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(RuleResolver::new()))
    }

    /// Share a resolver so its memo can be invalidated from outside.
    pub fn with_resolver(resolver: Arc<RuleResolver>) -> Self {
        Self {
            resolver,
            patterns: PatternCache::new(),
        }
    }

    pub fn resolver(&self) -> &Arc<RuleResolver> {
        &self.resolver
    }
}

#[async_trait]
impl ContextProcessor for RegexProcessor {
    fn id(&self) -> &str {
        stage::REGEX_PROCESSOR
    }

    fn priority(&self) -> i32 {
        stage::REGEX_PROCESSOR_PRIORITY
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> ContextResult<()> {
        let rules = self.resolver.resolve(
            RegexStage::Request,
            ctx.global.as_deref(),
            &ctx.agent,
            ctx.user.as_deref(),
        );
        if rules.is_empty() {
            return Ok(());
        }

        let report = apply_rules_to_messages(&mut ctx.history, &rules, &self.patterns);
        for rule_id in &report.skipped_rules {
            ctx.log(
                self.id(),
                LogLevel::Warn,
                format!("Skipped rule '{rule_id}': invalid pattern"),
            );
        }
        ctx.log_with_details(
            self.id(),
            LogLevel::Debug,
            "Applied regex rules",
            json!({ "rules": rules.len(), "applied": report.applied }),
        );
        Ok(())
    }
}

/// Splits the presets of every layer into skeleton, depth and anchor
/// injections.
pub struct InjectionClassifierProcessor;

/// Presets in layer order: global, agent, user.
fn layered_presets(ctx: &PipelineContext) -> Vec<PresetMessage> {
    let global = ctx.global.iter().flat_map(|g| g.preset_messages.iter());
    let user = ctx.user.iter().flat_map(|u| u.preset_messages.iter());
    global
        .chain(ctx.agent.preset_messages.iter())
        .chain(user)
        .cloned()
        .collect()
}

#[async_trait]
impl ContextProcessor for InjectionClassifierProcessor {
    fn id(&self) -> &str {
        stage::INJECTION_CLASSIFIER
    }

    fn priority(&self) -> i32 {
        stage::INJECTION_CLASSIFIER_PRIORITY
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> ContextResult<()> {
        let expanded = expand_depth_specs(&layered_presets(ctx));
        let classified = classify_preset_messages(&expanded);

        ctx.skeleton = classified.skeleton;
        ctx.depth_injections.extend(classified.depth_injections);
        ctx.anchor_injections.extend(classified.anchor_injections);

        let details = json!({
            "skeleton": ctx.skeleton.len(),
            "depth_injections": ctx.depth_injections.len(),
            "anchor_injections": ctx.anchor_injections.len(),
        });
        ctx.log_with_details(self.id(), LogLevel::Debug, "Classified presets", details);
        Ok(())
    }
}

fn user_profile_message(ctx: &PipelineContext) -> Option<ContextMessage> {
    ctx.user
        .as_ref()
        .filter(|user| !user.content.is_empty())
        .map(|user| ContextMessage::new(Role::System, user.content.clone(), MessageOrigin::UserProfile))
}

/// Everything that will be sent besides the history.
fn budgeted_presets(ctx: &PipelineContext) -> Vec<ContextMessage> {
    let skeleton = ctx.skeleton.iter().filter(|p| !p.is_anchor()).map(|p| {
        ContextMessage::new(
            p.role,
            p.content.clone(),
            MessageOrigin::Preset {
                preset_id: p.id.clone(),
            },
        )
    });
    let depth = ctx.depth_injections.iter().map(|i| i.message.clone());
    let anchor = ctx.anchor_injections.iter().map(|i| i.message.clone());
    let profile = if ctx.has_anchor(USER_PROFILE_ANCHOR) {
        user_profile_message(ctx)
    } else {
        None
    };

    skeleton.chain(depth).chain(anchor).chain(profile).collect()
}

/// Enforces the agent's token budget on the history and records token
/// counts on the session's nodes.
pub struct ContextLimitProcessor {
    calculator: Arc<dyn TokenCalculator>,
}

impl ContextLimitProcessor {
    pub fn new(calculator: Arc<dyn TokenCalculator>) -> Self {
        Self { calculator }
    }
}

#[async_trait]
impl ContextProcessor for ContextLimitProcessor {
    fn id(&self) -> &str {
        stage::CONTEXT_LIMITER
    }

    fn priority(&self) -> i32 {
        stage::CONTEXT_LIMITER_PRIORITY
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> ContextResult<()> {
        let settings = ctx.agent.context_limit.clone();
        if !settings.enabled {
            debug!(agent_id = %ctx.agent.id, "Context limit disabled");
            return Ok(());
        }

        let presets = budgeted_presets(ctx);
        let limited = apply_context_limit(
            &ctx.history,
            &presets,
            &settings,
            &ctx.model_id,
            self.calculator.as_ref(),
        )
        .await;

        for (message, count) in ctx.history.iter().zip(&limited.token_counts) {
            if let (Some(node_id), Some(count)) = (message.node_id(), count) {
                ctx.session.record_token_count(
                    node_id,
                    count.count,
                    count.is_estimated,
                    count.tokenizer_name.clone(),
                );
            }
        }

        let details = json!({
            "preset_tokens": limited.preset_tokens,
            "available_tokens": limited.available_tokens,
            "kept": limited.kept,
            "truncated": limited.truncated,
            "kept_tokens": limited.kept_tokens,
            "failed_counts": limited.failed_counts,
        });
        if limited.budget_exhausted {
            ctx.log_with_details(
                self.id(),
                LogLevel::Warn,
                "Preset messages exceed the context budget; history dropped",
                details,
            );
        } else {
            ctx.log_with_details(self.id(), LogLevel::Info, "Applied context limit", details);
        }
        if limited.failed_counts > 0 {
            ctx.log(
                self.id(),
                LogLevel::Warn,
                format!("{} token counts failed and were treated as 0", limited.failed_counts),
            );
        }

        ctx.history = limited.messages.clone();
        ctx.limit = Some(limited);
        Ok(())
    }
}

/// Builds the final message list from skeleton, history and injections.
pub struct MessageAssemblerProcessor;

#[async_trait]
impl ContextProcessor for MessageAssemblerProcessor {
    fn id(&self) -> &str {
        stage::MESSAGE_ASSEMBLER
    }

    fn priority(&self) -> i32 {
        stage::MESSAGE_ASSEMBLER_PRIORITY
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> ContextResult<()> {
        let mut history = Some(apply_depth_injections(
            std::mem::take(&mut ctx.history),
            &ctx.depth_injections,
        ));
        let mut profile = user_profile_message(ctx);
        let mut groups = group_anchor_injections(&ctx.anchor_injections);
        let mut messages = Vec::new();

        for preset in &ctx.skeleton {
            let Some(anchor) = preset.anchor.as_deref() else {
                messages.push(ContextMessage::new(
                    preset.role,
                    preset.content.clone(),
                    MessageOrigin::Preset {
                        preset_id: preset.id.clone(),
                    },
                ));
                continue;
            };

            let buckets = groups.remove(anchor).unwrap_or_default();
            messages.extend(buckets.before);
            match anchor {
                CHAT_HISTORY_ANCHOR => messages.extend(history.take().into_iter().flatten()),
                USER_PROFILE_ANCHOR => messages.extend(profile.take()),
                _ => {}
            }
            messages.extend(buckets.after);
        }

        if let Some(history) = history {
            let buckets = groups.remove(CHAT_HISTORY_ANCHOR).unwrap_or_default();
            messages.extend(buckets.before);
            messages.extend(history);
            messages.extend(buckets.after);
        }

        let mut dropped = Vec::new();
        for (anchor, buckets) in groups {
            let count = buckets.before.len() + buckets.after.len();
            warn!(anchor = %anchor, count, "No anchor for injected messages; dropping them");
            dropped.push(format!("{anchor} ({count})"));
        }
        if !dropped.is_empty() {
            ctx.log(
                self.id(),
                LogLevel::Warn,
                format!("Dropped injections for missing anchors: {}", dropped.join(", ")),
            );
        }

        ctx.messages = messages;
        let assembled = ctx.messages.len();
        ctx.log(self.id(), LogLevel::Info, format!("Assembled {assembled} messages"));
        Ok(())
    }
}
