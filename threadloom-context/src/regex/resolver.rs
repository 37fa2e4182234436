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

//! Rule collection and ordering.

use super::rules::{ChatRegexConfig, ChatRegexRule, RegexStage, DEFAULT_PRESET_PRIORITY};
use crate::config::{AgentConfig, GlobalConfig, UserProfile};
use dashmap::DashMap;
use std::sync::Arc;
use threadloom_core::Role;
use tracing::debug;

/// A rule together with the ordering it inherited from its preset.
#[derive(Debug, Clone)]
pub struct ResolvedRule {
    pub rule: Arc<ChatRegexRule>,
    pub preset_id: String,
    pub priority: i32,
    pub order: i32,
}

/// Collect the rules of `configs` that apply to `stage`, in execution order.
///
/// Within each config, enabled presets are visited by their `order`; the
/// flattened list is then stable-sorted by `(preset priority, rule order)`.
pub fn resolve_raw_rules(stage: RegexStage, configs: &[&ChatRegexConfig]) -> Vec<ResolvedRule> {
    let mut resolved = Vec::new();

    for config in configs {
        let mut presets: Vec<_> = config.presets.iter().filter(|p| p.enabled).collect();
        presets.sort_by_key(|p| p.order.unwrap_or(0));

        for preset in presets {
            let priority = preset.priority.unwrap_or(DEFAULT_PRESET_PRIORITY);
            resolved.extend(
                preset
                    .rules
                    .iter()
                    .filter(|rule| rule.enabled && rule.apply_to.includes(stage))
                    .map(|rule| ResolvedRule {
                        rule: Arc::new(rule.clone()),
                        preset_id: preset.id.clone(),
                        priority,
                        order: rule.order.unwrap_or(0),
                    }),
            );
        }
    }

    resolved.sort_by_key(|r| (r.priority, r.order));
    resolved
}

/// Rules targeting `role`.
pub fn filter_rules_by_role<'a, I>(rules: I, role: Role) -> Vec<&'a ResolvedRule>
where
    I: IntoIterator<Item = &'a ResolvedRule>,
{
    rules
        .into_iter()
        .filter(|r| r.rule.target_roles.contains(&role))
        .collect()
}

/// Rules whose depth range (if any) contains `depth`.
pub fn filter_rules_by_depth<'a, I>(rules: I, depth: usize) -> Vec<&'a ResolvedRule>
where
    I: IntoIterator<Item = &'a ResolvedRule>,
{
    rules
        .into_iter()
        .filter(|r| r.rule.depth_range.map_or(true, |range| range.contains(depth)))
        .collect()
}

/// Depth of position `index` in a list of `total` messages (0 = newest).
pub fn message_depth(index: usize, total: usize) -> usize {
    total.saturating_sub(1).saturating_sub(index)
}

type ResolverKey = (String, Option<String>, RegexStage);

/// Memoizes [`resolve_raw_rules`] per `(agent, user, stage)`.
///
/// The memo must be invalidated when any of the configuration layers
/// changes.
#[derive(Default)]
pub struct RuleResolver {
    memo: DashMap<ResolverKey, Arc<Vec<ResolvedRule>>>,
}

impl RuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules of the global, agent and user layers (in that order) for
    /// `stage`.
    pub fn resolve(
        &self,
        stage: RegexStage,
        global: Option<&GlobalConfig>,
        agent: &AgentConfig,
        user: Option<&UserProfile>,
    ) -> Arc<Vec<ResolvedRule>> {
        let key = (agent.id.clone(), user.map(|u| u.id.clone()), stage);
        if let Some(rules) = self.memo.get(&key) {
            return rules.clone();
        }

        let configs: Vec<&ChatRegexConfig> = global
            .and_then(|g| g.regex.as_ref())
            .into_iter()
            .chain(agent.regex.as_ref())
            .chain(user.and_then(|u| u.regex.as_ref()))
            .collect();

        let rules = Arc::new(resolve_raw_rules(stage, &configs));
        debug!(
            agent_id = %agent.id,
            stage = %stage,
            rules = rules.len(),
            "Resolved regex rules"
        );
        self.memo.insert(key, rules.clone());
        rules
    }

    pub fn invalidate_all(&self) {
        self.memo.clear();
    }

    pub fn invalidate_agent(&self, agent_id: &str) {
        self.memo.retain(|(agent, _, _), _| agent != agent_id);
    }

    pub fn cached_entries(&self) -> usize {
        self.memo.len()
    }
}
