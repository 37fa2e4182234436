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

//! Preset classification and positional injection.

use super::depth::DepthSpec;
use crate::config::{AnchorPosition, PresetMessage};
use crate::message::{ContextMessage, MessageOrigin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Order given to injections that do not specify one.
pub const DEFAULT_INJECTION_ORDER: i32 = 100;

/// A message inserted a fixed number of messages from the end of history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthInjection {
    pub message: ContextMessage,
    pub depth: usize,
    pub order: i32,
}

/// A message inserted next to a named anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorInjection {
    pub message: ContextMessage,
    pub anchor_target: String,
    pub position: AnchorPosition,
    pub order: i32,
}

/// Presets split by how they are placed.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedPresets {
    /// Presets without a placement, in authored order (anchors included).
    pub skeleton: Vec<PresetMessage>,
    pub depth_injections: Vec<DepthInjection>,
    pub anchor_injections: Vec<AnchorInjection>,
}

fn injected(preset: &PresetMessage) -> ContextMessage {
    ContextMessage::new(
        preset.role,
        preset.content.clone(),
        MessageOrigin::Injection {
            preset_id: preset.id.clone(),
        },
    )
}

/// Replace every preset carrying a `depth_spec` (and no explicit `depth`)
/// with one copy per expanded depth. Presets whose spec expands to nothing
/// keep their remaining strategy.
pub fn expand_depth_specs(presets: &[PresetMessage]) -> Vec<PresetMessage> {
    let mut expanded = Vec::with_capacity(presets.len());

    for preset in presets {
        let spec = preset
            .injection_strategy
            .as_ref()
            .filter(|s| s.depth.is_none())
            .and_then(|s| s.depth_spec.as_deref())
            .map(DepthSpec::parse);

        match spec {
            Some(spec) if !spec.is_empty() => {
                for depth in spec.depths() {
                    let mut copy = preset.clone();
                    if let Some(strategy) = copy.injection_strategy.as_mut() {
                        strategy.depth = Some(*depth);
                        strategy.depth_spec = None;
                    }
                    expanded.push(copy);
                }
            }
            _ => {
                let mut copy = preset.clone();
                if let Some(strategy) = copy.injection_strategy.as_mut() {
                    strategy.depth_spec = None;
                }
                expanded.push(copy);
            }
        }
    }

    expanded
}

/// Split enabled presets into skeleton, depth injections and anchor
/// injections. `depth` takes precedence over `anchor_target`; a strategy
/// with neither leaves the preset in the skeleton.
pub fn classify_preset_messages(presets: &[PresetMessage]) -> ClassifiedPresets {
    let mut classified = ClassifiedPresets::default();

    for preset in presets.iter().filter(|p| p.enabled) {
        let Some(strategy) = preset.injection_strategy.as_ref() else {
            classified.skeleton.push(preset.clone());
            continue;
        };
        let order = strategy.order.unwrap_or(DEFAULT_INJECTION_ORDER);

        if let Some(depth) = strategy.depth {
            classified.depth_injections.push(DepthInjection {
                message: injected(preset),
                depth,
                order,
            });
        } else if let Some(target) = strategy.anchor_target.as_ref() {
            classified.anchor_injections.push(AnchorInjection {
                message: injected(preset),
                anchor_target: target.clone(),
                position: strategy.anchor_position,
                order,
            });
        } else {
            classified.skeleton.push(preset.clone());
        }
    }

    debug!(
        skeleton = classified.skeleton.len(),
        depth = classified.depth_injections.len(),
        anchor = classified.anchor_injections.len(),
        "Classified preset messages"
    );
    classified
}

/// Insert depth injections into `history`.
///
/// Depths are processed from largest to smallest; each group lands at
/// `max(0, len - depth)` of the array as it stands at that point, with
/// lower `order` closer to the oldest end.
pub fn apply_depth_injections(
    mut history: Vec<ContextMessage>,
    injections: &[DepthInjection],
) -> Vec<ContextMessage> {
    let mut by_depth: BTreeMap<usize, Vec<&DepthInjection>> = BTreeMap::new();
    for injection in injections {
        by_depth.entry(injection.depth).or_default().push(injection);
    }

    for (depth, mut group) in by_depth.into_iter().rev() {
        group.sort_by_key(|i| i.order);
        let index = history.len().saturating_sub(depth);
        history.splice(index..index, group.into_iter().map(|i| i.message.clone()));
    }

    history
}

/// Injections for one anchor, split by side and sorted by order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorBuckets {
    pub before: Vec<ContextMessage>,
    pub after: Vec<ContextMessage>,
}

/// Group anchor injections by target.
pub fn group_anchor_injections(injections: &[AnchorInjection]) -> BTreeMap<String, AnchorBuckets> {
    let mut sorted: Vec<&AnchorInjection> = injections.iter().collect();
    sorted.sort_by_key(|i| i.order);

    let mut groups: BTreeMap<String, AnchorBuckets> = BTreeMap::new();
    for injection in sorted {
        let buckets = groups.entry(injection.anchor_target.clone()).or_default();
        match injection.position {
            AnchorPosition::Before => buckets.before.push(injection.message.clone()),
            AnchorPosition::After => buckets.after.push(injection.message.clone()),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InjectionStrategy;
    use threadloom_core::Role;

    fn history(n: usize) -> Vec<ContextMessage> {
        (0..n)
            .map(|i| {
                ContextMessage::new(
                    Role::User,
                    format!("m{i}"),
                    MessageOrigin::History {
                        node_id: format!("m{i}"),
                    },
                )
            })
            .collect()
    }

    fn depth_injection(text: &str, depth: usize, order: i32) -> DepthInjection {
        DepthInjection {
            message: ContextMessage::new(
                Role::System,
                text,
                MessageOrigin::Injection {
                    preset_id: text.to_string(),
                },
            ),
            depth,
            order,
        }
    }

    fn texts(messages: &[ContextMessage]) -> Vec<String> {
        messages.iter().map(|m| m.text().into_owned()).collect()
    }

    #[test]
    fn test_depth_one_precedes_newest() {
        let result = apply_depth_injections(history(4), &[depth_injection("i", 1, 0)]);
        assert_eq!(texts(&result), vec!["m0", "m1", "m2", "i", "m3"]);
    }

    #[test]
    fn test_depth_zero_appends() {
        let result = apply_depth_injections(history(2), &[depth_injection("i", 0, 0)]);
        assert_eq!(texts(&result), vec!["m0", "m1", "i"]);
    }

    #[test]
    fn test_depth_beyond_history_goes_first() {
        let result = apply_depth_injections(history(2), &[depth_injection("i", 9, 0)]);
        assert_eq!(texts(&result), vec!["i", "m0", "m1"]);
    }

    #[test]
    fn test_mixed_depths_and_order() {
        let result = apply_depth_injections(
            history(4),
            &[
                depth_injection("late", 1, 200),
                depth_injection("deep", 3, 0),
                depth_injection("early", 1, 10),
            ],
        );
        assert_eq!(
            texts(&result),
            vec!["m0", "deep", "m1", "m2", "early", "late", "m3"]
        );
    }

    #[test]
    fn test_classification() {
        let presets = vec![
            PresetMessage::new("sys", Role::System, "rules"),
            PresetMessage::anchor("hist", "chat_history"),
            PresetMessage::new("d", Role::System, "depth").with_strategy(InjectionStrategy {
                depth: Some(2),
                anchor_target: Some("chat_history".into()),
                ..Default::default()
            }),
            PresetMessage::new("a", Role::User, "anchor")
                .with_strategy(InjectionStrategy::at_anchor("chat_history", AnchorPosition::Before).with_order(3)),
            PresetMessage::new("plain", Role::User, "no placement").with_strategy(InjectionStrategy::default()),
            PresetMessage {
                enabled: false,
                ..PresetMessage::new("off", Role::User, "disabled")
            },
        ];

        let classified = classify_preset_messages(&presets);
        let skeleton: Vec<_> = classified.skeleton.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(skeleton, vec!["sys", "hist", "plain"]);
        assert_eq!(classified.depth_injections.len(), 1);
        assert_eq!(classified.depth_injections[0].order, DEFAULT_INJECTION_ORDER);
        assert_eq!(classified.anchor_injections.len(), 1);
        assert_eq!(classified.anchor_injections[0].order, 3);
    }

    #[test]
    fn test_expand_depth_specs() {
        let presets = vec![
            PresetMessage::new("multi", Role::System, "x").with_strategy(InjectionStrategy::at_depths("1,3")),
            PresetMessage::new("bad", Role::System, "y").with_strategy(InjectionStrategy {
                depth_spec: Some("nope".into()),
                anchor_target: Some("knowledge".into()),
                ..Default::default()
            }),
        ];
        let expanded = expand_depth_specs(&presets);
        assert_eq!(expanded.len(), 3);

        let classified = classify_preset_messages(&expanded);
        let depths: Vec<_> = classified.depth_injections.iter().map(|i| i.depth).collect();
        assert_eq!(depths, vec![1, 3]);
        assert_eq!(classified.anchor_injections[0].anchor_target, "knowledge");
    }

    #[test]
    fn test_anchor_grouping() {
        let make = |text: &str, position, order| AnchorInjection {
            message: ContextMessage::new(Role::System, text, MessageOrigin::Knowledge),
            anchor_target: "chat_history".into(),
            position,
            order,
        };
        let groups = group_anchor_injections(&[
            make("b2", AnchorPosition::Before, 2),
            make("a1", AnchorPosition::After, 1),
            make("b1", AnchorPosition::Before, 1),
        ]);
        let buckets = &groups["chat_history"];
        assert_eq!(texts(&buckets.before), vec!["b1", "b2"]);
        assert_eq!(texts(&buckets.after), vec!["a1"]);
    }
}
