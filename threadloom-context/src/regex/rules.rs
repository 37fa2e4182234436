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

//! Regex rule types.

use serde::{Deserialize, Serialize};
use std::fmt;
use threadloom_core::Role;

/// Priority given to presets that do not declare one.
pub const DEFAULT_PRESET_PRIORITY: i32 = 100;

fn default_true() -> bool {
    true
}

fn default_target_roles() -> Vec<Role> {
    vec![Role::User, Role::Assistant]
}

/// When a rule runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegexStage {
    /// Display-time rewriting; never affects what is sent.
    Render,
    /// Rewriting of the context sent to the model.
    Request,
}

impl fmt::Display for RegexStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegexStage::Render => f.write_str("render"),
            RegexStage::Request => f.write_str("request"),
        }
    }
}

/// Stages a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyTo {
    #[serde(default)]
    pub render: bool,
    #[serde(default = "default_true")]
    pub request: bool,
}

impl Default for ApplyTo {
    fn default() -> Self {
        Self {
            render: false,
            request: true,
        }
    }
}

impl ApplyTo {
    pub fn includes(&self, stage: RegexStage) -> bool {
        match stage {
            RegexStage::Render => self.render,
            RegexStage::Request => self.request,
        }
    }
}

/// Inclusive message depth bounds (0 = newest message).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthRange {
    #[serde(default)]
    pub min: Option<usize>,
    #[serde(default)]
    pub max: Option<usize>,
}

impl DepthRange {
    pub fn contains(&self, depth: usize) -> bool {
        self.min.map_or(true, |min| depth >= min) && self.max.map_or(true, |max| depth <= max)
    }
}

/// A single text substitution rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRegexRule {
    #[serde(default)]
    pub id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_target_roles")]
    pub target_roles: Vec<Role>,

    #[serde(default)]
    pub depth_range: Option<DepthRange>,

    #[serde(default)]
    pub apply_to: ApplyTo,

    pub regex: String,

    /// JavaScript-style flags; `"gm"` when unset.
    #[serde(default)]
    pub flags: Option<String>,

    #[serde(default)]
    pub replacement: String,

    /// Substrings stripped from each capture group before substitution.
    #[serde(default)]
    pub trim_strings: Vec<String>,

    #[serde(default)]
    pub order: Option<i32>,
}

impl ChatRegexRule {
    pub fn new(id: impl Into<String>, regex: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            target_roles: default_target_roles(),
            depth_range: None,
            apply_to: ApplyTo::default(),
            regex: regex.into(),
            flags: None,
            replacement: replacement.into(),
            trim_strings: Vec::new(),
            order: None,
        }
    }

    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.target_roles = roles;
        self
    }

    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        self.flags = Some(flags.into());
        self
    }

    pub fn with_depth_range(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.depth_range = Some(DepthRange { min, max });
        self
    }

    pub fn with_trim_strings(mut self, trim: Vec<String>) -> Self {
        self.trim_strings = trim;
        self
    }

    pub fn with_apply_to(mut self, render: bool, request: bool) -> Self {
        self.apply_to = ApplyTo { render, request };
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }
}

/// A named, prioritized group of rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexPreset {
    #[serde(default)]
    pub id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower runs first; inherited by every rule in the preset.
    #[serde(default)]
    pub priority: Option<i32>,

    /// Position among presets of the same config.
    #[serde(default)]
    pub order: Option<i32>,

    #[serde(default)]
    pub rules: Vec<ChatRegexRule>,
}

impl RegexPreset {
    pub fn new(id: impl Into<String>, rules: Vec<ChatRegexRule>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            priority: None,
            order: None,
            rules,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }
}

/// Rule presets from one configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRegexConfig {
    #[serde(default)]
    pub presets: Vec<RegexPreset>,
}

impl ChatRegexConfig {
    pub fn new(presets: Vec<RegexPreset>) -> Self {
        Self { presets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_defaults_from_toml() {
        let config: ChatRegexConfig = toml::from_str(
            r#"
            [[presets]]
            id = "cleanup"
            priority = 10

            [[presets.rules]]
            id = "strip-thinking"
            regex = "<think>[\\s\\S]*?</think>"
            "#,
        )
        .unwrap();

        let rule = &config.presets[0].rules[0];
        assert!(rule.enabled);
        assert!(rule.apply_to.request);
        assert!(!rule.apply_to.render);
        assert_eq!(rule.target_roles, vec![Role::User, Role::Assistant]);
        assert_eq!(rule.replacement, "");
        assert_eq!(config.presets[0].priority, Some(10));
    }

    #[test]
    fn test_depth_range_bounds() {
        let range = DepthRange {
            min: Some(1),
            max: Some(3),
        };
        assert!(!range.contains(0));
        assert!(range.contains(1));
        assert!(range.contains(3));
        assert!(!range.contains(4));
        assert!(DepthRange::default().contains(1000));
    }
}
