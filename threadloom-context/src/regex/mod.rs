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

//! Regex rewriting of message text.
//!
//! Rules come from three configuration layers, are ordered by their
//! preset's priority, and are filtered per message by role and depth.

pub mod apply;
pub mod resolver;
pub mod rules;

pub use apply::{
    apply_render_rules, apply_rule, apply_rules_to_messages, compile_pattern, expand_replacement,
    CompiledPattern, PatternCache, RuleApplication, DEFAULT_FLAGS,
};
pub use resolver::{
    filter_rules_by_depth, filter_rules_by_role, message_depth, resolve_raw_rules, ResolvedRule,
    RuleResolver,
};
pub use rules::{
    ApplyTo, ChatRegexConfig, ChatRegexRule, DepthRange, RegexPreset, RegexStage,
    DEFAULT_PRESET_PRIORITY,
};
