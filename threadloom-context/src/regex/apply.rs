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

//! Rule application.
//!
//! Rules are authored with JavaScript regular-expression conventions
//! (flags string, lookaround, backreferences, `$1`/`$&` replacement
//! templates). Patterns compile through `fancy-regex`, flags become inline
//! group flags, and templates are expanded here because the crate's `$name`
//! syntax differs.

use super::resolver::{filter_rules_by_depth, filter_rules_by_role, message_depth, ResolvedRule};
use super::rules::ChatRegexRule;
use crate::message::ContextMessage;
use dashmap::DashMap;
use fancy_regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::Arc;
use threadloom_core::Role;
use tracing::warn;

/// Flags used when a rule does not specify any.
pub const DEFAULT_FLAGS: &str = "gm";

/// A compiled rule pattern.
#[derive(Debug)]
pub struct CompiledPattern {
    pub regex: Regex,
    /// Replace every match rather than only the first.
    pub global: bool,
}

/// Compile `pattern` with JavaScript-style `flags`.
pub fn compile_pattern(pattern: &str, flags: &str) -> Result<CompiledPattern, fancy_regex::Error> {
    let mut inline = String::new();
    let mut global = false;

    for flag in flags.chars() {
        match flag {
            'g' => global = true,
            'i' | 'm' | 's' | 'x' => {
                if !inline.contains(flag) {
                    inline.push(flag);
                }
            }
            // Unicode is always on; sticky and indices have no equivalent.
            'u' | 'y' | 'd' => {}
            other => warn!(flag = %other, pattern = %pattern, "Ignoring unknown regex flag"),
        }
    }

    let source = if inline.is_empty() {
        Cow::Borrowed(pattern)
    } else {
        Cow::Owned(format!("(?{inline}){pattern}"))
    };

    Ok(CompiledPattern {
        regex: Regex::new(&source)?,
        global,
    })
}

/// Memo of compiled patterns keyed by `(pattern, flags)`.
///
/// Invalid patterns are remembered too, so each is reported once.
#[derive(Default)]
pub struct PatternCache {
    patterns: DashMap<(String, String), Option<Arc<CompiledPattern>>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled pattern for `rule`, or `None` if it does not compile.
    pub fn get(&self, rule: &ChatRegexRule) -> Option<Arc<CompiledPattern>> {
        let flags = rule.flags.as_deref().unwrap_or(DEFAULT_FLAGS);
        let key = (rule.regex.clone(), flags.to_string());

        if let Some(cached) = self.patterns.get(&key) {
            return cached.clone();
        }

        let compiled = match compile_pattern(&rule.regex, flags) {
            Ok(pattern) => Some(Arc::new(pattern)),
            Err(e) => {
                warn!(rule_id = %rule.id, pattern = %rule.regex, error = %e, "Skipping invalid regex rule");
                None
            }
        };
        self.patterns.insert(key, compiled.clone());
        compiled
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn clear(&self) {
        self.patterns.clear();
    }
}

fn strip_all<'t>(text: &'t str, trim_strings: &[String]) -> Cow<'t, str> {
    let mut out = Cow::Borrowed(text);
    for needle in trim_strings.iter().filter(|s| !s.is_empty()) {
        if out.contains(needle.as_str()) {
            out = Cow::Owned(out.replace(needle.as_str(), ""));
        }
    }
    out
}

/// Expand a JavaScript-style replacement template for one match.
///
/// Supports `$$`, `$&`, `` $` ``, `$'`, `$1`..`$99` and `$<name>`. Capture
/// groups (not `$&`) are stripped of every `trim_strings` entry first.
/// Numbered references to missing groups are kept literally; an unknown
/// `$<name>` expands to nothing.
pub fn expand_replacement(
    template: &str,
    caps: &Captures<'_>,
    haystack: &str,
    trim_strings: &[String],
) -> String {
    let group_count = caps.len();
    let group = |index: usize| {
        caps.get(index)
            .map(|m| strip_all(m.as_str(), trim_strings))
            .unwrap_or(Cow::Borrowed(""))
    };
    let (match_start, match_end) = caps
        .get(0)
        .map(|m| (m.start(), m.end()))
        .unwrap_or((0, 0));

    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    let mut literal_start = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' || i + 1 >= bytes.len() {
            i += 1;
            continue;
        }

        let next = bytes[i + 1];
        let (expansion, consumed): (Option<Cow<'_, str>>, usize) = match next {
            b'$' => (Some(Cow::Borrowed("$")), 2),
            b'&' => (Some(Cow::Borrowed(&haystack[match_start..match_end])), 2),
            b'`' => (Some(Cow::Borrowed(&haystack[..match_start])), 2),
            b'\'' => (Some(Cow::Borrowed(&haystack[match_end..])), 2),
            b'0'..=b'9' => {
                let first = (next - b'0') as usize;
                let two_digit = bytes
                    .get(i + 2)
                    .filter(|b| b.is_ascii_digit())
                    .map(|b| first * 10 + (b - b'0') as usize)
                    .filter(|n| *n >= 1 && *n < group_count);
                match two_digit {
                    Some(n) => (Some(group(n)), 3),
                    None if first >= 1 && first < group_count => (Some(group(first)), 2),
                    None => (None, 0),
                }
            }
            b'<' => match template[i + 2..].find('>') {
                Some(close) => {
                    let name = &template[i + 2..i + 2 + close];
                    let value = caps
                        .name(name)
                        .map(|m| strip_all(m.as_str(), trim_strings))
                        .unwrap_or(Cow::Borrowed(""));
                    (Some(value), close + 3)
                }
                None => (None, 0),
            },
            _ => (None, 0),
        };

        match expansion {
            Some(value) => {
                out.push_str(&template[literal_start..i]);
                out.push_str(&value);
                i += consumed;
                literal_start = i;
            }
            None => i += 1,
        }
    }

    out.push_str(&template[literal_start..]);
    out
}

/// Apply one compiled rule to `text`.
///
/// Fails when matching itself errors, e.g. a backtracking limit is hit.
pub fn apply_rule(
    text: &str,
    rule: &ChatRegexRule,
    pattern: &CompiledPattern,
) -> Result<String, fancy_regex::Error> {
    let replacer = |caps: &Captures<'_>| {
        expand_replacement(&rule.replacement, caps, text, &rule.trim_strings)
    };
    let limit = if pattern.global { 0 } else { 1 };
    let replaced = pattern.regex.try_replacen(text, limit, replacer)?;
    Ok(replaced.into_owned())
}

/// Outcome of applying rules to a set of messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleApplication {
    /// Rule executions that changed text.
    pub applied: usize,
    /// Ids of rules skipped because their pattern did not compile or
    /// failed while matching.
    pub skipped_rules: Vec<String>,
}

impl RuleApplication {
    fn skip(&mut self, rule_id: &str) {
        if !self.skipped_rules.iter().any(|id| id == rule_id) {
            self.skipped_rules.push(rule_id.to_string());
        }
    }
}

fn apply_rule_chain(
    text: &str,
    rules: &[&ResolvedRule],
    patterns: &PatternCache,
    report: &mut RuleApplication,
) -> String {
    let mut current = text.to_string();
    for resolved in rules {
        let Some(pattern) = patterns.get(&resolved.rule) else {
            report.skip(&resolved.rule.id);
            continue;
        };
        let next = match apply_rule(&current, &resolved.rule, &pattern) {
            Ok(next) => next,
            Err(e) => {
                warn!(rule_id = %resolved.rule.id, error = %e, "Regex rule failed while matching");
                report.skip(&resolved.rule.id);
                continue;
            }
        };
        if next != current {
            report.applied += 1;
            current = next;
        }
    }
    current
}

/// Apply request-stage `rules` to `messages` in place.
///
/// Each message sees only the rules targeting its role whose depth range
/// contains its depth in `messages`.
pub fn apply_rules_to_messages(
    messages: &mut [ContextMessage],
    rules: &[ResolvedRule],
    patterns: &PatternCache,
) -> RuleApplication {
    let mut report = RuleApplication::default();
    if rules.is_empty() {
        return report;
    }

    let total = messages.len();
    for (index, message) in messages.iter_mut().enumerate() {
        let depth = message_depth(index, total);
        let applicable = filter_rules_by_depth(filter_rules_by_role(rules, message.role), depth);
        if applicable.is_empty() {
            continue;
        }
        message
            .content
            .map_text(|text| apply_rule_chain(text, &applicable, patterns, &mut report));
    }
    report
}

/// Apply render-stage `rules` to a single message's text for display.
pub fn apply_render_rules(
    text: &str,
    role: Role,
    depth: usize,
    rules: &[ResolvedRule],
    patterns: &PatternCache,
) -> String {
    let applicable = filter_rules_by_depth(filter_rules_by_role(rules, role), depth);
    let mut report = RuleApplication::default();
    apply_rule_chain(text, &applicable, patterns, &mut report)
}
