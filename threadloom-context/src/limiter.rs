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

//! Token-budget enforcement over the conversation history.
//!
//! Preset messages are charged first; the remaining budget is filled with
//! history from newest to oldest. The kept messages always form a
//! contiguous suffix of the history; everything older than the first
//! message that does not fit is truncated.

use crate::config::ContextLimitSettings;
use crate::message::ContextMessage;
use futures::future::join_all;
use serde::Serialize;
use threadloom_core::{MessageContent, TokenCalculator, TokenCount};
use tracing::{debug, warn};

/// Appended to text cut down to the retained characters.
pub const TRUNCATION_SUFFIX: &str = "...[已截断]";
/// Replaces the whole text when no characters are retained.
pub const TRUNCATION_PLACEHOLDER: &str = "[已截断]";

/// Result of a limiting pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LimitedHistory {
    pub messages: Vec<ContextMessage>,
    /// Token count per input history message, `None` where counting failed.
    #[serde(skip)]
    pub token_counts: Vec<Option<TokenCount>>,
    pub preset_tokens: usize,
    /// Budget left for history after presets (may be negative).
    pub available_tokens: i64,
    pub kept_tokens: usize,
    pub kept: usize,
    pub truncated: usize,
    pub failed_counts: usize,
    /// Presets alone exceeded the budget; the history was dropped.
    pub budget_exhausted: bool,
}

/// Truncate message content, keeping `retained_characters` characters of
/// text. Media parts are left untouched.
pub fn truncate_content(content: &MessageContent, retained_characters: i64) -> MessageContent {
    let retained = usize::try_from(retained_characters).unwrap_or(0);
    let text = content.text();

    let replacement = if retained == 0 {
        TRUNCATION_PLACEHOLDER.to_string()
    } else if text.chars().count() > retained {
        let kept: String = text.chars().take(retained).collect();
        format!("{kept}{TRUNCATION_SUFFIX}")
    } else {
        format!("{text}{TRUNCATION_SUFFIX}")
    };

    let mut truncated = content.clone();
    truncated.replace_text(replacement);
    truncated
}

async fn count_all(
    contents: Vec<String>,
    model_id: &str,
    calculator: &dyn TokenCalculator,
) -> Vec<Option<TokenCount>> {
    let counts = join_all(
        contents
            .iter()
            .map(|text| calculator.calculate_tokens(text, model_id)),
    )
    .await;

    counts
        .into_iter()
        .map(|result| match result {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(model_id = %model_id, error = %e, "Token counting failed; counting as 0");
                None
            }
        })
        .collect()
}

/// Fit `history` into the budget left after `presets`.
pub async fn apply_context_limit(
    history: &[ContextMessage],
    presets: &[ContextMessage],
    settings: &ContextLimitSettings,
    model_id: &str,
    calculator: &dyn TokenCalculator,
) -> LimitedHistory {
    let preset_counts = count_all(
        presets.iter().map(|m| m.text().into_owned()).collect(),
        model_id,
        calculator,
    )
    .await;
    let preset_tokens: usize = preset_counts.iter().flatten().map(|c| c.count).sum();
    let available = settings.max_context_tokens - preset_tokens as i64;

    if available <= 0 {
        warn!(
            max_context_tokens = settings.max_context_tokens,
            preset_tokens,
            "Preset messages exhaust the context budget; dropping history"
        );
        return LimitedHistory {
            preset_tokens,
            available_tokens: available,
            truncated: history.len(),
            failed_counts: preset_counts.iter().filter(|c| c.is_none()).count(),
            budget_exhausted: true,
            ..Default::default()
        };
    }

    let token_counts = count_all(
        history.iter().map(|m| m.text().into_owned()).collect(),
        model_id,
        calculator,
    )
    .await;
    let failed_counts = preset_counts
        .iter()
        .chain(token_counts.iter())
        .filter(|c| c.is_none())
        .count();

    // Walk newest to oldest; the first message that does not fit closes the
    // kept suffix.
    let budget = available as usize;
    let mut kept_tokens = 0usize;
    let mut first_kept = history.len();
    for (index, count) in token_counts.iter().enumerate().rev() {
        let tokens = count.as_ref().map_or(0, |c| c.count);
        if kept_tokens + tokens > budget {
            break;
        }
        kept_tokens += tokens;
        first_kept = index;
    }

    let messages: Vec<ContextMessage> = history
        .iter()
        .enumerate()
        .map(|(index, message)| {
            if index >= first_kept {
                message.clone()
            } else {
                ContextMessage {
                    content: truncate_content(&message.content, settings.retained_characters),
                    ..message.clone()
                }
            }
        })
        .collect();

    let kept = history.len() - first_kept;
    debug!(
        kept,
        truncated = first_kept,
        kept_tokens,
        available,
        "Applied context limit"
    );

    LimitedHistory {
        messages,
        token_counts,
        preset_tokens,
        available_tokens: available,
        kept_tokens,
        kept,
        truncated: first_kept,
        failed_counts,
        budget_exhausted: false,
    }
}
