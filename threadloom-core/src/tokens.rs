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

//! Token calculation contract.
//!
//! The context pipeline only needs a count per piece of text for a given
//! model. Real tokenizers live outside this crate; [`HeuristicTokenCalculator`]
//! is the character-ratio estimator used when nothing better is wired in.

use crate::error::CoreResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of counting tokens for one piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCount {
    pub count: usize,
    /// True when the count comes from an approximation rather than the
    /// model's own tokenizer.
    pub is_estimated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_name: Option<String>,
}

impl TokenCount {
    pub fn estimated(count: usize) -> Self {
        Self {
            count,
            is_estimated: true,
            tokenizer_name: None,
        }
    }

    pub fn exact(count: usize, tokenizer_name: impl Into<String>) -> Self {
        Self {
            count,
            is_estimated: false,
            tokenizer_name: Some(tokenizer_name.into()),
        }
    }
}

/// Counts tokens for text under a given model.
///
/// Implementations must return a zero count for empty input rather than an
/// error.
#[async_trait]
pub trait TokenCalculator: Send + Sync {
    async fn calculate_tokens(&self, content: &str, model_id: &str) -> CoreResult<TokenCount>;
}

/// Token estimator based on characters per token.
///
/// ASCII text is counted at `chars_per_token` characters per token; every
/// other character (CJK in particular) counts as one token on its own.
#[derive(Debug, Clone)]
pub struct HeuristicTokenCalculator {
    /// Average ASCII characters per token (approximately 4 for English text).
    chars_per_token: f64,
}

impl Default for HeuristicTokenCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicTokenCalculator {
    pub const NAME: &'static str = "heuristic";

    /// Create a new token calculator with default settings.
    pub fn new() -> Self {
        Self {
            chars_per_token: 4.0,
        }
    }

    /// Create a calculator with custom chars per token ratio.
    pub fn with_ratio(chars_per_token: f64) -> Self {
        Self {
            chars_per_token: if chars_per_token > 0.0 {
                chars_per_token
            } else {
                4.0
            },
        }
    }

    /// Estimate the number of tokens in a string.
    pub fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let (ascii, other) = text.chars().fold((0usize, 0usize), |(a, o), c| {
            if c.is_ascii() {
                (a + 1, o)
            } else {
                (a, o + 1)
            }
        });
        ((ascii as f64) / self.chars_per_token).ceil() as usize + other
    }

    /// Check if text fits within a token budget.
    pub fn fits_budget(&self, text: &str, budget: usize) -> bool {
        self.estimate(text) <= budget
    }
}

#[async_trait]
impl TokenCalculator for HeuristicTokenCalculator {
    async fn calculate_tokens(&self, content: &str, _model_id: &str) -> CoreResult<TokenCount> {
        Ok(TokenCount {
            count: self.estimate(content),
            is_estimated: true,
            tokenizer_name: Some(Self::NAME.to_string()),
        })
    }
}
