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

//! Depth list syntax.
//!
//! A depth spec is a comma-separated list of terms, each either a single
//! depth (`3`), an inclusive range (`4-8`) or a stepped range (`2-10/2`).
//! Terms may carry a `D` prefix (`D3,D5`). Terms that fail to parse are
//! logged and dropped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

/// Upper bound on depths produced by a single spec.
pub const MAX_EXPANDED_DEPTHS: usize = 1024;

/// A sorted, deduplicated set of message depths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthSpec {
    depths: Vec<usize>,
}

impl DepthSpec {
    pub fn parse(input: &str) -> Self {
        let mut depths = BTreeSet::new();

        for term in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match parse_term(term) {
                Some(values) => depths.extend(values),
                None => warn!(term = %term, spec = %input, "Dropping invalid depth term"),
            }
            if depths.len() > MAX_EXPANDED_DEPTHS {
                warn!(spec = %input, limit = MAX_EXPANDED_DEPTHS, "Depth spec truncated");
                break;
            }
        }

        Self {
            depths: depths.into_iter().take(MAX_EXPANDED_DEPTHS).collect(),
        }
    }

    pub fn single(depth: usize) -> Self {
        Self {
            depths: vec![depth],
        }
    }

    pub fn depths(&self) -> &[usize] {
        &self.depths
    }

    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }
}

impl fmt::Display for DepthSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.depths.iter().map(|d| d.to_string()).collect();
        f.write_str(&terms.join(","))
    }
}

fn parse_term(term: &str) -> Option<Vec<usize>> {
    let term = term
        .strip_prefix('D')
        .or_else(|| term.strip_prefix('d'))
        .unwrap_or(term)
        .trim();

    let (range, step) = match term.split_once('/') {
        Some((range, step)) => (range.trim(), step.trim().parse::<usize>().ok()?),
        None => (term, 1),
    };
    if step == 0 {
        return None;
    }

    match range.split_once('-') {
        Some((start, end)) => {
            let start: usize = start.trim().parse().ok()?;
            let end: usize = end.trim().parse().ok()?;
            if start > end {
                return None;
            }
            Some(
                (start..=end)
                    .step_by(step)
                    .take(MAX_EXPANDED_DEPTHS + 1)
                    .collect(),
            )
        }
        None => Some(vec![range.parse().ok()?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_and_mixed() {
        assert_eq!(DepthSpec::parse("3").depths(), &[3]);
        assert_eq!(DepthSpec::parse("D5, D3").depths(), &[3, 5]);
        assert_eq!(DepthSpec::parse("5,3,5").depths(), &[3, 5]);
    }

    #[test]
    fn test_ranges() {
        assert_eq!(DepthSpec::parse("2-10/2").depths(), &[2, 4, 6, 8, 10]);
        assert_eq!(DepthSpec::parse("4-6").depths(), &[4, 5, 6]);
        assert_eq!(DepthSpec::parse("1,4-8/2").depths(), &[1, 4, 6, 8]);
        assert_eq!(DepthSpec::parse("0-9/4").depths(), &[0, 4, 8]);
    }

    #[test]
    fn test_invalid_terms_are_dropped() {
        assert_eq!(DepthSpec::parse("x,2,3-1,4/0,-1").depths(), &[2]);
        assert!(DepthSpec::parse("").is_empty());
    }

    #[test]
    fn test_expansion_is_bounded() {
        let spec = DepthSpec::parse("0-1000000");
        assert_eq!(spec.depths().len(), MAX_EXPANDED_DEPTHS);
    }

    #[test]
    fn test_display() {
        assert_eq!(DepthSpec::parse("2-6/2").to_string(), "2,4,6");
    }
}
