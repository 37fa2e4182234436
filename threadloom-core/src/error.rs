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

//! Conversation tree error types

use thiserror::Error;

/// Result type for conversation tree operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by explicit editing operations.
///
/// Navigation never returns these: a corrupted tree is logged and walked
/// around instead.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A node with this id already exists
    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    /// The root node cannot be deleted or reparented
    #[error("Operation not allowed on root node: {0}")]
    RootNode(String),

    /// Reparenting would create a cycle
    #[error("Cannot move node {node_id} under its own descendant {target_id}")]
    CycleDetected { node_id: String, target_id: String },

    /// Token calculation failed
    #[error("Token calculation failed: {0}")]
    TokenCalculation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::SerializationError(e.to_string())
    }
}
