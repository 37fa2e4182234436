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

//! Context assembly error types

use thiserror::Error;
use threadloom_memory::MemoryError;

/// Result type for context assembly
pub type ContextResult<T> = Result<T, ContextError>;

/// Errors raised while configuring or running the context pipeline.
///
/// Recoverable conditions (bad rules, token counting failures, budget
/// exhaustion) are logged and never surface here.
#[derive(Debug, Error)]
pub enum ContextError {
    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Retrieval cache error
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// A pipeline processor failed
    #[error("Processor '{processor_id}' failed: {message}")]
    Processor {
        processor_id: String,
        message: String,
    },
}

impl ContextError {
    pub fn processor(processor_id: impl Into<String>, message: impl Into<String>) -> Self {
        ContextError::Processor {
            processor_id: processor_id.into(),
            message: message.into(),
        }
    }
}
