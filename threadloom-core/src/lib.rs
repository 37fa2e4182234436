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

//! Threadloom Core
//!
//! Tree-structured conversations for LLM chat:
//! - **Conversation tree**: nodes linked by parent id with ordered children,
//!   where every reply may branch
//! - **Branch navigation**: sibling switching with wraparound and per-node
//!   selection memory, so returning to a branch restores the leaf last viewed
//! - **Relation changes**: minimal parent/children records for undo and redo
//!   of create, delete, graft and move
//! - **Token calculation**: the contract the context pipeline counts with
//!
//! Navigation never fails on malformed data. Dangling ids are logged through
//! `tracing` and treated as leaves or roots.

pub mod error;
pub mod message;
pub mod navigator;
pub mod node;
pub mod relations;
pub mod session;
pub mod tokens;

pub use error::{CoreError, CoreResult};
pub use message::{Attachment, ContentPart, MessageContent, Role};
pub use navigator::{
    adjacent_sibling_id, find_leaf_of_branch, get_sibling_index, get_siblings,
    is_node_in_active_path, path_to_root, switch_to_sibling, update_selection_memory, Direction,
    SiblingIndex,
};
pub use node::{generate_node_id, ConversationNode, NodeMetadata};
pub use relations::{
    apply_relation_changes, extract_relation_changes, ApplyDirection, ChildrenChange,
    RelationChange,
};
pub use session::{ConversationSession, DeletedSubtree, TreeIssue};
pub use tokens::{HeuristicTokenCalculator, TokenCalculator, TokenCount};
