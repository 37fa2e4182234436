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

//! Branch navigation over a conversation tree.
//!
//! Every function here is O(depth) and tolerant of a partially deleted or
//! corrupted tree: a missing node is logged and the walk falls back to the
//! last id that resolved.

use crate::node::ConversationNode;
use crate::session::ConversationSession;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Direction for sibling switching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Prev,
}

/// Position of a node among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiblingIndex {
    pub index: usize,
    pub total: usize,
}

/// Siblings of `node_id`, including the node itself, in branch creation order.
///
/// A root, or a node whose parent no longer resolves, is its own only sibling.
/// Child ids that no longer resolve are dropped.
pub fn get_siblings<'a>(session: &'a ConversationSession, node_id: &str) -> Vec<&'a ConversationNode> {
    let Some(node) = session.node(node_id) else {
        tracing::warn!(node_id = %node_id, "get_siblings: node not found");
        return Vec::new();
    };

    let Some(parent_id) = node.parent_id.as_deref() else {
        return vec![node];
    };

    let Some(parent) = session.node(parent_id) else {
        tracing::warn!(
            node_id = %node_id,
            parent_id = %parent_id,
            "get_siblings: parent missing, treating node as root"
        );
        return vec![node];
    };

    parent
        .children_ids
        .iter()
        .filter_map(|child_id| {
            let child = session.node(child_id);
            if child.is_none() {
                tracing::warn!(
                    parent_id = %parent_id,
                    child_id = %child_id,
                    "get_siblings: dropping dangling child reference"
                );
            }
            child
        })
        .collect()
}

/// Index of `node_id` among its siblings. A node that cannot be located
/// reports `{index: 0, total: 0}`.
pub fn get_sibling_index(session: &ConversationSession, node_id: &str) -> SiblingIndex {
    let siblings = get_siblings(session, node_id);
    let index = siblings.iter().position(|n| n.id == node_id).unwrap_or(0);
    SiblingIndex {
        index,
        total: siblings.len(),
    }
}

/// The sibling one step away from `current_node_id`, wrapping around in both
/// directions. `None` when there is nothing to switch to.
pub fn adjacent_sibling_id(
    session: &ConversationSession,
    current_node_id: &str,
    direction: Direction,
) -> Option<String> {
    let siblings = get_siblings(session, current_node_id);
    if siblings.len() <= 1 {
        return None;
    }

    let current = siblings.iter().position(|n| n.id == current_node_id)?;
    let total = siblings.len();
    let target = match direction {
        Direction::Next => (current + 1) % total,
        Direction::Prev => (current + total - 1) % total,
    };
    Some(siblings[target].id.clone())
}

/// Switch to the neighbouring sibling branch and return the leaf that branch
/// resolves to. With one sibling or fewer this is a no-op returning
/// `current_node_id`.
pub fn switch_to_sibling(
    session: &ConversationSession,
    current_node_id: &str,
    direction: Direction,
) -> String {
    match adjacent_sibling_id(session, current_node_id, direction) {
        Some(target_id) => {
            let leaf = find_leaf_of_branch(session, &target_id);
            tracing::debug!(
                from = %current_node_id,
                to = %target_id,
                leaf = %leaf,
                ?direction,
                "Switched sibling branch"
            );
            leaf
        }
        None => current_node_id.to_string(),
    }
}

/// Walk down from `start_node_id` to a leaf, preferring each node's
/// remembered child and otherwise its first child.
pub fn find_leaf_of_branch(session: &ConversationSession, start_node_id: &str) -> String {
    let mut current_id = start_node_id.to_string();
    let mut visited: HashSet<String> = HashSet::new();

    loop {
        if !visited.insert(current_id.clone()) {
            tracing::warn!(node_id = %current_id, "find_leaf_of_branch: cycle detected");
            return current_id;
        }

        let Some(node) = session.node(&current_id) else {
            tracing::warn!(node_id = %current_id, "find_leaf_of_branch: node not found");
            return current_id;
        };

        let next_id = match node.valid_selected_child() {
            Some(selected) => selected,
            None => match node.children_ids.first() {
                Some(first) => first.as_str(),
                None => return current_id,
            },
        };

        if !session.contains(next_id) {
            tracing::warn!(
                node_id = %current_id,
                child_id = %next_id,
                "find_leaf_of_branch: dangling child, stopping here"
            );
            return current_id;
        }

        current_id = next_id.to_string();
    }
}

/// Ids from the root down to `leaf_node_id`. Stops early (at the topmost node
/// that resolved) if a parent link dangles or loops.
pub fn path_to_root(session: &ConversationSession, leaf_node_id: &str) -> Vec<String> {
    let mut path = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = session.node(leaf_node_id);

    if current.is_none() {
        tracing::warn!(node_id = %leaf_node_id, "path_to_root: leaf not found");
    }

    while let Some(node) = current {
        if !visited.insert(node.id.as_str()) {
            tracing::warn!(node_id = %node.id, "path_to_root: cycle detected");
            break;
        }
        path.push(node.id.clone());

        current = match node.parent_id.as_deref() {
            Some(parent_id) => {
                let parent = session.node(parent_id);
                if parent.is_none() {
                    tracing::warn!(
                        node_id = %node.id,
                        parent_id = %parent_id,
                        "path_to_root: parent missing, treating node as root"
                    );
                }
                parent
            }
            None => None,
        };
    }

    path.reverse();
    path
}

/// Record the path to `leaf_node_id` as each ancestor's remembered child.
///
/// The whole path is resolved before anything is written, so callers holding
/// the `&mut` borrow never expose a half-updated ancestor chain.
pub fn update_selection_memory(session: &mut ConversationSession, leaf_node_id: &str) {
    let path = path_to_root(session, leaf_node_id);

    for pair in path.windows(2) {
        let (parent_id, child_id) = (&pair[0], &pair[1]);
        if let Some(parent) = session.node_mut(parent_id) {
            if parent.has_child(child_id) {
                parent.last_selected_child_id = Some(child_id.clone());
            } else {
                tracing::warn!(
                    parent_id = %parent_id,
                    child_id = %child_id,
                    "update_selection_memory: child no longer listed under parent"
                );
            }
        }
    }
}

/// Whether `node_id` lies on the chain from the root to the active leaf.
pub fn is_node_in_active_path(session: &ConversationSession, node_id: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = session.node(&session.active_leaf_id);

    while let Some(node) = current {
        if node.id == node_id {
            return true;
        }
        if !visited.insert(node.id.as_str()) {
            return false;
        }
        current = node.parent_id.as_deref().and_then(|p| session.node(p));
    }

    false
}
