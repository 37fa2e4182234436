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

//! Relation changes for undo/redo of structural edits.
//!
//! A structural edit (create, delete, graft, move) is described by the
//! parent pointer of each touched node plus the before/after children lists
//! of every parent whose list changed. That is enough to replay the edit or
//! invert it; node bodies are snapshotted separately by the caller.

use crate::session::ConversationSession;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Children list of one parent before and after an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildrenChange {
    pub old_children: Vec<String>,
    pub new_children: Vec<String>,
}

/// Parent/children bookkeeping for one node touched by an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationChange {
    pub node_id: String,
    pub old_parent_id: Option<String>,
    pub new_parent_id: Option<String>,
    pub affected_parents: BTreeMap<String, ChildrenChange>,
}

/// Which way to replay a set of relation changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyDirection {
    Forward,
    Reverse,
}

impl RelationChange {
    /// Whether replaying this change would alter anything.
    pub fn is_noop(&self) -> bool {
        self.old_parent_id == self.new_parent_id
            && self
                .affected_parents
                .values()
                .all(|c| c.old_children == c.new_children)
    }

    /// The change that undoes this one.
    pub fn invert(&self) -> Self {
        Self {
            node_id: self.node_id.clone(),
            old_parent_id: self.new_parent_id.clone(),
            new_parent_id: self.old_parent_id.clone(),
            affected_parents: self
                .affected_parents
                .iter()
                .map(|(parent_id, change)| {
                    (
                        parent_id.clone(),
                        ChildrenChange {
                            old_children: change.new_children.clone(),
                            new_children: change.old_children.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Compute the relation changes that turn `before` into `after` for the given
/// nodes. Works for create (node absent before), delete (absent after),
/// graft and move alike; nodes whose relations did not change are omitted.
pub fn extract_relation_changes(
    before: &ConversationSession,
    after: &ConversationSession,
    node_ids: &[String],
) -> Vec<RelationChange> {
    node_ids
        .iter()
        .filter_map(|node_id| {
            let old_parent_id = before.node(node_id).and_then(|n| n.parent_id.clone());
            let new_parent_id = after.node(node_id).and_then(|n| n.parent_id.clone());

            let mut affected_parents = BTreeMap::new();
            for parent_id in [&old_parent_id, &new_parent_id].into_iter().flatten() {
                if affected_parents.contains_key(parent_id) {
                    continue;
                }
                let old_children = children_of(before, parent_id);
                let new_children = children_of(after, parent_id);
                if old_children != new_children {
                    affected_parents.insert(
                        parent_id.clone(),
                        ChildrenChange {
                            old_children,
                            new_children,
                        },
                    );
                }
            }

            let change = RelationChange {
                node_id: node_id.clone(),
                old_parent_id,
                new_parent_id,
                affected_parents,
            };
            (!change.is_noop()).then_some(change)
        })
        .collect()
}

fn children_of(session: &ConversationSession, parent_id: &str) -> Vec<String> {
    session
        .node(parent_id)
        .map(|n| n.children_ids.clone())
        .unwrap_or_default()
}

/// Replay relation changes onto `session`. Parents or nodes that are absent
/// (for example a node whose body has not been restored yet) are skipped.
pub fn apply_relation_changes(
    session: &mut ConversationSession,
    changes: &[RelationChange],
    direction: ApplyDirection,
) {
    let ordered: Vec<RelationChange> = match direction {
        ApplyDirection::Forward => changes.to_vec(),
        ApplyDirection::Reverse => changes.iter().rev().map(RelationChange::invert).collect(),
    };

    for change in ordered {
        if let Some(node) = session.node_mut(&change.node_id) {
            node.parent_id = change.new_parent_id.clone();
        }
        for (parent_id, children) in &change.affected_parents {
            match session.node_mut(parent_id) {
                Some(parent) => {
                    parent.children_ids = children.new_children.clone();
                    if let Some(selected) = parent.last_selected_child_id.as_deref() {
                        if !parent.children_ids.iter().any(|c| c == selected) {
                            parent.last_selected_child_id = None;
                        }
                    }
                }
                None => {
                    tracing::warn!(
                        parent_id = %parent_id,
                        node_id = %change.node_id,
                        "apply_relation_changes: parent missing, skipping children update"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    fn sample() -> ConversationSession {
        let mut session = ConversationSession::with_root_id("s", "test", "root");
        session.insert_child("root", "a", Role::User, "a").unwrap();
        session.insert_child("a", "b", Role::Assistant, "b").unwrap();
        session.insert_child("a", "c", Role::Assistant, "c").unwrap();
        session.insert_child("c", "d", Role::User, "d").unwrap();
        session
    }

    #[test]
    fn test_graft_extract_and_undo() {
        let before = sample();
        let mut after = before.clone();
        after.graft_subtree("d", "b").unwrap();

        let changes = extract_relation_changes(&before, &after, &["d".to_string()]);
        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.old_parent_id.as_deref(), Some("c"));
        assert_eq!(change.new_parent_id.as_deref(), Some("b"));
        assert_eq!(change.affected_parents.len(), 2);

        let mut undone = after.clone();
        apply_relation_changes(&mut undone, &changes, ApplyDirection::Reverse);
        assert_eq!(undone.node("d").unwrap().parent_id.as_deref(), Some("c"));
        assert_eq!(undone.node("c").unwrap().children_ids, vec!["d"]);
        assert!(undone.node("b").unwrap().children_ids.is_empty());

        apply_relation_changes(&mut undone, &changes, ApplyDirection::Forward);
        assert_eq!(undone.node("b").unwrap().children_ids, vec!["d"]);
    }

    #[test]
    fn test_create_records_single_parent() {
        let before = sample();
        let mut after = before.clone();
        let id = after.add_child("b", Role::User, "new").unwrap();

        let changes = extract_relation_changes(&before, &after, &[id.clone()]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_parent_id, None);
        assert_eq!(changes[0].new_parent_id.as_deref(), Some("b"));
        assert_eq!(
            changes[0].affected_parents["b"],
            ChildrenChange {
                old_children: vec![],
                new_children: vec![id],
            }
        );
    }

    #[test]
    fn test_unchanged_nodes_are_omitted() {
        let before = sample();
        let after = before.clone();
        assert!(extract_relation_changes(&before, &after, &["a".to_string()]).is_empty());
    }

    #[test]
    fn test_invert_is_involution() {
        let before = sample();
        let mut after = before.clone();
        after.delete_subtree("c").unwrap();
        let changes = extract_relation_changes(&before, &after, &["c".to_string()]);
        assert_eq!(changes[0].invert().invert(), changes[0]);
    }
}
