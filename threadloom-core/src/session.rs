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

//! Conversation session: tree storage plus the active leaf.
//!
//! The session owns every node of one conversation keyed by id. The active
//! path is the chain from the root to `active_leaf_id` via parent links.
//! Persisted sessions are loaded by an external store; [`validate`] reports
//! invariant violations without touching anything.
//!
//! [`validate`]: ConversationSession::validate

use crate::error::{CoreError, CoreResult};
use crate::message::{MessageContent, Role};
use crate::navigator::{self, Direction};
use crate::node::{generate_node_id, ConversationNode};
use crate::relations::{ChildrenChange, RelationChange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A tree-structured conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub name: String,
    pub nodes: HashMap<String, ConversationNode>,
    pub root_node_id: String,
    pub active_leaf_id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Nodes removed by [`ConversationSession::delete_subtree`], kept for undo.
#[derive(Debug, Clone)]
pub struct DeletedSubtree {
    /// Removed nodes, the deleted node first, then descendants depth-first.
    pub removed: Vec<ConversationNode>,
    pub relation: RelationChange,
}

impl DeletedSubtree {
    pub fn removed_ids(&self) -> Vec<String> {
        self.removed.iter().map(|node| node.id.clone()).collect()
    }
}

/// A structural invariant violation found by [`ConversationSession::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeIssue {
    MissingRoot { root_id: String },
    MissingActiveLeaf { node_id: String },
    DanglingChild { parent_id: String, child_id: String },
    ParentMismatch { parent_id: String, child_id: String, actual_parent: Option<String> },
    MissingParent { node_id: String, parent_id: String },
    StaleSelection { node_id: String, selected_id: String },
}

impl std::fmt::Display for TreeIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeIssue::MissingRoot { root_id } => write!(f, "root node {root_id} is missing"),
            TreeIssue::MissingActiveLeaf { node_id } => {
                write!(f, "active leaf {node_id} is missing")
            }
            TreeIssue::DanglingChild { parent_id, child_id } => {
                write!(f, "{parent_id} lists missing child {child_id}")
            }
            TreeIssue::ParentMismatch {
                parent_id,
                child_id,
                actual_parent,
            } => write!(
                f,
                "{parent_id} lists child {child_id} whose parent is {}",
                actual_parent.as_deref().unwrap_or("<none>")
            ),
            TreeIssue::MissingParent { node_id, parent_id } => {
                write!(f, "{node_id} points at missing parent {parent_id}")
            }
            TreeIssue::StaleSelection { node_id, selected_id } => {
                write!(f, "{node_id} remembers {selected_id} which is not its child")
            }
        }
    }
}

impl ConversationSession {
    /// Create a session with an empty system root.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_root_id(id, name, generate_node_id())
    }

    /// Create a session whose root node has a caller-chosen id.
    pub fn with_root_id(
        id: impl Into<String>,
        name: impl Into<String>,
        root_id: impl Into<String>,
    ) -> Self {
        let root = ConversationNode::with_id(root_id, Role::System, "");
        let root_id = root.id.clone();
        let now = Utc::now();

        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);

        Self {
            id: id.into(),
            name: name.into(),
            nodes,
            root_node_id: root_id.clone(),
            active_leaf_id: root_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn node(&self, id: &str) -> Option<&ConversationNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut ConversationNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<&ConversationNode> {
        self.node(&self.root_node_id)
    }

    pub fn active_leaf(&self) -> Option<&ConversationNode> {
        self.node(&self.active_leaf_id)
    }

    /// Nodes from the root down to the active leaf.
    pub fn active_path(&self) -> Vec<&ConversationNode> {
        navigator::path_to_root(self, &self.active_leaf_id)
            .iter()
            .filter_map(|id| self.node(id))
            .collect()
    }

    /// Attach a new node under `parent_id` and return its id.
    ///
    /// If the parent was the active leaf, the new node becomes the active leaf.
    pub fn add_child(
        &mut self,
        parent_id: &str,
        role: Role,
        content: impl Into<MessageContent>,
    ) -> CoreResult<String> {
        self.insert_node(ConversationNode::new(role, content).with_parent(parent_id))
    }

    /// Like [`add_child`](Self::add_child) with a caller-chosen id.
    pub fn insert_child(
        &mut self,
        parent_id: &str,
        id: impl Into<String>,
        role: Role,
        content: impl Into<MessageContent>,
    ) -> CoreResult<String> {
        self.insert_node(ConversationNode::with_id(id, role, content).with_parent(parent_id))
    }

    /// Insert a prepared node. Its `parent_id` must resolve.
    pub fn insert_node(&mut self, mut node: ConversationNode) -> CoreResult<String> {
        let parent_id = node
            .parent_id
            .clone()
            .ok_or_else(|| CoreError::RootNode(node.id.clone()))?;
        if self.contains(&node.id) {
            return Err(CoreError::DuplicateNode(node.id.clone()));
        }
        let parent = self
            .nodes
            .get_mut(&parent_id)
            .ok_or_else(|| CoreError::NodeNotFound(parent_id.clone()))?;

        node.children_ids.clear();
        node.last_selected_child_id = None;
        let id = node.id.clone();
        parent.children_ids.push(id.clone());
        self.nodes.insert(id.clone(), node);
        self.touch();

        if self.active_leaf_id == parent_id {
            self.set_active_leaf(&id)?;
        }
        Ok(id)
    }

    /// Append a message after the active leaf and make it the active leaf.
    pub fn append_message(
        &mut self,
        role: Role,
        content: impl Into<MessageContent>,
    ) -> CoreResult<String> {
        let parent_id = self.active_leaf_id.clone();
        self.add_child(&parent_id, role, content)
    }

    /// Create an alternative version of `node_id` as a new sibling with the
    /// same role, and switch to it.
    pub fn create_branch(
        &mut self,
        node_id: &str,
        content: impl Into<MessageContent>,
    ) -> CoreResult<String> {
        let node = self
            .node(node_id)
            .ok_or_else(|| CoreError::NodeNotFound(node_id.to_string()))?;
        let parent_id = node
            .parent_id
            .clone()
            .ok_or_else(|| CoreError::RootNode(node_id.to_string()))?;
        let role = node.role;

        let id = self.add_child(&parent_id, role, content)?;
        self.set_active_leaf(&id)?;
        Ok(id)
    }

    /// Replace a node's content without branching.
    pub fn edit_in_place(
        &mut self,
        node_id: &str,
        content: impl Into<MessageContent>,
    ) -> CoreResult<()> {
        let node = self
            .node_mut(node_id)
            .ok_or_else(|| CoreError::NodeNotFound(node_id.to_string()))?;
        node.content = content.into();
        self.touch();
        Ok(())
    }

    /// Make `node_id` the active leaf and remember the path leading to it.
    pub fn set_active_leaf(&mut self, node_id: &str) -> CoreResult<()> {
        if !self.contains(node_id) {
            return Err(CoreError::NodeNotFound(node_id.to_string()));
        }
        self.active_leaf_id = node_id.to_string();
        navigator::update_selection_memory(self, node_id);
        Ok(())
    }

    /// Switch the branch containing `node_id` to its neighbouring sibling and
    /// activate the resolved leaf. Returns the new active leaf id.
    pub fn switch_branch(&mut self, node_id: &str, direction: Direction) -> CoreResult<String> {
        let leaf = navigator::switch_to_sibling(self, node_id, direction);
        if leaf != node_id {
            self.set_active_leaf(&leaf)?;
        }
        Ok(self.active_leaf_id.clone())
    }

    /// Ids of `node_id` and all its descendants (cycle-safe).
    pub fn subtree_ids(&self, node_id: &str) -> Vec<String> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![node_id.to_string()];

        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(node) = self.node(&id) {
                stack.extend(node.children_ids.iter().rev().cloned());
                ids.push(id);
            }
        }
        ids
    }

    /// Remove a node and all its descendants.
    ///
    /// If the active leaf was inside the removed subtree, the parent's branch
    /// is re-resolved and becomes active.
    pub fn delete_subtree(&mut self, node_id: &str) -> CoreResult<DeletedSubtree> {
        let node = self
            .node(node_id)
            .ok_or_else(|| CoreError::NodeNotFound(node_id.to_string()))?;
        if node_id == self.root_node_id {
            return Err(CoreError::RootNode(node_id.to_string()));
        }
        let parent_id = node.parent_id.clone();

        let ids = self.subtree_ids(node_id);
        let active_removed = ids.iter().any(|id| *id == self.active_leaf_id);

        let mut affected_parents = BTreeMap::new();
        if let Some(parent) = parent_id.as_deref().and_then(|p| self.nodes.get_mut(p)) {
            let old_children = parent.children_ids.clone();
            parent.children_ids.retain(|c| c != node_id);
            if parent.last_selected_child_id.as_deref() == Some(node_id) {
                parent.last_selected_child_id = None;
            }
            affected_parents.insert(
                parent.id.clone(),
                ChildrenChange {
                    old_children,
                    new_children: parent.children_ids.clone(),
                },
            );
        }

        let removed: Vec<ConversationNode> =
            ids.iter().filter_map(|id| self.nodes.remove(id)).collect();

        if active_removed {
            let fallback = parent_id.clone().unwrap_or_else(|| self.root_node_id.clone());
            let leaf = navigator::find_leaf_of_branch(self, &fallback);
            let leaf = if self.contains(&leaf) {
                leaf
            } else {
                self.root_node_id.clone()
            };
            self.set_active_leaf(&leaf)?;
        }
        self.touch();

        tracing::debug!(
            session_id = %self.id,
            node_id = %node_id,
            removed = removed.len(),
            "Deleted subtree"
        );

        Ok(DeletedSubtree {
            removed,
            relation: RelationChange {
                node_id: node_id.to_string(),
                old_parent_id: parent_id,
                new_parent_id: None,
                affected_parents,
            },
        })
    }

    /// Re-attach a subtree under a different parent, appended as its last child.
    pub fn graft_subtree(&mut self, node_id: &str, new_parent_id: &str) -> CoreResult<RelationChange> {
        self.reparent(node_id, new_parent_id, None)
    }

    /// Move a node (with its subtree) to `position` among `new_parent_id`'s
    /// children. `position` is clamped to the children count.
    pub fn move_node(
        &mut self,
        node_id: &str,
        new_parent_id: &str,
        position: usize,
    ) -> CoreResult<RelationChange> {
        self.reparent(node_id, new_parent_id, Some(position))
    }

    fn reparent(
        &mut self,
        node_id: &str,
        new_parent_id: &str,
        position: Option<usize>,
    ) -> CoreResult<RelationChange> {
        if node_id == self.root_node_id {
            return Err(CoreError::RootNode(node_id.to_string()));
        }
        let old_parent_id = self
            .node(node_id)
            .ok_or_else(|| CoreError::NodeNotFound(node_id.to_string()))?
            .parent_id
            .clone();
        if !self.contains(new_parent_id) {
            return Err(CoreError::NodeNotFound(new_parent_id.to_string()));
        }
        if navigator::path_to_root(self, new_parent_id)
            .iter()
            .any(|id| id == node_id)
        {
            return Err(CoreError::CycleDetected {
                node_id: node_id.to_string(),
                target_id: new_parent_id.to_string(),
            });
        }

        let mut affected_parents: BTreeMap<String, ChildrenChange> = BTreeMap::new();

        if let Some(old_parent) = old_parent_id.as_deref().and_then(|p| self.nodes.get_mut(p)) {
            let old_children = old_parent.children_ids.clone();
            old_parent.children_ids.retain(|c| c != node_id);
            if old_parent.last_selected_child_id.as_deref() == Some(node_id) {
                old_parent.last_selected_child_id = None;
            }
            affected_parents.insert(
                old_parent.id.clone(),
                ChildrenChange {
                    old_children,
                    new_children: old_parent.children_ids.clone(),
                },
            );
        }

        if let Some(new_parent) = self.nodes.get_mut(new_parent_id) {
            let old_children = affected_parents
                .get(new_parent_id)
                .map(|c| c.old_children.clone())
                .unwrap_or_else(|| new_parent.children_ids.clone());
            let index = position
                .unwrap_or(new_parent.children_ids.len())
                .min(new_parent.children_ids.len());
            new_parent.children_ids.insert(index, node_id.to_string());
            affected_parents.insert(
                new_parent_id.to_string(),
                ChildrenChange {
                    old_children,
                    new_children: new_parent.children_ids.clone(),
                },
            );
        }

        if let Some(node) = self.nodes.get_mut(node_id) {
            node.parent_id = Some(new_parent_id.to_string());
        }

        let active_leaf = self.active_leaf_id.clone();
        if self.subtree_ids(node_id).contains(&active_leaf) {
            navigator::update_selection_memory(self, &active_leaf);
        }
        self.touch();

        Ok(RelationChange {
            node_id: node_id.to_string(),
            old_parent_id,
            new_parent_id: Some(new_parent_id.to_string()),
            affected_parents,
        })
    }

    /// Store a token count computed by the context pipeline on a node.
    /// Returns false if the node no longer exists.
    pub fn record_token_count(
        &mut self,
        node_id: &str,
        count: usize,
        estimated: bool,
        tokenizer_name: Option<String>,
    ) -> bool {
        match self.node_mut(node_id) {
            Some(node) => {
                node.metadata.token_count = Some(count);
                node.metadata.token_estimated = Some(estimated);
                node.metadata.tokenizer_name = tokenizer_name;
                true
            }
            None => false,
        }
    }

    /// Report every structural invariant violation in the tree.
    pub fn validate(&self) -> Vec<TreeIssue> {
        let mut issues = Vec::new();

        if !self.contains(&self.root_node_id) {
            issues.push(TreeIssue::MissingRoot {
                root_id: self.root_node_id.clone(),
            });
        }
        if !self.contains(&self.active_leaf_id) {
            issues.push(TreeIssue::MissingActiveLeaf {
                node_id: self.active_leaf_id.clone(),
            });
        }

        let mut ids: Vec<&String> = self.nodes.keys().collect();
        ids.sort();

        for id in ids {
            let node = &self.nodes[id];

            if let Some(parent_id) = node.parent_id.as_deref() {
                if !self.contains(parent_id) {
                    issues.push(TreeIssue::MissingParent {
                        node_id: id.clone(),
                        parent_id: parent_id.to_string(),
                    });
                }
            }

            for child_id in &node.children_ids {
                match self.node(child_id) {
                    None => issues.push(TreeIssue::DanglingChild {
                        parent_id: id.clone(),
                        child_id: child_id.clone(),
                    }),
                    Some(child) if child.parent_id.as_deref() != Some(id.as_str()) => {
                        issues.push(TreeIssue::ParentMismatch {
                            parent_id: id.clone(),
                            child_id: child_id.clone(),
                            actual_parent: child.parent_id.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }

            if let Some(selected) = node.last_selected_child_id.as_deref() {
                if !node.has_child(selected) {
                    issues.push(TreeIssue::StaleSelection {
                        node_id: id.clone(),
                        selected_id: selected.to_string(),
                    });
                }
            }
        }

        issues
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
