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

//! Conversation tree nodes.

use crate::message::{Attachment, MessageContent, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form annotations attached to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Model that produced this message (assistant nodes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    /// Token count written back by the context pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<usize>,

    /// Whether `token_count` came from an estimator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_estimated: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_name: Option<String>,

    /// Disabled nodes stay in the tree but are left out of the context.
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Display flags and anything else the UI wants to keep.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            model_id: None,
            token_count: None,
            token_estimated: None,
            tokenizer_name: None,
            is_enabled: true,
            created_at: Utc::now(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A single message in the conversation tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationNode {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Insertion order is branch creation order.
    #[serde(default)]
    pub children_ids: Vec<String>,
    /// Child chosen the last time this node's branch was traversed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_selected_child_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl ConversationNode {
    /// Create a detached node with a fresh id.
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self::with_id(generate_node_id(), role, content)
    }

    /// Create a detached node with a caller-chosen id.
    pub fn with_id(id: impl Into<String>, role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            parent_id: None,
            children_ids: Vec::new(),
            last_selected_child_id: None,
            attachments: Vec::new(),
            metadata: NodeMetadata::default(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.metadata.model_id = Some(model_id.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children_ids.is_empty()
    }

    pub fn has_child(&self, child_id: &str) -> bool {
        self.children_ids.iter().any(|c| c == child_id)
    }

    /// The remembered child, but only while it is still one of our children.
    pub fn valid_selected_child(&self) -> Option<&str> {
        self.last_selected_child_id
            .as_deref()
            .filter(|selected| self.has_child(selected))
    }
}

/// Generate a new unique node id.
pub fn generate_node_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_selection_is_ignored() {
        let mut node = ConversationNode::with_id("a", Role::User, "hi");
        node.children_ids = vec!["b".to_string(), "c".to_string()];
        node.last_selected_child_id = Some("gone".to_string());
        assert_eq!(node.valid_selected_child(), None);

        node.last_selected_child_id = Some("c".to_string());
        assert_eq!(node.valid_selected_child(), Some("c"));
    }

    #[test]
    fn test_metadata_roundtrip_keeps_extra_fields() {
        let json = r#"{"created_at":"2025-01-01T00:00:00Z","collapsed":true}"#;
        let meta: NodeMetadata = serde_json::from_str(json).unwrap();
        assert!(meta.is_enabled);
        assert_eq!(meta.extra.get("collapsed"), Some(&serde_json::Value::Bool(true)));
    }
}
