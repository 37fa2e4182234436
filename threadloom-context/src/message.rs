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

//! Messages flowing through the context pipeline.

use serde::{Deserialize, Serialize};
use threadloom_core::{ConversationNode, MessageContent, Role};

/// Where an assembled message came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageOrigin {
    /// A node on the active path.
    History { node_id: String },
    /// A skeleton preset message.
    Preset { preset_id: String },
    /// A preset placed by depth or anchor.
    Injection { preset_id: String },
    /// The user persona text.
    UserProfile,
    /// Knowledge retrieved for the current query.
    Knowledge,
}

/// A single message in the assembled context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: MessageContent,
    pub origin: MessageOrigin,
}

impl ContextMessage {
    pub fn new(role: Role, content: impl Into<MessageContent>, origin: MessageOrigin) -> Self {
        Self {
            role,
            content: content.into(),
            origin,
        }
    }

    pub fn from_node(node: &ConversationNode) -> Self {
        Self {
            role: node.role,
            content: node.content.clone(),
            origin: MessageOrigin::History {
                node_id: node.id.clone(),
            },
        }
    }

    /// Tree node this message was loaded from, if any.
    pub fn node_id(&self) -> Option<&str> {
        match &self.origin {
            MessageOrigin::History { node_id } => Some(node_id),
            _ => None,
        }
    }

    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        self.content.text()
    }
}
