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

//! Message roles and (possibly multimodal) message content.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (instructions).
    System,
    /// User message (input).
    User,
    /// Assistant message (LLM output).
    Assistant,
}

impl Role {
    /// Get the role as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    Document {
        name: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ContentPart::Text { .. })
    }
}

/// Message body: plain text or an ordered list of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

impl MessageContent {
    /// Text of the message. Multimodal text parts are joined with newlines;
    /// non-text parts contribute nothing.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            MessageContent::Text(text) => Cow::Borrowed(text),
            MessageContent::Parts(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                if texts.len() == 1 {
                    Cow::Borrowed(texts[0])
                } else {
                    Cow::Owned(texts.join("\n"))
                }
            }
        }
    }

    /// Whether the content carries any non-text part.
    pub fn is_multimodal(&self) -> bool {
        match self {
            MessageContent::Text(_) => false,
            MessageContent::Parts(parts) => parts.iter().any(|p| !p.is_text()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }

    /// Rewrite every text segment in place, leaving media parts untouched.
    pub fn map_text<F>(&mut self, mut f: F)
    where
        F: FnMut(&str) -> String,
    {
        match self {
            MessageContent::Text(text) => *text = f(text),
            MessageContent::Parts(parts) => {
                for part in parts.iter_mut() {
                    if let ContentPart::Text { text } = part {
                        *text = f(text);
                    }
                }
            }
        }
    }

    /// Replace the whole text of the message with `text`.
    ///
    /// For multimodal content the first text part receives `text` and any
    /// further text parts are dropped; media parts keep their position.
    pub fn replace_text(&mut self, text: String) {
        match self {
            MessageContent::Text(current) => *current = text,
            MessageContent::Parts(parts) => {
                let mut replacement = Some(text);
                parts.retain_mut(|part| match part {
                    ContentPart::Text { text: current } => match replacement.take() {
                        Some(new_text) => {
                            *current = new_text;
                            true
                        }
                        None => false,
                    },
                    _ => true,
                });
                if let Some(new_text) = replacement {
                    parts.insert(0, ContentPart::text(new_text));
                }
            }
        }
    }
}

/// Reference to a media asset stored outside the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub uri: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multimodal() -> MessageContent {
        MessageContent::Parts(vec![
            ContentPart::text("look at this"),
            ContentPart::Image {
                url: "asset://1".to_string(),
                mime_type: Some("image/png".to_string()),
            },
            ContentPart::text("and this"),
        ])
    }

    #[test]
    fn test_text_joins_text_parts() {
        assert_eq!(multimodal().text(), "look at this\nand this");
        assert_eq!(MessageContent::from("plain").text(), "plain");
    }

    #[test]
    fn test_replace_text_keeps_media() {
        let mut content = multimodal();
        content.replace_text("short".to_string());
        match content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[0], ContentPart::text("short"));
                assert!(!parts[1].is_text());
            }
            MessageContent::Text(_) => panic!("expected parts"),
        }
    }

    #[test]
    fn test_untagged_deserialization() {
        let text: MessageContent = serde_json::from_str("\"hi\"").unwrap();
        assert_eq!(text, MessageContent::Text("hi".to_string()));

        let parts: MessageContent =
            serde_json::from_str(r#"[{"type":"text","text":"hi"}]"#).unwrap();
        assert!(!parts.is_multimodal());
        assert_eq!(parts.text(), "hi");
    }
}
