//! Request/response shapes shared by the remote assistant and the local
//! intent parser, so callers never care which one answered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured outcome of reading a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    AddTodo {
        title: String,
    },
    AddEvent {
        title: String,
        date: DateTime<Utc>,
        #[serde(rename = "imageIndex", default, skip_serializing_if = "Option::is_none")]
        image_index: Option<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub message: String,
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub message: String,
    #[serde(default)]
    pub action: Option<Action>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        ChatMessage {
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        ChatMessage {
            sender: Sender::Assistant,
            text: text.into(),
        }
    }
}

impl Reply {
    pub fn text(message: impl Into<String>) -> Self {
        Reply {
            message: message.into(),
            action: None,
        }
    }

    pub fn with_action(message: impl Into<String>, action: Action) -> Self {
        Reply {
            message: message.into(),
            action: Some(action),
        }
    }
}
