use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Character;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    #[default]
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(anyhow::anyhow!("unknown message role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub character_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub role: MessageRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub character_id: Uuid,
    pub user_id: Uuid,
    pub role: MessageRole,
    pub content: String,
}

impl NewMessage {
    pub fn user(character_id: &Uuid, user_id: &Uuid, content: &str) -> Self {
        Self {
            character_id: *character_id,
            user_id: *user_id,
            role: MessageRole::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(character_id: &Uuid, user_id: &Uuid, content: &str) -> Self {
        Self {
            character_id: *character_id,
            user_id: *user_id,
            role: MessageRole::Assistant,
            content: content.to_string(),
        }
    }
}

impl Message {
    pub fn from_new(new: NewMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            character_id: new.character_id,
            user_id: new.user_id,
            content: new.content,
            role: new.role,
            created_at: Utc::now(),
        }
    }

    /// Opening line shown when a conversation has no stored messages yet.
    /// Never persisted; carries the nil id.
    pub fn greeting(character: &Character, user_id: &Uuid) -> Option<Self> {
        if character.greeting.trim().is_empty() {
            return None;
        }
        Some(Self {
            id: Uuid::nil(),
            character_id: character.id,
            user_id: *user_id,
            content: character.greeting.clone(),
            role: MessageRole::Assistant,
            created_at: Utc::now(),
        })
    }
}
