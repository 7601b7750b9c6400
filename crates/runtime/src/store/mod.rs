mod memory;
mod postgres;

pub use memory::MemoryChatStore;
pub use postgres::PgChatStore;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Character, CharacterCategory, Message, NewMessage};

pub const DEFAULT_PAGE_SIZE: i64 = 12;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub category: Option<CharacterCategory>,
    /// Case-insensitive substring of the character name.
    pub search: Option<String>,
}

impl CharacterQuery {
    pub fn limit(&self) -> i64 {
        self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_SIZE).min(100)
    }

    pub fn offset(&self) -> i64 {
        self.offset.filter(|o| *o > 0).unwrap_or(0)
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Storage of characters and conversation history.
#[async_trait::async_trait]
pub trait ChatStore: Send + Sync + 'static {
    /// Public characters, newest first.
    async fn list_characters(&self, query: &CharacterQuery) -> Result<Vec<Character>>;
    async fn get_character(&self, id: &Uuid) -> Result<Option<Character>>;
    async fn create_character(&self, character: Character) -> Result<Character>;

    /// One user's messages with one character, oldest first.
    async fn list_messages(&self, user_id: &Uuid, character_id: &Uuid) -> Result<Vec<Message>>;
    async fn append_message(&self, new: NewMessage) -> Result<Message>;
}
