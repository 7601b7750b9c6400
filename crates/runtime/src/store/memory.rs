use anyhow::{anyhow, Result};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CharacterQuery, ChatStore};
use crate::{Character, Message, NewMessage};

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct MemoryChatStore {
    characters: RwLock<Vec<Character>>,
    messages: RwLock<Vec<Message>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ChatStore for MemoryChatStore {
    async fn list_characters(&self, query: &CharacterQuery) -> Result<Vec<Character>> {
        let search = query.search().map(str::to_lowercase);
        let mut characters: Vec<Character> = self.characters.read().await
            .iter()
            .filter(|c| c.is_public)
            .filter(|c| query.category.map_or(true, |category| c.category == category))
            .filter(|c| search.as_ref().map_or(true, |s| c.name.to_lowercase().contains(s)))
            .cloned()
            .collect();

        characters.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(characters
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect())
    }

    async fn get_character(&self, id: &Uuid) -> Result<Option<Character>> {
        Ok(self.characters.read().await
            .iter()
            .find(|c| c.id == *id)
            .cloned())
    }

    async fn create_character(&self, character: Character) -> Result<Character> {
        self.characters.write().await.push(character.clone());
        Ok(character)
    }

    async fn list_messages(&self, user_id: &Uuid, character_id: &Uuid) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self.messages.read().await
            .iter()
            .filter(|m| m.user_id == *user_id && m.character_id == *character_id)
            .cloned()
            .collect();
        // stable: equal timestamps keep insertion order
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn append_message(&self, new: NewMessage) -> Result<Message> {
        if self.get_character(&new.character_id).await?.is_none() {
            return Err(anyhow!("character {} does not exist", new.character_id));
        }
        let message = Message::from_new(new);
        self.messages.write().await.push(message.clone());
        Ok(message)
    }
}
