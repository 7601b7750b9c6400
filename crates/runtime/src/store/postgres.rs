use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, QueryBuilder};
use tavern_clients::PostgresClient;
use tavern_common::ModuleClient;
use uuid::Uuid;

use super::{CharacterQuery, ChatStore};
use crate::{Character, Message, NewMessage};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS characters (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL CHECK (length(name) > 0),
        description TEXT NOT NULL DEFAULT '',
        personality TEXT NOT NULL CHECK (length(personality) > 0),
        greeting TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL DEFAULT 'general',
        avatar_url TEXT NOT NULL DEFAULT '',
        is_public BOOLEAN NOT NULL DEFAULT TRUE,
        created_by TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS messages (
        id UUID PRIMARY KEY,
        character_id UUID NOT NULL REFERENCES characters (id),
        user_id UUID NOT NULL,
        content TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('system', 'user', 'assistant')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        seq BIGSERIAL NOT NULL
    )"#,
    r#"ALTER TABLE messages ADD COLUMN IF NOT EXISTS seq BIGSERIAL NOT NULL"#,
    r#"CREATE INDEX IF NOT EXISTS messages_conversation_idx
        ON messages (user_id, character_id, created_at)"#,
    r#"CREATE INDEX IF NOT EXISTS characters_public_created_idx
        ON characters (is_public, created_at DESC)"#,
];

const CHARACTER_COLUMNS: &str =
    "id, name, description, personality, greeting, category, avatar_url, is_public, created_by, created_at";
const MESSAGE_COLUMNS: &str = "id, character_id, user_id, content, role, created_at";
/// `seq` breaks ties between messages stored within the same instant.
const MESSAGE_ORDER: &str = "ORDER BY created_at ASC, seq ASC";

#[derive(Debug, FromRow)]
struct CharacterRow {
    id: Uuid,
    name: String,
    description: String,
    personality: String,
    greeting: String,
    category: String,
    avatar_url: String,
    is_public: bool,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CharacterRow> for Character {
    type Error = anyhow::Error;

    fn try_from(row: CharacterRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            personality: row.personality,
            greeting: row.greeting,
            category: row.category.parse()?,
            avatar_url: row.avatar_url,
            is_public: row.is_public,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    character_id: Uuid,
    user_id: Uuid,
    content: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            character_id: row.character_id,
            user_id: row.user_id,
            content: row.content,
            role: row.role.parse()?,
            created_at: row.created_at,
        })
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside ILIKE.
fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Clone)]
pub struct PgChatStore {
    db: PostgresClient,
}

impl PgChatStore {
    pub fn new(db: PostgresClient) -> Self {
        Self { db }
    }

    /// Creates missing tables and indexes. Safe to run on every start.
    pub async fn init_schema(&self) -> Result<()> {
        let mut tx = self.db.get_client().begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::info!("[PgChatStore::init_schema] schema ready");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatStore for PgChatStore {
    async fn list_characters(&self, query: &CharacterQuery) -> Result<Vec<Character>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {CHARACTER_COLUMNS} FROM characters WHERE is_public = TRUE"
        ));
        if let Some(category) = query.category {
            builder.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(search) = query.search() {
            builder.push(" AND name ILIKE ").push_bind(format!("%{}%", escape_like(search)));
        }
        builder
            .push(" ORDER BY created_at DESC LIMIT ").push_bind(query.limit())
            .push(" OFFSET ").push_bind(query.offset());

        let rows = builder
            .build_query_as::<CharacterRow>()
            .fetch_all(self.db.get_client().as_ref())
            .await?;

        rows.into_iter().map(Character::try_from).collect()
    }

    async fn get_character(&self, id: &Uuid) -> Result<Option<Character>> {
        let row = sqlx::query_as::<_, CharacterRow>(&format!(
            "SELECT {CHARACTER_COLUMNS} FROM characters WHERE id = $1"
        ))
            .bind(id)
            .fetch_optional(self.db.get_client().as_ref())
            .await?;

        row.map(Character::try_from).transpose()
    }

    async fn create_character(&self, character: Character) -> Result<Character> {
        let row = sqlx::query_as::<_, CharacterRow>(&format!(
            "INSERT INTO characters ({CHARACTER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {CHARACTER_COLUMNS}"
        ))
            .bind(character.id)
            .bind(&character.name)
            .bind(&character.description)
            .bind(&character.personality)
            .bind(&character.greeting)
            .bind(character.category.as_str())
            .bind(&character.avatar_url)
            .bind(character.is_public)
            .bind(&character.created_by)
            .bind(character.created_at)
            .fetch_one(self.db.get_client().as_ref())
            .await?;

        Character::try_from(row)
    }

    async fn list_messages(&self, user_id: &Uuid, character_id: &Uuid) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE user_id = $1 AND character_id = $2 {MESSAGE_ORDER}"
        ))
            .bind(user_id)
            .bind(character_id)
            .fetch_all(self.db.get_client().as_ref())
            .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn append_message(&self, new: NewMessage) -> Result<Message> {
        let message = Message::from_new(new);
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {MESSAGE_COLUMNS}"
        ))
            .bind(message.id)
            .bind(message.character_id)
            .bind(message.user_id)
            .bind(&message.content)
            .bind(message.role.as_str())
            .bind(message.created_at)
            .fetch_one(self.db.get_client().as_ref())
            .await?;

        Message::try_from(row)
    }
}
