use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::ValidationError;

pub const DEFAULT_AVATAR_URL: &str = "/omi-avatar.svg";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterCategory {
    #[default]
    General,
    Historical,
    Fictional,
    Assistant,
    Roleplay,
}

impl CharacterCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CharacterCategory::General => "general",
            CharacterCategory::Historical => "historical",
            CharacterCategory::Fictional => "fictional",
            CharacterCategory::Assistant => "assistant",
            CharacterCategory::Roleplay => "roleplay",
        }
    }
}

impl fmt::Display for CharacterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CharacterCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(CharacterCategory::General),
            "historical" => Ok(CharacterCategory::Historical),
            "fictional" => Ok(CharacterCategory::Fictional),
            "assistant" => Ok(CharacterCategory::Assistant),
            "roleplay" => Ok(CharacterCategory::Roleplay),
            other => Err(anyhow::anyhow!("unknown character category: {other}")),
        }
    }
}

fn default_true() -> bool { true }

/// Decodes a field, falling back to its default on `null` or a value of the
/// wrong shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_bool().unwrap_or(true))
}

/// A chat persona. Every field but `name` and `personality` may be absent,
/// `null` or malformed on the wire; those two are checked by
/// [`Character::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Character {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Uuid,

    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient")]
    pub personality: String,
    #[serde(default, deserialize_with = "lenient")]
    pub greeting: String,
    #[serde(default, deserialize_with = "lenient")]
    pub category: CharacterCategory,
    #[serde(default, deserialize_with = "lenient")]
    pub avatar_url: String,

    #[serde(default = "default_true", deserialize_with = "lenient_true")]
    pub is_public: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub created_by: String,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: DateTime<Utc>,
}

impl Character {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError("Character name is required".to_string()));
        }
        if self.personality.trim().is_empty() {
            return Err(ValidationError("Character personality is required".to_string()));
        }
        Ok(())
    }
}

/// Payload of the character creation form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCharacter {
    pub name: String,
    pub description: String,
    pub personality: String,
    pub greeting: String,
    #[serde(default)]
    pub category: CharacterCategory,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

impl NewCharacter {
    /// Checks the form and builds the stored record with trimmed text fields.
    pub fn into_character(self, creator: &Uuid) -> Result<Character, ValidationError> {
        let required = [
            ("name", &self.name),
            ("description", &self.description),
            ("personality", &self.personality),
            ("greeting", &self.greeting),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ValidationError(format!("Character {field} is required")));
            }
        }

        let avatar_url = self.avatar_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string());

        Ok(Character {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            personality: self.personality.trim().to_string(),
            greeting: self.greeting.trim().to_string(),
            category: self.category,
            avatar_url,
            is_public: self.is_public.unwrap_or(true),
            created_by: creator.to_string(),
            created_at: Utc::now(),
        })
    }
}
