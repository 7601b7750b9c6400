use anyhow::anyhow;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
};
use serde::{Deserialize, Serialize};

use crate::{Character, Message, MessageRole, ValidationError};

/// One `{role, content}` entry of the conversation sent to the provider.
/// Inbound history uses the same shape; any extra message fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub role: MessageRole,
    pub content: String,
}

impl Prompt {
    pub fn new_system(prompt: &str) -> Self {
        Self { role: MessageRole::System, content: prompt.to_string() }
    }

    pub fn new_user(prompt: &str) -> Self {
        Self { role: MessageRole::User, content: prompt.to_string() }
    }

    pub fn new_assistant(prompt: &str) -> Self {
        Self { role: MessageRole::Assistant, content: prompt.to_string() }
    }

    /// Converts an envelope into the provider's request message types.
    pub fn pack(messages: &[Self]) -> anyhow::Result<Vec<ChatCompletionRequestMessage>> {
        messages.iter().map(|m| {
            let content = m.content.clone();
            Ok(match m.role {
                MessageRole::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(content)
                        .build()
                        .map_err(|e| anyhow!("[Prompt::pack] Failed to pack message: {}", e))?
                ),
                MessageRole::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(content)
                        .build()
                        .map_err(|e| anyhow!("[Prompt::pack] Failed to pack message: {}", e))?
                ),
                MessageRole::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(content)
                        .build()
                        .map_err(|e| anyhow!("[Prompt::pack] Failed to pack message: {}", e))?
                ),
            })
        }).collect()
    }
}

impl From<&Message> for Prompt {
    fn from(message: &Message) -> Self {
        Self { role: message.role, content: message.content.clone() }
    }
}

pub fn system_instruction(character: &Character) -> String {
    format!(
        "You are {name}. {personality}

Rules:
- Never mention being an AI
- Stay in character at all times
- Keep responses concise (2-3 sentences)
- Be engaging and conversational
- Use the character's speaking style and mannerisms
- Reference the character's background naturally
- Use <think> tags to show your thought process before responding
- After thinking, provide your final response without tags",
        name = character.name,
        personality = character.personality,
    )
}

/// Builds the prompt envelope: one system instruction for `character`
/// followed by `history` exactly as given. History must already be in
/// chronological order; it is not sorted here.
pub fn build_prompt(
    character: Option<&Character>, history: &[Prompt],
) -> Result<Vec<Prompt>, ValidationError> {
    let character = character
        .ok_or(ValidationError("Character is required to build a prompt".to_string()))?;
    character.validate()?;

    let mut envelope = Vec::with_capacity(history.len() + 1);
    envelope.push(Prompt::new_system(&system_instruction(character)));
    envelope.extend(history.iter().cloned());
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samantha() -> Character {
        Character {
            name: "Samantha".into(),
            personality: "Warm, witty and endlessly curious.".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_system_instruction_interpolates_character() {
        let instruction = system_instruction(&samantha());
        assert!(instruction.starts_with("You are Samantha. Warm, witty and endlessly curious.\n\nRules:\n"));
        assert!(instruction.contains("- Never mention being an AI"));
        assert!(instruction.contains("- Keep responses concise (2-3 sentences)"));
        assert!(instruction.ends_with("- After thinking, provide your final response without tags"));
    }

    #[test]
    fn test_envelope_starts_with_single_system_entry() {
        let history = vec![
            Prompt::new_assistant("Hi, I'm Samantha."),
            Prompt::new_user("Hello!"),
            Prompt::new_assistant("How are you today?"),
            Prompt::new_user("Great."),
        ];
        let envelope = build_prompt(Some(&samantha()), &history).unwrap();

        assert_eq!(envelope.len(), history.len() + 1);
        assert_eq!(envelope[0].role, MessageRole::System);
        assert_eq!(envelope.iter().filter(|p| p.role == MessageRole::System).count(), 1);
        assert_eq!(&envelope[1..], &history[..]);
    }

    #[test]
    fn test_empty_history_yields_only_system_entry() {
        let envelope = build_prompt(Some(&samantha()), &[]).unwrap();
        assert_eq!(envelope.len(), 1);
    }

    #[test]
    fn test_history_system_entries_are_kept_verbatim() {
        let history = vec![Prompt::new_system("earlier note"), Prompt::new_user("hey")];
        let envelope = build_prompt(Some(&samantha()), &history).unwrap();
        assert_eq!(envelope[1], Prompt::new_system("earlier note"));
    }

    #[test]
    fn test_rejects_absent_or_incomplete_character() {
        assert!(build_prompt(None, &[]).is_err());

        let mut blank = samantha();
        blank.personality = String::new();
        let err = build_prompt(Some(&blank), &[]).unwrap_err();
        assert_eq!(err.0, "Character personality is required");
    }

    #[test]
    fn test_wire_messages_drop_extra_fields() {
        let history: Vec<Prompt> = serde_json::from_str(r#"[
            {"id":"greeting","character_id":"c","user_id":"system","content":"Hello!","role":"assistant","created_at":"2024-01-01T00:00:00Z"},
            {"content":"Hi","role":"user"}
        ]"#).unwrap();
        assert_eq!(history, vec![Prompt::new_assistant("Hello!"), Prompt::new_user("Hi")]);
    }

    #[test]
    fn test_pack_maps_roles() {
        let packed = Prompt::pack(&[Prompt::new_system("s"), Prompt::new_user("u"), Prompt::new_assistant("a")]).unwrap();
        assert!(matches!(packed[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(packed[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(packed[2], ChatCompletionRequestMessage::Assistant(_)));
    }
}
