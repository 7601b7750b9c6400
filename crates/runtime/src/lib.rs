mod character;
mod error;
mod llm;
mod message;
mod prompt;
mod reply;
mod sse;
mod store;

pub use character::{Character, CharacterCategory, NewCharacter, DEFAULT_AVATAR_URL};
pub use error::{ChatError, ValidationError};
pub use llm::{Completion, CompletionGateway};
pub use message::{Message, MessageRole, NewMessage};
pub use prompt::{build_prompt, system_instruction, Prompt};
pub use reply::{normalize_reply, visible_fragments, NormalizedReply, ThinkFilter};
pub use sse::{decode_fragments, ParseFragmentError, SseDecoder, SseEvent};
pub use store::{CharacterQuery, ChatStore, MemoryChatStore, PgChatStore, DEFAULT_PAGE_SIZE};
