mod characters;
mod chat;
mod messages;
mod misc;

pub use characters::character_routes;
pub use chat::{chat_routes, ChatRequest};
pub use messages::message_routes;
pub use misc::misc_routes;
