mod env;
mod identity;
mod llm;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "r2")]
mod r2;

pub use env::LlmEnv;
pub use identity::{IdentityClient, IdentityProvider};
pub use llm::{LlmClient, LlmClientError, DEFAULT_BASE_URL, DEFAULT_MODEL, MAX_TOKENS, TEMPERATURE};

#[cfg(feature = "postgres")]
pub use postgres::PostgresClient;
#[cfg(feature = "r2")]
pub use r2::{R2Client, ImageUpload, AVATAR_FOLDER, MAX_IMAGE_BYTES};
