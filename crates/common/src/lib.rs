mod client;
mod env;

pub use client::ModuleClient;
pub use env::{EnvVars, optional_env};

/// Shortens a secret for log output: the first 8 characters followed by `...`.
/// Secrets of 8 characters or fewer are fully hidden.
pub fn mask_token(token: &str) -> String {
    if token.chars().count() <= 8 {
        return "***".to_string();
    }
    let head: String = token.chars().take(8).collect();
    format!("{head}...")
}
