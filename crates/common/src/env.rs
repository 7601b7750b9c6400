pub trait EnvVars {
    fn load() -> Self;
    fn get_env_var(&self, key: &str) -> Option<String>;
}

/// Reads an environment variable, treating an empty value as unset.
pub fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
