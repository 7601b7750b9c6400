use tavern_common::{optional_env, EnvVars};

pub const DEFAULT_PORT: u16 = 3033;

pub struct ApiServerEnv {
    pub port: u16,
}

impl EnvVars for ApiServerEnv {
    fn load() -> Self {
        let port = optional_env("PORT")
            .and_then(|raw| match raw.parse::<u16>() {
                Ok(port) => Some(port),
                Err(e) => {
                    tracing::warn!("[ApiServerEnv::load] ignoring PORT={raw:?}: {e}");
                    None
                }
            })
            .unwrap_or(DEFAULT_PORT);

        Self { port }
    }

    fn get_env_var(&self, key: &str) -> Option<String> {
        match key {
            "PORT" => Some(self.port.to_string()),
            _ => None,
        }
    }
}
