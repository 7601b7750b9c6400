#[async_trait::async_trait]
pub trait ModuleClient: Clone + Send + Sync + 'static {
    const NAME: &'static str;
    type Client;

    fn validate_env() -> bool;
    async fn setup_connection() -> anyhow::Result<Self>;

    /// Sets up the client only when its environment is present.
    /// Returns `Ok(None)` for an unconfigured optional module.
    async fn try_setup_connection() -> anyhow::Result<Option<Self>> {
        if !Self::validate_env() {
            tracing::warn!("[Client: {}] not configured, module disabled", Self::NAME);
            return Ok(None);
        }
        Self::setup_connection().await.map(Some)
    }

    fn get_client(&self) -> &Self::Client;
}

#[macro_export]
macro_rules! define_module_client {
    {
        (struct $struct_name:ident, $client_name:expr)
        client_type: $client_type:ty,
        env: [ $( $env_var:literal ),* ],
        setup: $setup_logic:expr
    } => {
        #[derive(Clone)]
        pub struct $struct_name {
            client: std::sync::Arc<$client_type>,
        }

        impl $struct_name {
            pub fn from_client(client: $client_type) -> Self {
                Self { client: std::sync::Arc::new(client) }
            }
        }

        #[async_trait::async_trait]
        impl ::tavern_common::ModuleClient for $struct_name {
            const NAME: &'static str = $client_name;
            type Client = std::sync::Arc<$client_type>;

            fn validate_env() -> bool {
                const ENV_VARS: &'static [&'static str] = &[ $( $env_var ),* ];
                let missing_vars: Vec<&'static str> = ENV_VARS
                    .iter()
                    .cloned()
                    .filter(|var| ::tavern_common::optional_env(var).is_none())
                    .collect();

                if missing_vars.is_empty() {
                    return true;
                }

                let vars_str = missing_vars.join(", ");
                tracing::warn!("[Client: {}] Required environment variables are not set: [{}]", $client_name, &vars_str);
                false
            }

            async fn setup_connection() -> anyhow::Result<Self> {
                if !Self::validate_env() {
                    anyhow::bail!("[Client: {}] Required environment variables are not set. Check logs for details.", $client_name);
                }

                let client_instance: anyhow::Result<$client_type> = $setup_logic.await;
                Ok(Self::from_client(client_instance?))
            }

            fn get_client(&self) -> &Self::Client {
                &self.client
            }
        }
    }
}
