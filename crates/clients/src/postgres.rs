use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tavern_common::define_module_client;

define_module_client! {
    (struct PostgresClient, "postgres")
    client_type: PgPool,
    env: ["DATABASE_URL"],
    setup: async {
        let database_url = std::env::var("DATABASE_URL")?;
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await?;
        Ok::<_, anyhow::Error>(pool)
    }
}
