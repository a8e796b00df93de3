use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("cache: {0}")]
    Cache(#[from] redis::RedisError),
}

/// Process-wide handles shared by every request.
pub struct State {
    pub config: Config,
    pub pool: Pool<Postgres>,
    pub cache: Option<MultiplexedConnection>,
}

impl State {
    pub async fn new(config: Config) -> Result<Arc<Self>, StateError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        log::info!("Database ready");

        let cache = match &config.redis_url {
            Some(url) => {
                let client = redis::Client::open(url.as_str())?;
                let connection = client.get_multiplexed_async_connection().await?;
                log::info!("Catalog cache enabled");
                Some(connection)
            }
            None => {
                log::info!("FOODGRAM_REDIS_URL not set, catalog cache disabled");
                None
            }
        };

        Ok(Arc::new(Self {
            config,
            pool,
            cache,
        }))
    }

    /// State over an existing pool, without a cache.
    pub fn with_pool(config: Config, pool: Pool<Postgres>) -> Arc<Self> {
        Arc::new(Self {
            config,
            pool,
            cache: None,
        })
    }
}
