use anyhow::Result;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, create_orm_conn, create_pool},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
}

impl AppState {
    /// Connect both persistence handles against the configured database.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let pool = create_pool(&config.database_url, config.max_connections).await?;
        let orm = create_orm_conn(&config.database_url).await?;
        Ok(Self { pool, orm })
    }
}
