//! Persistence for user-configured command definitions.

use std::str::FromStr;

use sqlx::{
    Pool, Sqlite, SqlitePool,
    sqlite::SqliteConnectOptions,
};

pub mod models;

#[derive(Clone)]
pub struct DbService {
    pub pool: Pool<Sqlite>,
}

impl DbService {
    pub async fn new(database_url: &str) -> Result<DbService, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!(database_url, "database migrated and ready");
        Ok(DbService { pool })
    }
}
