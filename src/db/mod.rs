use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::config::StorageConfig;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

pub async fn init(storage: &StorageConfig) -> anyhow::Result<SqlitePool> {
	let pool = connect(storage).await?;

	MIGRATOR
		.run(&pool)
		.await
		.context("failed to run migrations")?;

	Ok(pool)
}

/// Opens the pool without touching the schema.
pub async fn connect(storage: &StorageConfig) -> anyhow::Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(&storage.database_url)
		.with_context(|| format!("invalid DATABASE_URL: {}", storage.database_url))?
		.create_if_missing(true);

	let pool_size = storage.pool_size();
	if pool_size != storage.max_connections {
		tracing::debug!(requested = storage.max_connections, pool_size, "in-memory database, pinning pool size");
	}

	let pool = SqlitePoolOptions::new()
		.max_connections(pool_size)
		.min_connections(1)
		.acquire_timeout(storage.acquire_timeout)
		.connect_with(options)
		.await
		.context("failed to connect to database")?;

	Ok(pool)
}
