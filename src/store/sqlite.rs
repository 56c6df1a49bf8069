use async_trait::async_trait;
use sqlx::SqlitePool;

use super::PermissionStore;
use crate::errors::{AppError, AppResult};
use crate::models::permission::{DbPermissionRecord, PermissionRecord};

/// SQLite-backed store. Each call borrows one pooled connection for a single statement.
#[derive(Debug, Clone)]
pub struct SqlitePermissionStore {
    pool: SqlitePool,
}

impl SqlitePermissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PermissionStore for SqlitePermissionStore {
    async fn get(&self, user_id: &str) -> AppResult<Option<PermissionRecord>> {
        let row = sqlx::query_as::<_, DbPermissionRecord>(
            "SELECT user_id, generated, permissions, version FROM permission_records WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PermissionRecord::try_from).transpose()
    }

    async fn create(&self, record: &PermissionRecord) -> AppResult<()> {
        let permissions = serde_json::to_string(&record.permissions)?;

        sqlx::query(
            "INSERT INTO permission_records (user_id, generated, permissions, version) VALUES (?, ?, ?, 0)",
        )
        .bind(&record.user_id)
        .bind(record.generated)
        .bind(permissions)
        .execute(&self.pool)
        .await
        .map_err(|err| match AppError::from(err) {
            AppError::Conflict(_) => {
                AppError::conflict(format!("permission record already exists for {}", record.user_id))
            }
            other => other,
        })?;

        tracing::debug!(user_id = %record.user_id, count = record.permissions.len(), "permission record created");
        Ok(())
    }

    async fn update(&self, record: &PermissionRecord) -> AppResult<()> {
        let permissions = serde_json::to_string(&record.permissions)?;

        sqlx::query(
            "INSERT INTO permission_records (user_id, generated, permissions, version) VALUES (?, ?, ?, 0) \
             ON CONFLICT(user_id) DO UPDATE SET generated = excluded.generated, permissions = excluded.permissions, \
             version = permission_records.version + 1",
        )
        .bind(&record.user_id)
        .bind(record.generated)
        .bind(permissions)
        .execute(&self.pool)
        .await?;

        tracing::debug!(user_id = %record.user_id, count = record.permissions.len(), "permission record replaced");
        Ok(())
    }

    async fn replace_if_version(&self, record: &PermissionRecord, expected_version: i64) -> AppResult<bool> {
        let permissions = serde_json::to_string(&record.permissions)?;

        let result = sqlx::query(
            "UPDATE permission_records SET generated = ?, permissions = ?, version = version + 1 \
             WHERE user_id = ? AND version = ?",
        )
        .bind(record.generated)
        .bind(permissions)
        .bind(&record.user_id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
