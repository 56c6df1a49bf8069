//! Persistence of permission records, one document per user.

mod sqlite;

pub use sqlite::SqlitePermissionStore;

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::models::permission::PermissionRecord;

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// `Ok(None)` when the user has no record; errors are reserved for storage faults.
    async fn get(&self, user_id: &str) -> AppResult<Option<PermissionRecord>>;

    /// Inserts a new record. Fails with `Conflict` when one already exists for the user.
    async fn create(&self, record: &PermissionRecord) -> AppResult<()>;

    /// Full-document replace keyed by `user_id` (last write wins). Creates the record when absent.
    async fn update(&self, record: &PermissionRecord) -> AppResult<()>;

    /// Replaces the record only if its stored version still equals `expected_version`.
    /// Returns `false` when another writer got there first or the record is gone.
    async fn replace_if_version(&self, record: &PermissionRecord, expected_version: i64) -> AppResult<bool>;
}
