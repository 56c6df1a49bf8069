//! Authorization facade: the only surface the transport layer talks to.
//!
//! Every operation checks, in order: a non-empty user id, a non-empty caller key, and the
//! key's validity. Nothing is read from or written to the store before all three pass.

use std::sync::Arc;

use crate::authz::{check_perm, RoleComposer};
use crate::errors::{AppError, AppResult};
use crate::keys::KeyValidator;
use crate::models::permission::{
    BatchCheckItem, BatchCheckResponse, CheckedPermission, Permission, PermissionRecord, RoleTier,
};
use crate::store::PermissionStore;
use crate::utils::require_user_id;

/// Attempts for a guarded read-modify-write before giving up with `Conflict`.
const MAX_MODIFY_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn PermissionStore>,
    validator: Arc<dyn KeyValidator>,
}

impl PermissionService {
    pub fn new(store: Arc<dyn PermissionStore>, validator: Arc<dyn KeyValidator>) -> Self {
        Self { store, validator }
    }

    async fn authorize(&self, user_id: &str, caller_key: &str) -> AppResult<()> {
        require_user_id(user_id)?;
        if caller_key.is_empty() {
            return Err(AppError::auth("missing service-key"));
        }
        if !self.validator.validate(user_id, caller_key).await? {
            tracing::info!(user_id = %user_id, "rejected invalid service key");
            return Err(AppError::auth("invalid service key"));
        }
        Ok(())
    }

    /// Composes the owner tier and persists it as the user's first record.
    #[tracing::instrument(skip(self, caller_key))]
    pub async fn create_owner(
        &self,
        user_id: &str,
        caller_key: &str,
        company_id: Option<&str>,
    ) -> AppResult<Vec<Permission>> {
        self.authorize(user_id, caller_key).await?;

        let permissions = RoleComposer::new(user_id, company_id.unwrap_or_default()).owner();
        self.store
            .create(&PermissionRecord::new(user_id, permissions.clone()))
            .await?;

        tracing::info!(count = permissions.len(), "created owner");
        Ok(permissions)
    }

    /// Composes the user tier. Not persisted; the caller decides.
    #[tracing::instrument(skip(self, caller_key))]
    pub async fn create_user(&self, user_id: &str, caller_key: &str, company_id: &str) -> AppResult<Vec<Permission>> {
        self.authorize(user_id, caller_key).await?;
        Ok(RoleComposer::new(user_id, company_id).user())
    }

    /// Composes the leader tier. Not persisted; the caller decides.
    #[tracing::instrument(skip(self, caller_key))]
    pub async fn create_leader(&self, user_id: &str, caller_key: &str, company_id: &str) -> AppResult<Vec<Permission>> {
        self.authorize(user_id, caller_key).await?;
        Ok(RoleComposer::new(user_id, company_id).leader())
    }

    #[tracing::instrument(skip(self, caller_key))]
    pub async fn get(&self, user_id: &str, caller_key: &str) -> AppResult<PermissionRecord> {
        self.authorize(user_id, caller_key).await?;

        self.store
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("no permissions for {user_id}")))
    }

    /// Replaces the whole permission list. Last write wins.
    #[tracing::instrument(skip(self, caller_key, permissions), fields(count = permissions.len()))]
    pub async fn update_permissions(
        &self,
        user_id: &str,
        caller_key: &str,
        permissions: Vec<Permission>,
    ) -> AppResult<PermissionRecord> {
        self.authorize(user_id, caller_key).await?;
        for permission in &permissions {
            permission.ensure_complete()?;
        }

        let record = PermissionRecord::new(user_id, permissions);
        self.store.update(&record).await?;
        Ok(record)
    }

    /// Replaces the user's record with the canonical list of `tier`.
    #[tracing::instrument(skip(self, caller_key))]
    pub async fn promote(
        &self,
        user_id: &str,
        caller_key: &str,
        tier: RoleTier,
        company_id: Option<&str>,
    ) -> AppResult<PermissionRecord> {
        self.authorize(user_id, caller_key).await?;

        let permissions = RoleComposer::new(user_id, company_id.unwrap_or_default()).for_tier(tier);
        let record = PermissionRecord::new(user_id, permissions);
        self.store.update(&record).await?;

        tracing::info!(%tier, count = record.permissions.len(), "promoted");
        Ok(record)
    }

    #[tracing::instrument(skip(self, caller_key))]
    pub async fn add_permission(
        &self,
        user_id: &str,
        caller_key: &str,
        permission: Permission,
    ) -> AppResult<PermissionRecord> {
        self.authorize(user_id, caller_key).await?;
        permission.ensure_complete()?;

        self.modify(user_id, |record| {
            record.push(permission.clone());
            true
        })
        .await
    }

    /// Removes the first structurally-equal entry, if any.
    #[tracing::instrument(skip(self, caller_key))]
    pub async fn remove_permission(
        &self,
        user_id: &str,
        caller_key: &str,
        permission: Permission,
    ) -> AppResult<PermissionRecord> {
        self.authorize(user_id, caller_key).await?;
        permission.ensure_complete()?;

        self.modify(user_id, |record| record.remove_first(&permission)).await
    }

    /// Read-modify-write guarded by the record version. `apply` returns whether it changed
    /// anything; unchanged records are not written back.
    async fn modify<F>(&self, user_id: &str, apply: F) -> AppResult<PermissionRecord>
    where
        F: Fn(&mut PermissionRecord) -> bool,
    {
        for attempt in 1..=MAX_MODIFY_ATTEMPTS {
            let mut record = self
                .store
                .get(user_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("no permissions for {user_id}")))?;
            let expected_version = record.version;

            if !apply(&mut record) {
                return Ok(record);
            }
            record.touch();

            if self.store.replace_if_version(&record, expected_version).await? {
                record.version = expected_version + 1;
                return Ok(record);
            }
            tracing::debug!(attempt, "concurrent permission update, retrying");
        }

        Err(AppError::conflict(format!(
            "permissions for {user_id} changed concurrently, giving up after {MAX_MODIFY_ATTEMPTS} attempts"
        )))
    }

    /// True iff a stored grant matches. A user without a record has no grants.
    #[tracing::instrument(skip(self, caller_key))]
    pub async fn check_perm(&self, user_id: &str, caller_key: &str, requested: &Permission) -> AppResult<bool> {
        self.authorize(user_id, caller_key).await?;
        requested.ensure_complete()?;

        match self.store.get(user_id).await? {
            Some(record) => Ok(check_perm(&record.permissions, requested)),
            None => {
                tracing::debug!("no permission record, denying");
                Ok(false)
            }
        }
    }

    /// Validates the key once against the first item's user and evaluates every item under
    /// that identity.
    #[tracing::instrument(skip(self, caller_key, items), fields(count = items.len()))]
    pub async fn multi_check(&self, caller_key: &str, items: &[BatchCheckItem]) -> AppResult<BatchCheckResponse> {
        let first = items
            .first()
            .ok_or_else(|| AppError::validation("empty permission batch"))?;
        let user_id = first.user_id.as_str();
        self.authorize(user_id, caller_key).await?;

        let stored = self
            .store
            .get(user_id)
            .await?
            .map(|record| record.permissions)
            .unwrap_or_default();

        let mut permissions = Vec::with_capacity(items.len());
        for item in items {
            let requested = item.requested();
            requested.ensure_complete()?;
            permissions.push(CheckedPermission {
                allowed: check_perm(&stored, &requested),
                resource: requested.resource,
                action: requested.action,
                filter: requested.filter,
            });
        }

        Ok(BatchCheckResponse {
            user_id: user_id.to_string(),
            permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;

    use crate::db::MIGRATOR;
    use crate::store::SqlitePermissionStore;

    /// Accepts only "good" and counts calls.
    #[derive(Default)]
    struct FakeValidator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeyValidator for FakeValidator {
        async fn validate(&self, _user_id: &str, supplied_key: &str) -> AppResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(supplied_key == "good")
        }
    }

    struct FailingValidator;

    #[async_trait]
    impl KeyValidator for FailingValidator {
        async fn validate(&self, _user_id: &str, _supplied_key: &str) -> AppResult<bool> {
            Err(AppError::upstream("key service down"))
        }
    }

    async fn store() -> Arc<SqlitePermissionStore> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect");
        MIGRATOR.run(&pool).await.expect("migrate");
        Arc::new(SqlitePermissionStore::new(pool))
    }

    async fn service() -> (PermissionService, Arc<SqlitePermissionStore>, Arc<FakeValidator>) {
        let store = store().await;
        let validator = Arc::new(FakeValidator::default());
        (PermissionService::new(store.clone(), validator.clone()), store, validator)
    }

    async fn record_count(store: &SqlitePermissionStore) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM permission_records")
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn missing_user_id_fails_before_any_side_effect() {
        let (service, store, validator) = service().await;
        let grant = Permission::unscoped("board", "view");

        assert!(matches!(service.create_owner("", "good", None).await, Err(AppError::Validation(_))));
        assert!(matches!(service.create_user("", "good", "c1").await, Err(AppError::Validation(_))));
        assert!(matches!(service.get("", "good").await, Err(AppError::Validation(_))));
        assert!(matches!(
            service.update_permissions("", "good", vec![grant.clone()]).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(service.check_perm("", "good", &grant).await, Err(AppError::Validation(_))));
        assert!(matches!(
            service.add_permission("", "good", grant.clone()).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.remove_permission("", "good", grant.clone()).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.promote("", "good", RoleTier::Owner, Some("c1")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(service.create_leader("", "good", "c1").await, Err(AppError::Validation(_))));

        let batch = vec![
            BatchCheckItem {
                user_id: String::new(),
                resource: "board".into(),
                action: "view".into(),
                filter: String::new(),
            },
            BatchCheckItem {
                user_id: "u2".into(),
                resource: "board".into(),
                action: "view".into(),
                filter: String::new(),
            },
        ];
        assert!(matches!(service.multi_check("good", &batch).await, Err(AppError::Validation(_))));

        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(record_count(&store).await, 0);
    }

    #[tokio::test]
    async fn missing_or_invalid_key_is_auth_error() {
        let (service, store, validator) = service().await;

        let err = service.create_owner("u1", "", None).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);

        let err = service.create_owner("u1", "bad", None).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
        assert_eq!(record_count(&store).await, 0);
    }

    #[tokio::test]
    async fn upstream_failure_propagates() {
        let service = PermissionService::new(store().await, Arc::new(FailingValidator));
        let err = service.get("u1", "good").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[tokio::test]
    async fn create_owner_persists_and_authorizes() {
        let (service, _, _) = service().await;

        let perms = service.create_owner("u1", "good", None).await.unwrap();
        assert!(perms.contains(&Permission::unscoped("company", "create")));
        assert!(perms.contains(&Permission::unscoped("u1", "view")));

        let record = service.get("u1", "good").await.unwrap();
        assert_eq!(record.permissions, perms);

        assert!(service
            .check_perm("u1", "good", &Permission::unscoped("company", "create"))
            .await
            .unwrap());
        assert!(!service
            .check_perm("u1", "good", &Permission::unscoped("nonexistent", "x"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn create_owner_twice_conflicts() {
        let (service, _, _) = service().await;
        service.create_owner("u1", "good", Some("c1")).await.unwrap();

        let err = service.create_owner("u1", "good", Some("c1")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_user_does_not_persist() {
        let (service, store, _) = service().await;

        let perms = service.create_user("u1", "good", "c1").await.unwrap();
        assert!(perms.contains(&Permission::unscoped("c1", "view")));
        let leader = service.create_leader("u1", "good", "c1").await.unwrap();
        assert!(leader.len() > perms.len());

        assert_eq!(record_count(&store).await, 0);
        assert!(matches!(service.get("u1", "good").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_permissions_replaces_everything() {
        let (service, _, _) = service().await;
        service.create_owner("u1", "good", Some("c1")).await.unwrap();

        let replacement = vec![Permission::new("board", "view", "c1"), Permission::superuser()];
        service.update_permissions("u1", "good", replacement.clone()).await.unwrap();

        let record = service.get("u1", "good").await.unwrap();
        assert_eq!(record.permissions, replacement);
        assert!(!record.permissions.contains(&Permission::unscoped("company", "create")));
    }

    #[tokio::test]
    async fn update_permissions_rejects_incomplete_grants() {
        let (service, store, _) = service().await;
        let err = service
            .update_permissions("u1", "good", vec![Permission::unscoped("", "view")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(record_count(&store).await, 0);
    }

    #[tokio::test]
    async fn add_and_remove_permission() {
        let (service, _, _) = service().await;
        let grant = Permission::new("board", "view", "c9");
        service
            .update_permissions("u1", "good", vec![grant.clone(), grant.clone()])
            .await
            .unwrap();

        let record = service.remove_permission("u1", "good", grant.clone()).await.unwrap();
        assert_eq!(record.permissions, vec![grant.clone()]);

        let record = service
            .add_permission("u1", "good", Permission::unscoped("timer", "start"))
            .await
            .unwrap();
        assert_eq!(record.permissions.len(), 2);

        let stored = service.get("u1", "good").await.unwrap();
        assert_eq!(stored.permissions, record.permissions);
    }

    #[tokio::test]
    async fn remove_absent_permission_is_a_no_op() {
        let (service, _, _) = service().await;
        service
            .update_permissions("u1", "good", vec![Permission::unscoped("vote", "add")])
            .await
            .unwrap();

        let record = service
            .remove_permission("u1", "good", Permission::unscoped("vote", "remove"))
            .await
            .unwrap();
        assert_eq!(record.permissions, vec![Permission::unscoped("vote", "add")]);
    }

    #[tokio::test]
    async fn add_permission_without_record_is_not_found() {
        let (service, _, _) = service().await;
        let err = service
            .add_permission("ghost", "good", Permission::unscoped("vote", "add"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_adds_are_not_lost() {
        let (service, _, _) = service().await;
        service.update_permissions("u1", "good", vec![]).await.unwrap();

        let a = service.add_permission("u1", "good", Permission::unscoped("timer", "start"));
        let b = service.add_permission("u1", "good", Permission::unscoped("timer", "stop"));
        let (a, b) = tokio::join!(a, b);
        a.unwrap();
        b.unwrap();

        let record = service.get("u1", "good").await.unwrap();
        assert_eq!(record.permissions.len(), 2);
    }

    #[tokio::test]
    async fn check_without_record_is_denied() {
        let (service, _, _) = service().await;
        assert!(!service
            .check_perm("nobody", "good", &Permission::unscoped("board", "view"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn promote_moves_user_up_a_tier() {
        let (service, _, _) = service().await;
        let user = service.create_user("u1", "good", "c1").await.unwrap();
        service.update_permissions("u1", "good", user).await.unwrap();

        let edit_board = Permission::unscoped("board", "edit");
        assert!(!service.check_perm("u1", "good", &edit_board).await.unwrap());

        service.promote("u1", "good", RoleTier::Leader, Some("c1")).await.unwrap();
        assert!(service.check_perm("u1", "good", &edit_board).await.unwrap());

        let record = service.promote("u1", "good", RoleTier::Owner, Some("c1")).await.unwrap();
        assert!(record.permissions.contains(&Permission::unscoped("c1", "delete")));
    }

    #[tokio::test]
    async fn multi_check_uses_first_identity() {
        let (service, _, validator) = service().await;
        service.create_owner("u1", "good", Some("c1")).await.unwrap();
        let before = validator.calls.load(Ordering::SeqCst);

        let item = |user_id: &str, resource: &str, action: &str| BatchCheckItem {
            user_id: user_id.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
            filter: String::new(),
        };
        let items = vec![
            item("u1", "billing", "edit"),
            item("someone-else", "c1", "delete"),
            item("u1", "nonexistent", "x"),
        ];

        let response = service.multi_check("good", &items).await.unwrap();
        assert_eq!(response.user_id, "u1");
        let allowed: Vec<bool> = response.permissions.iter().map(|p| p.allowed).collect();
        assert_eq!(allowed, vec![true, true, false]);
        assert_eq!(validator.calls.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test]
    async fn multi_check_rejects_empty_batch_and_bad_key() {
        let (service, _, _) = service().await;
        assert!(matches!(service.multi_check("good", &[]).await, Err(AppError::Validation(_))));

        let items = vec![BatchCheckItem {
            user_id: "u1".to_string(),
            resource: "board".to_string(),
            action: "view".to_string(),
            filter: String::new(),
        }];
        assert!(matches!(service.multi_check("bad", &items).await, Err(AppError::Auth(_))));
    }
}
