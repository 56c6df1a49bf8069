use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::utils::utc_now;

/// Value that matches anything when used in any field of a stored permission.
pub const WILDCARD: &str = "*";

// =============================================================================
// PERMISSION
// =============================================================================

/// A single grant. Also used as the requested `{resource, action, filter}` triple of a check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    #[schema(example = "board")]
    pub resource: String,
    #[schema(example = "create")]
    pub action: String,
    /// Optional scoping value. Empty means unscoped.
    #[serde(default)]
    #[schema(example = "")]
    pub filter: String,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            filter: filter.into(),
        }
    }

    pub fn unscoped(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(resource, action, "")
    }

    /// `{*, *, *}`: matches every request.
    pub fn superuser() -> Self {
        Self::new(WILDCARD, WILDCARD, WILDCARD)
    }

    pub fn ensure_complete(&self) -> Result<(), AppError> {
        if self.resource.is_empty() {
            return Err(AppError::validation("missing resource"));
        }
        if self.action.is_empty() {
            return Err(AppError::validation("missing action"));
        }
        Ok(())
    }
}

// =============================================================================
// PERMISSION RECORD
// =============================================================================

/// The persisted per-user document. `permissions` keeps insertion order and may hold duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionRecord {
    #[schema(example = "u1")]
    pub user_id: String,
    /// Unix time (seconds) at which the permission list was last generated.
    #[schema(example = 1_700_000_000)]
    pub generated: i64,
    pub permissions: Vec<Permission>,
    /// Store revision, bumped on every write. Not part of the wire document.
    #[serde(skip)]
    pub version: i64,
}

impl PermissionRecord {
    pub fn new(user_id: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            user_id: user_id.into(),
            generated: utc_now().timestamp(),
            permissions,
            version: 0,
        }
    }

    pub fn push(&mut self, permission: Permission) {
        self.permissions.push(permission);
    }

    /// Removes the first structurally-equal entry. Returns whether anything was removed.
    pub fn remove_first(&mut self, permission: &Permission) -> bool {
        match self.permissions.iter().position(|p| p == permission) {
            Some(index) => {
                self.permissions.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn touch(&mut self) {
        self.generated = utc_now().timestamp();
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPermissionRecord {
    pub user_id: String,
    pub generated: i64,
    pub permissions: String,
    pub version: i64,
}

impl TryFrom<DbPermissionRecord> for PermissionRecord {
    type Error = AppError;

    fn try_from(value: DbPermissionRecord) -> Result<Self, Self::Error> {
        let permissions: Vec<Permission> = serde_json::from_str(&value.permissions)?;

        Ok(PermissionRecord {
            user_id: value.user_id,
            generated: value.generated,
            permissions,
            version: value.version,
        })
    }
}

// =============================================================================
// ROLE TIERS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleTier {
    User,
    Leader,
    Owner,
}

impl std::fmt::Display for RoleTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RoleTier::User => "user",
            RoleTier::Leader => "leader",
            RoleTier::Owner => "owner",
        };
        f.write_str(name)
    }
}

// =============================================================================
// REQUESTS / RESPONSES
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    #[schema(example = "u1")]
    pub user_id: String,
    #[serde(default)]
    #[schema(example = "c1")]
    pub company_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePermissionsRequest {
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PromoteRequest {
    pub tier: RoleTier,
    #[serde(default)]
    pub company_id: Option<String>,
}

/// One element of a batch check. Only the first element's `user_id` is used for identity.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatchCheckItem {
    #[schema(example = "u1")]
    pub user_id: String,
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub filter: String,
}

impl BatchCheckItem {
    pub fn requested(&self) -> Permission {
        Permission::new(self.resource.clone(), self.action.clone(), self.filter.clone())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchCheckRequest {
    pub requests: Vec<BatchCheckItem>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CheckedPermission {
    pub resource: String,
    pub action: String,
    pub filter: String,
    pub allowed: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchCheckResponse {
    pub user_id: String,
    pub permissions: Vec<CheckedPermission>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PermissionListResponse {
    pub user_id: String,
    #[schema(example = "created owner")]
    pub status: String,
    pub permissions: Vec<Permission>,
}
