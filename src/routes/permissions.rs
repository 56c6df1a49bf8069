//! HTTP adapter over [`PermissionService`](crate::service::PermissionService).
//!
//! The caller's service key travels in the `X-API-KEY` header.

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::models::permission::{
    BatchCheckRequest, BatchCheckResponse, CheckResponse, CreateUserRequest, Permission, PermissionListResponse,
    PermissionRecord, PromoteRequest, UpdatePermissionsRequest,
};

pub const SERVICE_KEY_HEADER: &str = "x-api-key";

/// Caller-supplied service key. Empty when the header is absent; the service decides what that means.
#[derive(Debug, Clone, Default)]
pub struct ServiceKey(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ServiceKey {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(SERVICE_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Ok(ServiceKey(key))
    }
}

fn list_response(user_id: String, status: &str, permissions: Vec<Permission>) -> PermissionListResponse {
    PermissionListResponse {
        user_id,
        status: status.to_string(),
        permissions,
    }
}

#[utoipa::path(
    post,
    path = "/owners",
    tag = "Provisioning",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Owner created and persisted", body = PermissionListResponse),
        (status = 409, description = "Record already exists")
    ),
    security(("apiKey" = []))
)]
pub async fn create_owner(
    State(state): State<AppState>,
    ServiceKey(key): ServiceKey,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<PermissionListResponse>)> {
    let permissions = state
        .service
        .create_owner(&payload.user_id, &key, payload.company_id.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(list_response(payload.user_id, "created owner", permissions)),
    ))
}

/// Without a company the caller is assumed to be founding one, so the owner path runs.
#[utoipa::path(
    post,
    path = "/users",
    tag = "Provisioning",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User tier composed (not persisted)", body = PermissionListResponse),
        (status = 201, description = "Owner created and persisted", body = PermissionListResponse)
    ),
    security(("apiKey" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    ServiceKey(key): ServiceKey,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<PermissionListResponse>)> {
    match payload.company_id.as_deref() {
        None | Some("") => {
            let permissions = state.service.create_owner(&payload.user_id, &key, None).await?;
            Ok((
                StatusCode::CREATED,
                Json(list_response(payload.user_id, "created owner", permissions)),
            ))
        }
        Some(company_id) => {
            let permissions = state.service.create_user(&payload.user_id, &key, company_id).await?;
            Ok((StatusCode::OK, Json(list_response(payload.user_id, "user", permissions))))
        }
    }
}

#[utoipa::path(
    post,
    path = "/leaders",
    tag = "Provisioning",
    request_body = CreateUserRequest,
    responses((status = 200, description = "Leader tier composed (not persisted)", body = PermissionListResponse)),
    security(("apiKey" = []))
)]
pub async fn create_leader(
    State(state): State<AppState>,
    ServiceKey(key): ServiceKey,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<Json<PermissionListResponse>> {
    let company_id = payload.company_id.as_deref().unwrap_or_default();
    let permissions = state.service.create_leader(&payload.user_id, &key, company_id).await?;
    Ok(Json(list_response(payload.user_id, "leader", permissions)))
}

#[utoipa::path(
    get,
    path = "/permissions/{user_id}",
    tag = "Permissions",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Permission record", body = PermissionRecord),
        (status = 404, description = "No record for user")
    ),
    security(("apiKey" = []))
)]
pub async fn get_permissions(
    State(state): State<AppState>,
    ServiceKey(key): ServiceKey,
    Path(user_id): Path<String>,
) -> AppResult<Json<PermissionRecord>> {
    let record = state.service.get(&user_id, &key).await?;
    Ok(Json(record))
}

#[utoipa::path(
    put,
    path = "/permissions/{user_id}",
    tag = "Permissions",
    params(("user_id" = String, Path, description = "User id")),
    request_body = UpdatePermissionsRequest,
    responses((status = 200, description = "Permissions replaced", body = PermissionRecord)),
    security(("apiKey" = []))
)]
pub async fn update_permissions(
    State(state): State<AppState>,
    ServiceKey(key): ServiceKey,
    Path(user_id): Path<String>,
    Json(payload): Json<UpdatePermissionsRequest>,
) -> AppResult<Json<PermissionRecord>> {
    let record = state
        .service
        .update_permissions(&user_id, &key, payload.permissions)
        .await?;
    Ok(Json(record))
}

#[utoipa::path(
    post,
    path = "/permissions/{user_id}/grant",
    tag = "Permissions",
    params(("user_id" = String, Path, description = "User id")),
    request_body = Permission,
    responses((status = 200, description = "Permission appended", body = PermissionRecord)),
    security(("apiKey" = []))
)]
pub async fn grant_permission(
    State(state): State<AppState>,
    ServiceKey(key): ServiceKey,
    Path(user_id): Path<String>,
    Json(permission): Json<Permission>,
) -> AppResult<Json<PermissionRecord>> {
    let record = state.service.add_permission(&user_id, &key, permission).await?;
    Ok(Json(record))
}

#[utoipa::path(
    post,
    path = "/permissions/{user_id}/revoke",
    tag = "Permissions",
    params(("user_id" = String, Path, description = "User id")),
    request_body = Permission,
    responses((status = 200, description = "First matching permission removed", body = PermissionRecord)),
    security(("apiKey" = []))
)]
pub async fn revoke_permission(
    State(state): State<AppState>,
    ServiceKey(key): ServiceKey,
    Path(user_id): Path<String>,
    Json(permission): Json<Permission>,
) -> AppResult<Json<PermissionRecord>> {
    let record = state.service.remove_permission(&user_id, &key, permission).await?;
    Ok(Json(record))
}

#[utoipa::path(
    post,
    path = "/permissions/{user_id}/promote",
    tag = "Permissions",
    params(("user_id" = String, Path, description = "User id")),
    request_body = PromoteRequest,
    responses((status = 200, description = "Record replaced with the tier's grants", body = PermissionRecord)),
    security(("apiKey" = []))
)]
pub async fn promote(
    State(state): State<AppState>,
    ServiceKey(key): ServiceKey,
    Path(user_id): Path<String>,
    Json(payload): Json<PromoteRequest>,
) -> AppResult<Json<PermissionRecord>> {
    let record = state
        .service
        .promote(&user_id, &key, payload.tier, payload.company_id.as_deref())
        .await?;
    Ok(Json(record))
}

#[utoipa::path(
    post,
    path = "/permissions/{user_id}/check",
    tag = "Checks",
    params(("user_id" = String, Path, description = "User id")),
    request_body = Permission,
    responses((status = 200, description = "Whether the user may do it", body = CheckResponse)),
    security(("apiKey" = []))
)]
pub async fn check_permission(
    State(state): State<AppState>,
    ServiceKey(key): ServiceKey,
    Path(user_id): Path<String>,
    Json(requested): Json<Permission>,
) -> AppResult<Json<CheckResponse>> {
    let allowed = state.service.check_perm(&user_id, &key, &requested).await?;
    Ok(Json(CheckResponse { allowed }))
}

#[utoipa::path(
    post,
    path = "/checks",
    tag = "Checks",
    request_body = BatchCheckRequest,
    responses((status = 200, description = "Per-item verdicts for the first request's user", body = BatchCheckResponse)),
    security(("apiKey" = []))
)]
pub async fn multi_check(
    State(state): State<AppState>,
    ServiceKey(key): ServiceKey,
    Json(payload): Json<BatchCheckRequest>,
) -> AppResult<Json<BatchCheckResponse>> {
    let response = state.service.multi_check(&key, &payload.requests).await?;
    Ok(Json(response))
}
