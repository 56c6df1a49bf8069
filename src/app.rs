use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::db;
use crate::errors::AppError;
use crate::keys::ServiceKeyValidator;
use crate::routes::permissions;
use crate::service::PermissionService;
use crate::store::SqlitePermissionStore;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PermissionService>,
}

impl AppState {
    pub fn new(service: PermissionService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Wires the SQLite store and the configured key validator behind the HTTP routes.
pub async fn create_app(pool: SqlitePool, config: &AppConfig) -> Result<Router, AppError> {
    let store = Arc::new(SqlitePermissionStore::new(pool));
    let validator = Arc::new(ServiceKeyValidator::from_config(config)?);

    if config.flags.development {
        tracing::warn!("development mode: service keys are not checked");
    }

    let service = PermissionService::new(store, validator);
    Ok(router(AppState::new(service)))
}

/// Opens and migrates the configured database, then builds the app on top of it.
pub async fn bootstrap(config: &AppConfig) -> Result<Router, AppError> {
    let pool = db::init(&config.storage).await?;
    create_app(pool, config).await
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let provisioning_routes = Router::new()
        .route("/owners", post(permissions::create_owner))
        .route("/users", post(permissions::create_user))
        .route("/leaders", post(permissions::create_leader))
        .route("/checks", post(permissions::multi_check));

    let permission_routes = Router::new()
        .route(
            "/:user_id",
            get(permissions::get_permissions).put(permissions::update_permissions),
        )
        .route("/:user_id/grant", post(permissions::grant_permission))
        .route("/:user_id/revoke", post(permissions::revoke_permission))
        .route("/:user_id/promote", post(permissions::promote))
        .route("/:user_id/check", post(permissions::check_permission));

    Router::new()
        .merge(provisioning_routes)
        .nest("/permissions", permission_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
