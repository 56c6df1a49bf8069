use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::openapi::server::Server;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::models::permission;
use crate::routes::permissions as handlers;

#[derive(OpenApi)]
#[openapi(
	paths(
		handlers::create_owner,
		handlers::create_user,
		handlers::create_leader,
		handlers::get_permissions,
		handlers::update_permissions,
		handlers::grant_permission,
		handlers::revoke_permission,
		handlers::promote,
		handlers::check_permission,
		handlers::multi_check
	),
	components(
		schemas(
			permission::Permission,
			permission::PermissionRecord,
			permission::RoleTier,
			permission::CreateUserRequest,
			permission::UpdatePermissionsRequest,
			permission::PromoteRequest,
			permission::BatchCheckItem,
			permission::BatchCheckRequest,
			permission::BatchCheckResponse,
			permission::CheckedPermission,
			permission::CheckResponse,
			permission::PermissionListResponse
		)
	),
	modifiers(&ServiceKeyAddon),
	tags(
		(name = "Provisioning", description = "Initial permission sets per role tier"),
		(name = "Permissions", description = "Read and modify a user's permission record"),
		(name = "Checks", description = "Authorization decisions")
	)
)]
pub struct ApiDoc;

struct ServiceKeyAddon;

impl Modify for ServiceKeyAddon {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		let components = openapi.components.get_or_insert_with(Default::default);
		components.add_security_scheme(
			"apiKey",
			SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-KEY"))),
		);
	}
}

pub fn build_openapi(port: u16) -> utoipa::openapi::OpenApi {
	let mut doc = ApiDoc::openapi();
	doc.servers = Some(vec![Server::new(format!("http://localhost:{port}"))]);
	doc
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}
