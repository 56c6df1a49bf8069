use serde_json::Value;

#[test]
fn openapi_has_permission_record_fields() -> anyhow::Result<()> {
    // Build the OpenAPI document the same way the server does
    let doc = permission_service::docs::build_openapi(8000);
    let v = serde_json::to_value(&doc)?;

    let props = v
        .get("components")
        .and_then(Value::as_object)
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object)
        .and_then(|s| s.get("PermissionRecord"))
        .and_then(Value::as_object)
        .and_then(|t| t.get("properties"))
        .and_then(Value::as_object)
        .expect("components.schemas.PermissionRecord.properties must exist");

    for k in ["user_id", "generated", "permissions"] {
        assert!(props.contains_key(k), "OpenAPI PermissionRecord schema missing '{}'", k);
    }
    assert!(!props.contains_key("version"), "store revision must not be part of the document");

    Ok(())
}
