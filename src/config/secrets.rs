use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::AppError;

/// KV secret envelope: the interesting keys live under `data`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Storage credentials as stored in the secret store.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSecret {
    pub username: String,
    pub password: String,
    /// Location of the database. For SQLite this is the database file path.
    pub host: String,
}

impl StorageSecret {
    /// SQLite has no authentication: only `host` reaches the URL.
    pub fn connection_url(&self) -> String {
        let host = self.host.trim();
        if host.starts_with("sqlite:") {
            host.to_string()
        } else {
            format!("sqlite://{host}")
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceKeySecret {
    pub password: String,
}

/// Decodes a secret payload against `T`, failing with the path of the first missing or
/// mistyped key.
pub fn decode_secret<T: DeserializeOwned>(payload: &Value) -> Result<T, AppError> {
    let envelope: Envelope<T> = serde_path_to_error::deserialize(payload).map_err(|err| {
        AppError::configuration(format!("secret payload invalid at `{}`: {}", err.path(), err.inner()))
    })?;
    Ok(envelope.data)
}

pub fn read_secret_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, AppError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|err| AppError::configuration(format!("cannot read secret file {}: {err}", path.display())))?;
    let payload: Value = serde_json::from_str(&raw)
        .map_err(|err| AppError::configuration(format!("secret file {} is not JSON: {err}", path.display())))?;
    decode_secret(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_expected_keys() {
        let secret: ServiceKeySecret = decode_secret(&json!({"data": {"password": "k"}})).unwrap();
        assert_eq!(secret.password, "k");
    }

    #[test]
    fn storage_secret_composes_url() {
        let secret: StorageSecret = decode_secret(&json!({
            "data": {"username": "perm", "password": "pw", "host": "/var/lib/perms/perms.db"}
        }))
        .unwrap();
        assert_eq!(secret.username, "perm");
        assert_eq!(secret.connection_url(), "sqlite:///var/lib/perms/perms.db");

        let secret: StorageSecret = decode_secret(&json!({
            "data": {"username": "perm", "password": "pw", "host": "sqlite::memory:"}
        }))
        .unwrap();
        assert_eq!(secret.connection_url(), "sqlite::memory:");
    }

    #[test]
    fn missing_host_is_named() {
        let err = decode_secret::<StorageSecret>(&json!({"data": {"username": "perm", "password": "pw"}}))
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        let message = err.to_string();
        assert!(message.contains("host"), "{message}");
    }

    #[test]
    fn missing_envelope_fails() {
        let err = decode_secret::<ServiceKeySecret>(&json!({"password": "k"})).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn wrong_type_reports_path() {
        let err = decode_secret::<ServiceKeySecret>(&json!({"data": {"password": 42}})).unwrap_err();
        assert!(err.to_string().contains("data.password"), "{err}");
    }
}
