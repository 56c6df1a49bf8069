//! Service-key validation, delegated to the external key service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::utils::key_fingerprint;

#[async_trait]
pub trait KeyValidator: Send + Sync {
    /// Whether `supplied_key` is valid for `user_id`. Transport failures are `Upstream` errors,
    /// never a `false` verdict.
    async fn validate(&self, user_id: &str, supplied_key: &str) -> AppResult<bool>;
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    user_id: &'a str,
    service_key: &'a str,
    check_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    valid: bool,
}

/// Validator backed by the key service's `POST /validate` endpoint.
#[derive(Debug, Clone)]
pub struct ServiceKeyValidator {
    development: bool,
    service_key: String,
    endpoint: String,
    retries: u32,
    client: reqwest::Client,
}

impl ServiceKeyValidator {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.key_service.timeout)
            .build()
            .map_err(|err| AppError::internal(format!("cannot build key service client: {err}")))?;

        Ok(Self {
            development: config.flags.development,
            service_key: config.service_key.clone(),
            endpoint: format!("{}/validate", config.key_service.address.trim_end_matches('/')),
            retries: config.key_service.retries,
            client,
        })
    }

    async fn call(&self, user_id: &str, supplied_key: &str) -> AppResult<bool> {
        let body = ValidateRequest {
            user_id,
            service_key: &self.service_key,
            check_key: supplied_key,
        };

        let mut attempt = 0;
        let response = loop {
            match self.client.post(&self.endpoint).json(&body).send().await {
                Ok(response) => break response,
                Err(err) if attempt < self.retries => {
                    tracing::warn!(error = %err, attempt, "key service call failed, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(AppError::upstream(format!("key service unreachable: {err}"))),
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::upstream(format!("key service returned {status}")));
        }

        let verdict: ValidateResponse = response
            .json()
            .await
            .map_err(|err| AppError::upstream(format!("invalid key service response: {err}")))?;

        Ok(verdict.valid)
    }
}

#[async_trait]
impl KeyValidator for ServiceKeyValidator {
    async fn validate(&self, user_id: &str, supplied_key: &str) -> AppResult<bool> {
        if self.development {
            tracing::debug!(user_id = %user_id, "development mode, skipping key check");
            return Ok(true);
        }

        let valid = self.call(user_id, supplied_key).await?;
        tracing::debug!(
            user_id = %user_id,
            key = %key_fingerprint(supplied_key),
            valid,
            "service key checked"
        );
        Ok(valid)
    }
}
