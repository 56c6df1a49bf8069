use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::errors::AppError;

const FINGERPRINT_LEN: usize = 12;

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Short SHA-256 prefix of a secret, safe to put in logs.
pub fn key_fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(FINGERPRINT_LEN);
    encoded
}

pub fn require_user_id(user_id: &str) -> Result<(), AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::validation("missing user-id"));
    }
    Ok(())
}
