//! Signed upload parameters for the image host.
//!
//! The host's signing scheme: sort the signed parameters, join them as
//! `key=value` with `&`, append the API secret, and take the lowercase
//! hex SHA-1. Only `public_id` and `timestamp` are signed here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use family_tree_core::error::FamilyError;

use crate::config::UploadsConfig;

/// Body of `POST /cloudinary-signature`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureRequest {
    #[serde(default)]
    pub public_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSignature {
    pub signature: String,
    pub timestamp: i64,
    pub api_key: String,
    pub cloud_name: String,
}

pub fn sign_params(to_sign: &str, secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn sign_upload(
    uploads: &UploadsConfig,
    secret: &str,
    public_id: Option<&str>,
    timestamp: i64,
) -> Result<UploadSignature> {
    let public_id = public_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| FamilyError::validation("public_id", "public_id is required"))?;

    let to_sign = format!("public_id={}&timestamp={}", public_id, timestamp);
    Ok(UploadSignature {
        signature: sign_params(&to_sign, secret),
        timestamp,
        api_key: uploads.api_key.clone(),
        cloud_name: uploads.cloud_name.clone(),
    })
}

/// Signs with the current time and the secret from the configured
/// environment variable.
pub fn sign_now(uploads: Option<&UploadsConfig>, public_id: Option<&str>) -> Result<UploadSignature> {
    let uploads = uploads.context("uploads are not configured: add an [uploads] section")?;
    let secret = std::env::var(&uploads.api_secret_env)
        .with_context(|| format!("{} environment variable not set", uploads.api_secret_env))?;
    sign_upload(uploads, &secret, public_id, chrono::Utc::now().timestamp())
}
