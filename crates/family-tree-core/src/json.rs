//! Recovery of JSON values from completion output.
//!
//! Completion models often wrap their answer in a markdown code fence
//! (```` ```json ... ``` ````) or sprinkle stray backticks around it. The
//! text is tried as-is first; only on failure are the fence markers
//! stripped and the parse retried. A second failure is a
//! [`FamilyError::Parse`] carrying the untouched text.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::FamilyError;

/// Parses `raw` as JSON, tolerating markdown code fences.
pub fn recover_json(raw: &str) -> Result<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Ok(value);
    }

    let cleaned = strip_fences(raw);
    if cleaned.is_empty() {
        return Err(FamilyError::Parse {
            message: "completion output is empty".to_string(),
            raw: raw.to_string(),
        }
        .into());
    }

    serde_json::from_str::<Value>(&cleaned).map_err(|e| {
        FamilyError::Parse {
            message: e.to_string(),
            raw: raw.to_string(),
        }
        .into()
    })
}

/// Like [`recover_json`], then deserializes into `T`. A shape mismatch is
/// also reported as a parse failure with the raw text.
pub fn recover_as<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let value = recover_json(raw)?;
    serde_json::from_value(value).map_err(|e| {
        FamilyError::Parse {
            message: e.to_string(),
            raw: raw.to_string(),
        }
        .into()
    })
}

/// Removes a leading ```` ``` ```` (with optional `json` tag), a trailing
/// ```` ``` ````, then at most one stray backtick at each end. Backticks
/// inside the payload are kept.
pub fn strip_fences(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        text = rest;
        if text.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
            text = &text[4..];
        }
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    text = text.trim();
    text = text.strip_prefix('`').unwrap_or(text);
    text = text.strip_suffix('`').unwrap_or(text);
    text.trim().to_string()
}
