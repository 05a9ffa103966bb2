//! Single-payload fetch: pull one JSON document from an API endpoint and
//! store its `data` member under a fixed key.
//!
//! Independent of the reconciler. The payload is always written; there is
//! no fingerprint comparison on this path.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use ureq::Agent;
use url::Url;

use mirror_core::Fingerprint;

use crate::digest;
use crate::error::{io_err, SyncError};
use crate::http;
use crate::store::ObjectStore;

/// Result of a payload fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadOutcome {
    pub key: String,
    pub fingerprint: Fingerprint,
    pub bytes: u64,
}

/// Fetch `api_url`, extract its `data` member and put it under `key`.
pub fn fetch_payload(
    agent: &Agent,
    api_url: &Url,
    store: &dyn ObjectStore,
    key: &str,
    temp_dir: Option<&Path>,
) -> Result<PayloadOutcome, SyncError> {
    let unreachable = |reason: String| SyncError::PayloadUnreachable {
        url: api_url.to_string(),
        reason,
    };

    let response = agent
        .get(api_url.as_str())
        .call()
        .map_err(|e| unreachable(http::describe(e)))?;
    let body = response
        .into_string()
        .map_err(|e| unreachable(e.to_string()))?;

    let data = extract_data(&body).map_err(|reason| SyncError::PayloadFormat {
        url: api_url.to_string(),
        reason,
    })?;
    let serialized = serde_json::to_vec(&data)?;

    let dir = temp_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    let mut file = tempfile::Builder::new()
        .prefix("mirror-payload-")
        .suffix(".json")
        .tempfile_in(&dir)
        .map_err(|e| io_err(&dir, e))?;
    file.write_all(&serialized)
        .and_then(|()| file.flush())
        .map_err(|e| io_err(file.path(), e))?;

    let fingerprint = digest::md5_bytes(&serialized);
    store.put(key, file.path(), &fingerprint)?;

    tracing::info!(
        url = %api_url,
        key = %key,
        bytes = serialized.len(),
        "stored payload"
    );
    Ok(PayloadOutcome {
        key: key.to_string(),
        fingerprint,
        bytes: serialized.len() as u64,
    })
}

/// Pull the `data` member out of an API response body.
pub fn extract_data(body: &str) -> Result<Value, String> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| format!("response is not JSON: {e}"))?;
    match value {
        Value::Object(mut map) => map
            .remove("data")
            .ok_or_else(|| "response has no `data` member".to_string()),
        other => Err(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
