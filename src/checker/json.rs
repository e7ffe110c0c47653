//! JSON endpoint checker.
//!
//! The extract key is a period-separated path into the response document
//! (`data.release.version`). Numeric leaves are stringified and composite
//! leaves re-serialized, so a path may also land on a blob a downstream
//! consumer parses further.

use serde_json::Value;
use tracing::debug;

use crate::checker::error::CheckError;
use crate::checker::traits::UpstreamChecker;
use crate::version;

pub struct JsonChecker {
    client: reqwest::Client,
}

impl JsonChecker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn value_at_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
        let mut current = root;
        for key in path.split('.') {
            current = current.as_object()?.get(key)?;
        }
        Some(current)
    }

    fn render_leaf(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        }
    }
}

impl Default for JsonChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UpstreamChecker for JsonChecker {
    fn name(&self) -> &'static str {
        "json"
    }

    fn supports(&self, url: &str) -> bool {
        url.ends_with(".json") || url.contains("/api/")
    }

    fn priority(&self) -> u8 {
        55
    }

    async fn check_with_version_ref(
        &self,
        url: &str,
        extract_key: &str,
        _version_ref: &str,
        check_test_version: bool,
    ) -> Result<String, CheckError> {
        if extract_key.is_empty() {
            return Err(CheckError::Configuration(
                "json checker requires a version extract key".to_string(),
            ));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CheckError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::from_status(url, status.as_u16()));
        }

        let document: Value = response.json().await.map_err(|e| CheckError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let leaf = Self::value_at_path(&document, extract_key).ok_or_else(|| CheckError::Parse {
            url: url.to_string(),
            message: format!("path '{extract_key}' does not exist in the response"),
        })?;

        let raw = Self::render_leaf(leaf);
        debug!(url, path = extract_key, raw, "json leaf resolved");

        let normalized = version::clean(&raw, check_test_version);
        if normalized.is_empty() {
            return Err(CheckError::Parse {
                url: url.to_string(),
                message: format!("value '{raw}' at '{extract_key}' did not normalize"),
            });
        }
        Ok(normalized)
    }
}
