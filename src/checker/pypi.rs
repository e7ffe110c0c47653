//! PyPI checker.
//!
//! Resolves the project name from the URL (or the extract key), fetches the
//! JSON metadata and prefers `info.version`. The extract key or a supplied
//! version reference may pin a concrete release instead.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::checker::error::CheckError;
use crate::checker::traits::UpstreamChecker;
use crate::version;

const DEFAULT_BASE_URL: &str = "https://pypi.org";

static PROJECT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pypi\.org/project/([^/\s]+)/?").unwrap());
static LEGACY_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pypi\.python\.org/pypi/([^/\s]+)").unwrap());

#[derive(Debug, Deserialize)]
struct PypiInfo {
    version: String,
}

#[derive(Debug, Deserialize)]
struct PypiResponse {
    info: PypiInfo,
    #[serde(default)]
    releases: HashMap<String, serde_json::Value>,
}

pub struct PypiChecker {
    client: reqwest::Client,
    base_url: String,
}

impl PypiChecker {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("aurwatch")
                .build()
                .expect("failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn package_name(url: &str, extract_key: &str) -> Result<String, CheckError> {
        for pattern in [&*PROJECT_PATH, &*LEGACY_PATH] {
            if let Some(caps) = pattern.captures(url) {
                return Ok(caps.get(1).unwrap().as_str().to_string());
            }
        }
        if !extract_key.is_empty() {
            return Ok(extract_key.to_string());
        }
        Err(CheckError::Configuration(format!(
            "cannot derive a PyPI project name from '{url}'"
        )))
    }
}

impl Default for PypiChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UpstreamChecker for PypiChecker {
    fn name(&self) -> &'static str {
        "pypi"
    }

    fn supports(&self, url: &str) -> bool {
        url.contains("pypi.org") || url.contains("pypi.python.org")
    }

    fn priority(&self) -> u8 {
        75
    }

    async fn check_with_version_ref(
        &self,
        url: &str,
        extract_key: &str,
        version_ref: &str,
        check_test_version: bool,
    ) -> Result<String, CheckError> {
        let package = Self::package_name(url, extract_key)?;
        let api_url = format!("{}/pypi/{}/json", self.base_url, package);

        let response = self
            .client
            .get(&api_url)
            .send()
            .await
            .map_err(|e| CheckError::from_reqwest(&api_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::from_status(&api_url, status.as_u16()));
        }

        let info: PypiResponse = response.json().await.map_err(|e| {
            warn!(url = api_url, error = %e, "failed to parse PyPI response");
            CheckError::Parse {
                url: api_url.clone(),
                message: e.to_string(),
            }
        })?;

        let raw = if !version_ref.is_empty() && info.releases.contains_key(version_ref) {
            version_ref.to_string()
        } else if !extract_key.is_empty()
            && extract_key != package
            && info.releases.contains_key(extract_key)
        {
            extract_key.to_string()
        } else {
            info.info.version
        };

        let normalized = version::clean(&raw, check_test_version);
        if normalized.is_empty() {
            return Err(CheckError::Parse {
                url: api_url,
                message: format!("PyPI version '{raw}' did not normalize"),
            });
        }
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn body() -> &'static str {
        r#"{
            "info": {"name": "requests", "version": "2.32.3"},
            "releases": {"2.32.2": [], "2.32.3": []}
        }"#
    }

    #[tokio::test]
    async fn info_version_is_preferred() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/pypi/requests/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body())
            .create_async()
            .await;

        let checker = PypiChecker::with_base_url(&server.url());
        let version = checker
            .check_with_version_ref("https://pypi.org/project/requests/", "", "", false)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(version, "2.32.3");
    }

    #[tokio::test]
    async fn existing_version_ref_pins_the_release() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/pypi/requests/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body())
            .create_async()
            .await;

        let checker = PypiChecker::with_base_url(&server.url());
        let version = checker
            .check_with_version_ref("https://pypi.org/project/requests/", "", "2.32.2", false)
            .await
            .unwrap();
        assert_eq!(version, "2.32.2");
    }

    #[tokio::test]
    async fn missing_project_maps_to_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/pypi/missing/json")
            .with_status(404)
            .create_async()
            .await;

        let checker = PypiChecker::with_base_url(&server.url());
        let result = checker
            .check_with_version_ref("https://pypi.org/project/missing/", "", "", false)
            .await;
        assert!(matches!(result, Err(CheckError::NotFound(_))));
    }

    #[test]
    fn package_name_resolution_handles_both_url_forms() {
        assert_eq!(
            PypiChecker::package_name("https://pypi.org/project/requests/", "").unwrap(),
            "requests"
        );
        assert_eq!(
            PypiChecker::package_name("https://pypi.python.org/pypi/requests", "").unwrap(),
            "requests"
        );
        assert_eq!(
            PypiChecker::package_name("https://example.com", "httpx").unwrap(),
            "httpx"
        );
    }
}
