//! npm registry checker.
//!
//! Resolves the package name from the project URL (or from the extract key
//! when it already names a package), fetches the registry metadata and
//! prefers the `latest` dist-tag. The extract key may instead name another
//! dist-tag or a concrete released version.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::checker::error::CheckError;
use crate::checker::traits::UpstreamChecker;
use crate::version;

/// Registry mirror that serves package metadata without rate limiting.
const DEFAULT_BASE_URL: &str = "https://registry.npmmirror.com";

static PACKAGE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"npmjs\.com/package/([^/\s]+)").unwrap());
static BARE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"npmjs\.com/([^/\s]+)").unwrap());

#[derive(Debug, Deserialize)]
struct NpmPackageResponse {
    #[serde(rename = "dist-tags", default)]
    dist_tags: HashMap<String, String>,
    #[serde(default)]
    versions: HashMap<String, serde_json::Value>,
}

pub struct NpmChecker {
    client: reqwest::Client,
    base_url: String,
}

impl NpmChecker {
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
        if let Some(caps) = PACKAGE_PATH.captures(url) {
            return Ok(caps.get(1).unwrap().as_str().to_string());
        }
        if let Some(caps) = BARE_PATH.captures(url) {
            let name = caps.get(1).unwrap().as_str();
            if Self::is_plausible_package_name(name) {
                return Ok(name.to_string());
            }
        }
        // The URL names no package; the extract key may be the package name
        // itself.
        if !extract_key.is_empty() && Self::is_plausible_package_name(extract_key) {
            return Ok(extract_key.to_string());
        }
        Err(CheckError::Configuration(format!(
            "cannot derive an npm package name from '{url}'"
        )))
    }

    fn is_plausible_package_name(name: &str) -> bool {
        !name.is_empty() && !matches!(name, "package" | "search" | "~")
    }
}

impl Default for NpmChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UpstreamChecker for NpmChecker {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn supports(&self, url: &str) -> bool {
        url.contains("npmjs.com")
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
        let api_url = format!("{}/{}", self.base_url, package);

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

        let info: NpmPackageResponse = response.json().await.map_err(|e| {
            warn!(url = api_url, error = %e, "failed to parse npm registry response");
            CheckError::Parse {
                url: api_url.clone(),
                message: e.to_string(),
            }
        })?;

        // A non-package extract key may still name a dist-tag or a concrete
        // released version; a version reference that exists wins outright.
        let raw = if !version_ref.is_empty() && info.versions.contains_key(version_ref) {
            version_ref.to_string()
        } else if let Some(tagged) = info.dist_tags.get(extract_key) {
            tagged.clone()
        } else if info.versions.contains_key(extract_key) {
            extract_key.to_string()
        } else {
            info.dist_tags
                .get("latest")
                .cloned()
                .ok_or_else(|| CheckError::NotFound(format!("{package} has no latest dist-tag")))?
        };

        let normalized = version::clean(&raw, check_test_version);
        if normalized.is_empty() {
            return Err(CheckError::Parse {
                url: api_url,
                message: format!("npm version '{raw}' did not normalize"),
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
            "name": "lodash",
            "dist-tags": {"latest": "4.17.21", "beta": "5.0.0-beta.1"},
            "versions": {"4.17.20": {}, "4.17.21": {}, "5.0.0-beta.1": {}}
        }"#
    }

    #[tokio::test]
    async fn latest_dist_tag_is_preferred() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/lodash")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body())
            .create_async()
            .await;

        let checker = NpmChecker::with_base_url(&server.url());
        let version = checker
            .check_with_version_ref("https://www.npmjs.com/package/lodash", "", "", false)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(version, "4.17.21");
    }

    #[tokio::test]
    async fn extract_key_can_name_a_dist_tag() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/lodash")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body())
            .create_async()
            .await;

        let checker = NpmChecker::with_base_url(&server.url());
        let version = checker
            .check_with_version_ref("https://www.npmjs.com/package/lodash", "beta", "", true)
            .await
            .unwrap();
        assert_eq!(version, "5.0.0");
    }

    #[tokio::test]
    async fn existing_version_ref_wins() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/lodash")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body())
            .create_async()
            .await;

        let checker = NpmChecker::with_base_url(&server.url());
        let version = checker
            .check_with_version_ref(
                "https://www.npmjs.com/package/lodash",
                "",
                "4.17.20",
                false,
            )
            .await
            .unwrap();
        assert_eq!(version, "4.17.20");
    }

    #[tokio::test]
    async fn missing_package_maps_to_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/nonexistent")
            .with_status(404)
            .create_async()
            .await;

        let checker = NpmChecker::with_base_url(&server.url());
        let result = checker
            .check_with_version_ref("https://www.npmjs.com/package/nonexistent", "", "", false)
            .await;
        assert!(matches!(result, Err(CheckError::NotFound(_))));
    }

    #[test]
    fn package_name_resolution_prefers_the_extract_key() {
        assert_eq!(
            NpmChecker::package_name("https://www.npmjs.com/package/lodash", "").unwrap(),
            "lodash"
        );
        assert_eq!(
            NpmChecker::package_name("https://example.com", "react").unwrap(),
            "react"
        );
        assert!(NpmChecker::package_name("https://example.com", "").is_err());
    }
}
