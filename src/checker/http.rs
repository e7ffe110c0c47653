//! General HTML checker with single-page-application heuristics.
//!
//! Fetches the page with browser-like headers, detects SPA shells and
//! probes them for embedded state blobs before extraction. The extract key
//! is a literal substring; `a&b` combined keys require every part inside a
//! sliding window around the first.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::checker::error::CheckError;
use crate::checker::extract;
use crate::checker::traits::UpstreamChecker;
use crate::version;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Window radius around a literal key occurrence.
const KEY_RADIUS: usize = 50;

const SPA_MARKERS: &[&str] = &["<div id=\"app\"", "angular", "react", "vue"];

/// Probes for data embedded in an SPA shell, tried in order.
static SPA_PROBES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?s)<script[^>]*>\s*window\.__INITIAL_STATE__\s*=\s*(\{.+?\});?\s*</script>",
        r"(?s)<script[^>]*>\s*var\s+\w+\s*=\s*(\{.+?\});?\s*</script>",
        r#"apiUrl\s*[:=]\s*["']([^"']+)["']"#,
        r#"version\s*[:=]\s*["'](\d+\.\d+\.\d+)["']"#,
        r"(?s)download[_-]?url[^>]*>.*?(\d+\.\d+\.\d+).*?</",
        r"(Linux|信创)[^<]{0,100}?(\d+\.\d+\.\d+)",
        r"(Linux|信创)[^<]*?([\d.]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_content(&self, url: &str) -> Result<String, CheckError> {
        // SPA routes live behind `#`; the server only ever sees the base URL.
        let base_url = url.split('#').next().unwrap_or(url);

        let response = self
            .client
            .get(base_url)
            .header("User-Agent", BROWSER_UA)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.8")
            .send()
            .await
            .map_err(|e| CheckError::from_reqwest(base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::from_status(base_url, status.as_u16()));
        }

        let content = response.text().await.map_err(|e| CheckError::Parse {
            url: base_url.to_string(),
            message: e.to_string(),
        })?;

        let is_spa = SPA_MARKERS.iter().any(|m| content.contains(m));
        if is_spa {
            debug!(url = base_url, "page looks like a single-page application");
            if let Some(embedded) = Self::probe_spa_shell(&content) {
                return Ok(embedded);
            }
            warn!(url = base_url, "no embedded data found in SPA shell, using raw HTML");
        }

        Ok(content)
    }

    /// Mine an SPA shell for embedded state or version-bearing fragments.
    fn probe_spa_shell(html: &str) -> Option<String> {
        for (i, probe) in SPA_PROBES.iter().enumerate() {
            if let Some(caps) = probe.captures(html) {
                let matched = caps
                    .get(caps.len() - 1)
                    .unwrap_or_else(|| caps.get(0).unwrap());
                debug!(probe = i, "SPA probe matched");
                return Some(matched.as_str().to_string());
            }
        }
        None
    }

    /// Collect extraction contexts for the key and pick the greatest version
    /// found in any of them. Also the entry point for the headless checker,
    /// which feeds a rendered DOM through the same pipeline.
    pub(crate) fn extract_from_content(
        url: &str,
        content: &str,
        key: &str,
        check_test_version: bool,
    ) -> Result<String, CheckError> {
        let contexts: Vec<&str> = if key.contains('&') {
            let parts: Vec<&str> = key.split('&').collect();
            extract::find_combined_keys(content, &parts)
        } else {
            extract::find_key_positions(content, key)
                .into_iter()
                .map(|pos| extract::context_window(content, pos, pos + key.len(), KEY_RADIUS))
                .collect()
        };

        if contexts.is_empty() {
            return Err(CheckError::Parse {
                url: url.to_string(),
                message: format!("extract key '{key}' not found in page content"),
            });
        }

        let candidates: Vec<String> = contexts
            .iter()
            .map(|c| extract::extract_version(c))
            .filter(|v| !v.is_empty())
            .collect();

        if candidates.is_empty() {
            return Err(CheckError::Parse {
                url: url.to_string(),
                message: "no version found near the extract key".to_string(),
            });
        }

        let best = extract::latest_version(&candidates, check_test_version);
        let normalized = version::clean(&best, check_test_version);
        if normalized.is_empty() {
            return Err(CheckError::Parse {
                url: url.to_string(),
                message: format!("candidate '{best}' did not normalize"),
            });
        }
        Ok(normalized)
    }
}

impl Default for HttpChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UpstreamChecker for HttpChecker {
    fn name(&self) -> &'static str {
        "http"
    }

    fn supports(&self, url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }

    fn priority(&self) -> u8 {
        50
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
                "http checker requires a version extract key".to_string(),
            ));
        }

        let content = self.fetch_content(url).await?;
        Self::extract_from_content(url, &content, extract_key, check_test_version)
    }
}
