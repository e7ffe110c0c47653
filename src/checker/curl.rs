//! Plain-page checker for sites that serve complete HTML without scripting.
//!
//! The extract key is tried as a regex first and as a literal second.
//! Context windows of ±100 characters are collected around every key
//! occurrence; windows mentioning pre-release markers are dropped when test
//! versions are not wanted. The first attempt uses a `curl` user agent and a
//! browser agent is tried once on a non-200 answer.

use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::checker::error::CheckError;
use crate::checker::extract;
use crate::checker::traits::UpstreamChecker;
use crate::version;

const CURL_UA: &str = "curl/8.15.0";
const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Context radius around a key occurrence.
const KEY_RADIUS: usize = 100;

pub struct CurlChecker {
    client: reqwest::Client,
}

impl CurlChecker {
    /// TLS verification defaults to on; `insecure_skip_tls` is a per-config
    /// opt-out for hosts with broken certificate chains.
    pub fn new(insecure_skip_tls: bool) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .danger_accept_invalid_certs(insecure_skip_tls)
            .build()
            .expect("failed to create HTTP client");
        Self { client }
    }

    async fn fetch_with_agent(&self, url: &str, user_agent: &str) -> Result<reqwest::Response, CheckError> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5");

        // SourceForge mirrors refuse requests without a referer.
        if url.contains("sourceforge.net") {
            request = request.header("Referer", "https://sourceforge.net/");
        }

        request
            .send()
            .await
            .map_err(|e| CheckError::from_reqwest(url, e))
    }

    async fn fetch_content(&self, url: &str) -> Result<String, CheckError> {
        let response = self.fetch_with_agent(url, CURL_UA).await?;
        let response = if response.status().is_success() {
            response
        } else {
            warn!(
                url,
                status = response.status().as_u16(),
                "non-200 with curl agent, retrying with a browser agent"
            );
            let retry = self.fetch_with_agent(url, BROWSER_UA).await?;
            if !retry.status().is_success() {
                return Err(CheckError::from_status(url, retry.status().as_u16()));
            }
            retry
        };

        response.text().await.map_err(|e| CheckError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Collect ±100-char context windows around key matches. The key is a
    /// regex when it compiles, a literal otherwise.
    fn collect_contexts<'a>(
        content: &'a str,
        key: &str,
        check_test_version: bool,
    ) -> Vec<&'a str> {
        let spans: Vec<(usize, usize)> = match Regex::new(key) {
            Ok(pattern) => {
                let regex_spans: Vec<(usize, usize)> = pattern
                    .find_iter(content)
                    .map(|m| (m.start(), m.end()))
                    .collect();
                if regex_spans.is_empty() {
                    extract::find_key_positions(content, key)
                        .into_iter()
                        .map(|p| (p, p + key.len()))
                        .collect()
                } else {
                    regex_spans
                }
            }
            Err(_) => extract::find_key_positions(content, key)
                .into_iter()
                .map(|p| (p, p + key.len()))
                .collect(),
        };

        spans
            .into_iter()
            .map(|(start, end)| extract::context_window(content, start, end, KEY_RADIUS))
            .filter(|context| check_test_version || !extract::contains_test_marker(context))
            .collect()
    }
}

#[async_trait::async_trait]
impl UpstreamChecker for CurlChecker {
    fn name(&self) -> &'static str {
        "curl"
    }

    fn supports(&self, url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }

    fn priority(&self) -> u8 {
        40
    }

    async fn check_with_version_ref(
        &self,
        url: &str,
        extract_key: &str,
        version_ref: &str,
        check_test_version: bool,
    ) -> Result<String, CheckError> {
        if extract_key.is_empty() {
            return Err(CheckError::Configuration(
                "curl checker requires a version extract key".to_string(),
            ));
        }

        let content = self.fetch_content(url).await?;

        let contexts = Self::collect_contexts(&content, extract_key, check_test_version);
        if contexts.is_empty() {
            return Err(CheckError::Parse {
                url: url.to_string(),
                message: format!("extract key '{extract_key}' not found in page content"),
            });
        }
        debug!(url, contexts = contexts.len(), "collected extraction contexts");

        let candidates: Vec<String> = contexts
            .iter()
            .map(|c| extract::extract_version(c))
            .filter(|v| !v.is_empty())
            .collect();
        if candidates.is_empty() {
            return Err(CheckError::Parse {
                url: url.to_string(),
                message: "no version found in any extraction context".to_string(),
            });
        }

        // A version reference narrows candidates to the same dotted shape;
        // an empty filter result keeps the full list.
        let filtered = extract::filter_by_version_ref(&candidates, version_ref);
        let pool = if filtered.is_empty() { &candidates } else { &filtered };

        let best = extract::latest_version(pool, check_test_version);
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

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn literal_key_extraction_works_end_to_end() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/downloads")
            .with_status(200)
            .with_body("<li>Stable release: tool-7.3.2.tar.xz (sha256)</li>")
            .create_async()
            .await;

        let checker = CurlChecker::new(false);
        let version = checker
            .check_with_version_ref(&format!("{}/downloads", server.url()), "tool-", "", false)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(version, "7.3.2");
    }

    #[tokio::test]
    async fn browser_agent_retry_kicks_in_on_403() {
        let mut server = Server::new_async().await;
        let curl_attempt = server
            .mock("GET", "/page")
            .match_header("user-agent", mockito::Matcher::Regex("^curl/".into()))
            .with_status(403)
            .create_async()
            .await;
        let browser_attempt = server
            .mock("GET", "/page")
            .match_header("user-agent", mockito::Matcher::Regex("^Mozilla/".into()))
            .with_status(200)
            .with_body("release 4.4.0 notes")
            .create_async()
            .await;

        let checker = CurlChecker::new(false);
        let version = checker
            .check_with_version_ref(&format!("{}/page", server.url()), "release", "", false)
            .await
            .unwrap();

        curl_attempt.assert_async().await;
        browser_attempt.assert_async().await;
        assert_eq!(version, "4.4.0");
    }

    #[test]
    fn key_is_tried_as_a_regex_first() {
        let content = "build v10.1.0 for linux, build v10.2.0 for bsd";
        let contexts = CurlChecker::collect_contexts(content, r"v\d+\.2", false);
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].contains("10.2.0"));
    }

    #[test]
    fn test_version_contexts_are_dropped_when_disallowed() {
        let filler = "y".repeat(250);
        let content = format!("download 2.0.0-beta now {filler} download 1.9.5 stable");
        let with_filter = CurlChecker::collect_contexts(&content, "download", false);
        assert_eq!(with_filter.len(), 1);
        assert!(with_filter[0].contains("1.9.5"));

        let without_filter = CurlChecker::collect_contexts(&content, "download", true);
        assert_eq!(without_filter.len(), 2);
    }

    #[test]
    fn version_ref_narrows_the_candidate_shape() {
        let candidates = vec!["7.3".to_string(), "7.3.2".to_string()];
        let filtered = extract::filter_by_version_ref(&candidates, "a.b");
        assert_eq!(filtered, vec!["7.3".to_string()]);
    }
}
