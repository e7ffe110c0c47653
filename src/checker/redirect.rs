//! Redirect checker: issues a GET without following redirects and reads the
//! version out of the `Location` target.
//!
//! Useful for `/latest`-style download endpoints that 302 to a versioned
//! artifact URL.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::checker::error::CheckError;
use crate::checker::traits::UpstreamChecker;
use crate::version;

const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Extensions stripped from path segments before version matching.
const STRIP_EXTENSIONS: &[&str] = &[
    ".exe", ".msi", ".dmg", ".pkg", ".deb", ".rpm", ".tar.gz", ".zip", ".bin", ".php",
];

/// Ranked patterns applied to each path segment of the redirect target.
static SEGMENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d+\.\d+\.\d+)",
        r"v(\d+\.\d+\.\d+)",
        r"version-(\d+\.\d+\.\d+)",
        r"(\d+\.\d+)",
        r"v(\d+\.\d+)",
        r"version-(\d+\.\d+)",
        r"-(\d+\.\d+\.\d+)-",
        r"-(\d+\.\d+)-",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static SEGMENT_IS_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v?\d+\.\d+(\.\d+)?([a-zA-Z]+\d*)?$").unwrap());

pub struct RedirectChecker {
    client: reqwest::Client,
}

impl RedirectChecker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("failed to create HTTP client"),
        }
    }

    async fn fetch_location(&self, url: &str, accept: &str) -> Result<Option<String>, CheckError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", BROWSER_UA)
            .header("Accept", accept)
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .map_err(|e| CheckError::from_reqwest(url, e))?;

        let status = response.status().as_u16();
        if status == 301 || status == 302 {
            let location = response
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| CheckError::Parse {
                    url: url.to_string(),
                    message: "redirect response carried no Location header".to_string(),
                })?;
            return Ok(Some(location));
        }
        if status == 406 {
            return Ok(None);
        }
        Err(CheckError::Http {
            url: url.to_string(),
            status,
        })
    }

    /// Extract a version from the redirect target. With a key, the trailing
    /// version-like run after the key wins; without one, every path segment
    /// is mined for candidates and the greatest is returned.
    fn version_from_target(
        url: &str,
        target: &str,
        key: &str,
        check_test_version: bool,
    ) -> Result<String, CheckError> {
        if !key.is_empty() {
            if let Some(index) = target.find(key) {
                let mut after = &target[index + key.len()..];
                if let Some(first) = after.chars().next() {
                    if !first.is_ascii_alphanumeric() {
                        after = &after[first.len_utf8()..];
                    }
                }
                let run: String = after
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+'))
                    .collect();
                if !run.is_empty() {
                    let normalized = version::clean(&run, check_test_version);
                    if !normalized.is_empty() {
                        return Ok(normalized);
                    }
                }
            }
            return Err(CheckError::Parse {
                url: url.to_string(),
                message: format!("no version after key '{key}' in redirect target"),
            });
        }

        let mut candidates = Vec::new();
        for segment in target.split('/') {
            let mut segment = segment.split('?').next().unwrap_or(segment).to_string();
            for ext in STRIP_EXTENSIONS {
                if let Some(stripped) = segment.strip_suffix(ext) {
                    segment = stripped.to_string();
                    break;
                }
            }
            for pattern in SEGMENT_PATTERNS.iter() {
                if let Some(caps) = pattern.captures(&segment) {
                    candidates.push(caps.get(1).unwrap().as_str().to_string());
                }
            }
            if SEGMENT_IS_VERSION.is_match(&segment) {
                candidates.push(segment);
            }
        }

        if candidates.is_empty() {
            return Err(CheckError::Parse {
                url: url.to_string(),
                message: "no version candidates in redirect target".to_string(),
            });
        }
        debug!(target, count = candidates.len(), "redirect candidates");

        let best = crate::checker::extract::latest_version(&candidates, check_test_version);
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

impl Default for RedirectChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UpstreamChecker for RedirectChecker {
    fn name(&self) -> &'static str {
        "redirect"
    }

    fn supports(&self, url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }

    fn priority(&self) -> u8 {
        60
    }

    async fn check_with_version_ref(
        &self,
        url: &str,
        extract_key: &str,
        _version_ref: &str,
        check_test_version: bool,
    ) -> Result<String, CheckError> {
        let location = match self
            .fetch_location(url, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .await?
        {
            Some(location) => location,
            // 406: retry once with a permissive Accept header.
            None => self
                .fetch_location(url, "*/*")
                .await?
                .ok_or_else(|| CheckError::Http {
                    url: url.to_string(),
                    status: 406,
                })?,
        };

        Self::version_from_target(url, &location, extract_key, check_test_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn version_is_read_from_the_location_header() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/latest")
            .with_status(302)
            .with_header("location", "https://cdn.example.com/app/2.14.1/app-2.14.1.deb")
            .create_async()
            .await;

        let checker = RedirectChecker::new();
        let version = checker
            .check_with_version_ref(&format!("{}/latest", server.url()), "", "", false)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(version, "2.14.1");
    }

    #[tokio::test]
    async fn http_406_is_retried_with_a_permissive_accept() {
        let mut server = Server::new_async().await;
        let strict = server
            .mock("GET", "/latest")
            .match_header("accept", mockito::Matcher::Regex("text/html.*".into()))
            .with_status(406)
            .create_async()
            .await;
        let permissive = server
            .mock("GET", "/latest")
            .match_header("accept", "*/*")
            .with_status(302)
            .with_header("location", "https://cdn.example.com/v3.2.0/pkg.zip")
            .create_async()
            .await;

        let checker = RedirectChecker::new();
        let version = checker
            .check_with_version_ref(&format!("{}/latest", server.url()), "", "", false)
            .await
            .unwrap();

        strict.assert_async().await;
        permissive.assert_async().await;
        assert_eq!(version, "3.2.0");
    }

    #[tokio::test]
    async fn non_redirect_status_is_an_error() {
        let mut server = Server::new_async().await;
        server.mock("GET", "/latest").with_status(200).create_async().await;

        let checker = RedirectChecker::new();
        let result = checker
            .check_with_version_ref(&format!("{}/latest", server.url()), "", "", false)
            .await;
        assert!(matches!(result, Err(CheckError::Http { status: 200, .. })));
    }

    #[test]
    fn key_anchored_extraction_takes_the_trailing_run() {
        let version = RedirectChecker::version_from_target(
            "u",
            "https://dl.example.com/myapp-6.0.2-linux.tar.gz",
            "myapp",
            false,
        )
        .unwrap();
        assert_eq!(version, "6.0.2");
    }

    #[test]
    fn segment_extraction_picks_the_greatest_candidate() {
        let version = RedirectChecker::version_from_target(
            "u",
            "https://cdn.example.com/2.9/artifacts/2.10.1/app.deb",
            "",
            false,
        )
        .unwrap();
        assert_eq!(version, "2.10.1");
    }
}
