//! Git-forge checkers: GitHub, Gitee and GitLab.
//!
//! The three forges differ only in URL parsing, endpoint layout, header
//! policy and priority, so a single [`ForgeChecker`] carries a small
//! [`ForgeKind`] record instead of three near-identical implementations.
//! All of them try the latest-release endpoint first and fall back to the
//! tag list, taking the newest tag.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::checker::error::CheckError;
use crate::checker::traits::UpstreamChecker;
use crate::version;

static GITHUB_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"github\.com/([^/]+)/([^/]+)").unwrap());
static GITEE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"gitee\.com/([^/]+)/([^/]+)").unwrap());
static GITLAB_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://[^/]+)/([^/]+)/([^/]+?)(?:\.git)?/?$").unwrap());

#[derive(Debug, Deserialize)]
struct ForgeRelease {
    tag_name: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ForgeTag {
    name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeKind {
    GitHub,
    Gitee,
    GitLab,
}

impl ForgeKind {
    fn name(self) -> &'static str {
        match self {
            ForgeKind::GitHub => "github",
            ForgeKind::Gitee => "gitee",
            ForgeKind::GitLab => "gitlab",
        }
    }

    fn priority(self) -> u8 {
        match self {
            ForgeKind::GitHub => 80,
            ForgeKind::Gitee | ForgeKind::GitLab => 70,
        }
    }

    fn default_api_base(self) -> &'static str {
        match self {
            ForgeKind::GitHub => "https://api.github.com",
            ForgeKind::Gitee => "https://gitee.com/api/v5",
            // GitLab derives its base from the project URL to support
            // self-hosted installs.
            ForgeKind::GitLab => "",
        }
    }
}

pub struct ForgeChecker {
    kind: ForgeKind,
    client: reqwest::Client,
    api_base: String,
}

impl ForgeChecker {
    pub fn github() -> Self {
        Self::with_api_base(ForgeKind::GitHub, ForgeKind::GitHub.default_api_base())
    }

    pub fn gitee() -> Self {
        Self::with_api_base(ForgeKind::Gitee, ForgeKind::Gitee.default_api_base())
    }

    pub fn gitlab() -> Self {
        Self::with_api_base(ForgeKind::GitLab, ForgeKind::GitLab.default_api_base())
    }

    /// Build against an explicit API base; tests point this at a local mock.
    pub fn with_api_base(kind: ForgeKind, api_base: &str) -> Self {
        // GitHub rejects requests without a User-Agent; the header does no
        // harm on the other forges.
        let client = reqwest::Client::builder()
            .user_agent("aurwatch")
            .build()
            .expect("failed to create HTTP client");
        Self {
            kind,
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Split a project URL into owner and repo (plus the API base for
    /// GitLab, which keeps its host).
    fn parse_url(&self, url: &str) -> Result<(String, String, String), CheckError> {
        match self.kind {
            ForgeKind::GitHub | ForgeKind::Gitee => {
                let pattern: &Regex = match self.kind {
                    ForgeKind::GitHub => &GITHUB_URL,
                    _ => &GITEE_URL,
                };
                let caps = pattern
                    .captures(url)
                    .ok_or_else(|| CheckError::InvalidUrl(url.to_string()))?;
                let owner = caps.get(1).unwrap().as_str().to_string();
                let repo = caps
                    .get(2)
                    .unwrap()
                    .as_str()
                    .trim_end_matches(".git")
                    .to_string();
                Ok((self.api_base.clone(), owner, repo))
            }
            ForgeKind::GitLab => {
                let caps = GITLAB_URL
                    .captures(url)
                    .ok_or_else(|| CheckError::InvalidUrl(url.to_string()))?;
                let host = caps.get(1).unwrap().as_str().to_string();
                let owner = caps.get(2).unwrap().as_str().to_string();
                let repo = caps.get(3).unwrap().as_str().to_string();
                let base = if self.api_base.is_empty() {
                    host
                } else {
                    self.api_base.clone()
                };
                Ok((base, owner, repo))
            }
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CheckError> {
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

        response.json::<T>().await.map_err(|e| CheckError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn latest_release_tag(
        &self,
        base: &str,
        owner: &str,
        repo: &str,
        version_ref: &str,
    ) -> Result<String, CheckError> {
        match self.kind {
            ForgeKind::GitHub | ForgeKind::Gitee => {
                let url = format!("{base}/repos/{owner}/{repo}/releases/latest");
                let release: ForgeRelease = self.fetch_json(&url).await?;
                Ok(release.tag_name)
            }
            ForgeKind::GitLab => {
                // GitLab has no latest-release endpoint; the project path is
                // percent-escaped into a single component.
                let url = format!("{base}/api/v4/projects/{owner}%2F{repo}/releases");
                let releases: Vec<ForgeRelease> = self.fetch_json(&url).await?;
                if releases.is_empty() {
                    return Err(CheckError::NotFound(url));
                }
                // A supplied version reference picks the matching release;
                // otherwise the first listed is the newest.
                let chosen = releases
                    .iter()
                    .find(|r| {
                        !version_ref.is_empty()
                            && (r.tag_name == version_ref || r.name == version_ref)
                    })
                    .unwrap_or(&releases[0]);
                Ok(chosen.tag_name.clone())
            }
        }
    }

    async fn latest_tag(&self, base: &str, owner: &str, repo: &str) -> Result<String, CheckError> {
        let url = match self.kind {
            ForgeKind::GitHub | ForgeKind::Gitee => format!("{base}/repos/{owner}/{repo}/tags"),
            ForgeKind::GitLab => {
                format!("{base}/api/v4/projects/{owner}%2F{repo}/repository/tags")
            }
        };
        let tags: Vec<ForgeTag> = self.fetch_json(&url).await?;
        tags.into_iter()
            .next()
            .map(|t| t.name)
            .ok_or_else(|| CheckError::NotFound(url))
    }

    /// Apply the extract key (a regex, capture group 1 preferred) to the raw
    /// tag, then normalize.
    fn finish(
        &self,
        url: &str,
        raw_tag: &str,
        extract_key: &str,
        check_test_version: bool,
    ) -> Result<String, CheckError> {
        let raw = if extract_key.is_empty() {
            raw_tag.to_string()
        } else {
            let pattern = Regex::new(extract_key).map_err(|e| {
                CheckError::Configuration(format!("invalid extract key regex: {e}"))
            })?;
            let caps = pattern.captures(raw_tag).ok_or_else(|| CheckError::Parse {
                url: url.to_string(),
                message: format!("extract key '{extract_key}' did not match tag '{raw_tag}'"),
            })?;
            caps.get(1)
                .unwrap_or_else(|| caps.get(0).unwrap())
                .as_str()
                .to_string()
        };

        let normalized = version::clean(&raw, check_test_version);
        if normalized.is_empty() {
            return Err(CheckError::Parse {
                url: url.to_string(),
                message: format!("tag '{raw}' did not normalize to a version"),
            });
        }
        Ok(normalized)
    }
}

#[async_trait::async_trait]
impl UpstreamChecker for ForgeChecker {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn supports(&self, url: &str) -> bool {
        match self.kind {
            ForgeKind::GitHub => GITHUB_URL.is_match(url),
            ForgeKind::Gitee => GITEE_URL.is_match(url),
            ForgeKind::GitLab => {
                url.to_ascii_lowercase().contains("gitlab") && GITLAB_URL.is_match(url)
            }
        }
    }

    fn priority(&self) -> u8 {
        self.kind.priority()
    }

    async fn check_with_version_ref(
        &self,
        url: &str,
        extract_key: &str,
        version_ref: &str,
        check_test_version: bool,
    ) -> Result<String, CheckError> {
        let (base, owner, repo) = self.parse_url(url)?;

        match self
            .latest_release_tag(&base, &owner, &repo, version_ref)
            .await
        {
            Ok(tag) => self.finish(url, &tag, extract_key, check_test_version),
            Err(release_err) => {
                debug!(
                    checker = self.name(),
                    url,
                    error = %release_err,
                    "release lookup failed, falling back to tags"
                );
                let tag = self.latest_tag(&base, &owner, &repo).await.map_err(|tag_err| {
                    warn!(
                        checker = self.name(),
                        url,
                        release_error = %release_err,
                        tags_error = %tag_err,
                        "all lookup methods failed"
                    );
                    tag_err
                })?;
                self.finish(url, &tag, extract_key, check_test_version)
            }
        }
    }
}
