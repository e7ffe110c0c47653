//! AUR RPC client: fetches packaging-side versions for monitored packages.
//!
//! Uses the v5 info endpoint, which accepts multiple `arg[]` parameters, so
//! a whole catalog refresh is one request. Transient failures are retried
//! with a doubling delay.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::checker::CheckError;

const DEFAULT_BASE_URL: &str = "https://aur.archlinux.org";

const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct AurResponse {
    #[serde(default)]
    resultcount: usize,
    #[serde(default)]
    results: Vec<AurPackage>,
}

/// The subset of AUR package metadata the watcher consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct AurPackage {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "FirstSubmitted", default)]
    pub first_submitted: i64,
    #[serde(rename = "LastModified", default)]
    pub last_modified: i64,
}

impl AurPackage {
    /// Split the full AUR version into `pkgver` and `pkgrel`. The format is
    /// `[epoch:]pkgver-pkgrel`: any epoch prefix is dropped first, then the
    /// remainder splits on the last hyphen (`1:2.3.4-1` → `("2.3.4", "1")`).
    pub fn split_version(&self) -> (String, String) {
        Self::split_full_version(&self.version)
    }

    /// [`split_version`](Self::split_version) over a raw version string.
    pub fn split_full_version(version: &str) -> (String, String) {
        let without_epoch = match version.split_once(':') {
            Some((_, rest)) => rest,
            None => version,
        };
        match without_epoch.rsplit_once('-') {
            Some((pkgver, pkgrel)) => (pkgver.to_string(), pkgrel.to_string()),
            None => (without_epoch.to_string(), String::new()),
        }
    }

    pub fn first_submitted_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.first_submitted, 0).single()
    }

    pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.last_modified, 0).single()
    }
}

pub struct AurClient {
    client: reqwest::Client,
    base_url: String,
}

impl AurClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("aurwatch")
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch info for one package, retrying transient failures.
    pub async fn package_info(&self, name: &str) -> Result<AurPackage, CheckError> {
        let mut delay = INITIAL_RETRY_DELAY;
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!(name, attempt, "retrying AUR info request");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }

            match self.packages_info(&[name.to_string()]).await {
                Ok(mut packages) if !packages.is_empty() => return Ok(packages.remove(0)),
                Ok(_) => {
                    return Err(CheckError::NotFound(format!("package '{name}' not in AUR")))
                }
                Err(err) if err.is_retryable() => {
                    warn!(name, error = %err, "AUR info request failed");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error
            .unwrap_or_else(|| CheckError::NotFound(format!("package '{name}' not in AUR"))))
    }

    /// Batch info query. Missing packages are simply absent from the result
    /// list; the caller matches by name.
    pub async fn packages_info(&self, names: &[String]) -> Result<Vec<AurPackage>, CheckError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut url = format!("{}/rpc/?v=5&type=info", self.base_url);
        for name in names {
            url.push_str("&arg[]=");
            url.push_str(name);
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CheckError::from_reqwest(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::from_status(&url, status.as_u16()));
        }

        let parsed: AurResponse = response.json().await.map_err(|e| CheckError::Parse {
            url: url.clone(),
            message: e.to_string(),
        })?;

        debug!(
            requested = names.len(),
            found = parsed.resultcount,
            "AUR batch info fetched"
        );
        Ok(parsed.results)
    }
}

impl Default for AurClient {
    fn default() -> Self {
        Self::new()
    }
}
