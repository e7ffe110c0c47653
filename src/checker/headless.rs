//! Chromium-backed checker for pages that only render their version via
//! JavaScript. Last resort after the plain HTTP checkers; requires the
//! `headless` cargo feature and a local Chrome/Chromium binary.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::checker::error::CheckError;
use crate::checker::traits::UpstreamChecker;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct HeadlessChecker {
    timeout: Duration,
    headless: bool,
}

impl HeadlessChecker {
    pub fn new(timeout_seconds: u64, headless: bool) -> Self {
        let timeout = if timeout_seconds == 0 {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            Duration::from_secs(timeout_seconds)
        };
        Self { timeout, headless }
    }

    async fn rendered_content(&self, url: &str) -> Result<String, CheckError> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-first-run")
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .arg("--disable-dev-shm-usage");
        if self.headless {
            builder = builder.arg("--headless=new");
        }
        let config = builder
            .build()
            .map_err(|e| CheckError::Configuration(format!("browser config: {e}")))?;

        let (mut browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            CheckError::Configuration(format!("failed to launch a headless browser: {e}"))
        })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "cdp handler event error");
                }
            }
        });

        let result = tokio::time::timeout(self.timeout, async {
            let page = browser.new_page(url).await.map_err(|e| CheckError::Parse {
                url: url.to_string(),
                message: format!("navigation failed: {e}"),
            })?;
            page.wait_for_navigation().await.map_err(|e| CheckError::Parse {
                url: url.to_string(),
                message: format!("page never settled: {e}"),
            })?;
            page.content().await.map_err(|e| CheckError::Parse {
                url: url.to_string(),
                message: format!("could not read rendered DOM: {e}"),
            })
        })
        .await
        .map_err(|_| CheckError::Timeout(url.to_string()))?;

        if let Err(e) = browser.close().await {
            warn!(error = %e, "failed to close headless browser");
        }
        handler_task.abort();

        result
    }
}

#[async_trait::async_trait]
impl UpstreamChecker for HeadlessChecker {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn supports(&self, url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }

    fn priority(&self) -> u8 {
        70
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
                "headless checker requires a version extract key".to_string(),
            ));
        }

        let content = self.rendered_content(url).await?;
        // The rendered DOM goes through the same extraction pipeline as a
        // plain HTML page.
        crate::checker::http::HttpChecker::extract_from_content(
            url,
            &content,
            extract_key,
            check_test_version,
        )
    }
}
