//! Concurrent checking: a cached single-URL path plus bounded multi-URL
//! fan-out with critical-error supervision.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::{CheckCache, EvictionPolicy};
use crate::checker::{CheckError, CheckerSelector};

/// Deadline for each URL inside a batch.
const BATCH_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default fan-out width for batches.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Per-URL outcome of a batch check.
#[derive(Debug)]
pub struct BatchResult {
    pub url: String,
    pub version: String,
    pub error: Option<CheckError>,
    pub duration: Duration,
}

pub struct ConcurrentChecker {
    selector: Arc<CheckerSelector>,
    cache: CheckCache,
}

impl ConcurrentChecker {
    pub fn new(selector: Arc<CheckerSelector>, cache_ttl: Duration) -> Self {
        Self::with_cache_settings(selector, cache_ttl, 1000, EvictionPolicy::Lru)
    }

    pub fn with_cache_settings(
        selector: Arc<CheckerSelector>,
        cache_ttl: Duration,
        cache_max_size: usize,
        eviction_policy: EvictionPolicy,
    ) -> Self {
        Self {
            selector,
            cache: CheckCache::new(cache_ttl, cache_max_size, eviction_policy),
        }
    }

    /// Check one URL, consulting the cache first. On a miss the selector
    /// picks a checker and the result is cached under the caller's inputs.
    pub async fn check_single(
        &self,
        url: &str,
        extract_key: &str,
        check_test_version: bool,
    ) -> Result<String, CheckError> {
        self.check_single_with_ref(url, extract_key, "", check_test_version)
            .await
    }

    /// Like [`check_single`](Self::check_single) with a version reference
    /// biasing extraction toward a known shape. The cache key ignores the
    /// reference: it is a hint, not an input that changes the target.
    pub async fn check_single_with_ref(
        &self,
        url: &str,
        extract_key: &str,
        version_ref: &str,
        check_test_version: bool,
    ) -> Result<String, CheckError> {
        let cache_key = CheckCache::key(url, extract_key, check_test_version);
        if let Some(version) = self.cache.get(&cache_key) {
            debug!(url, version, "cache hit");
            return Ok(version);
        }

        let selection = self.selector.select(url, extract_key, check_test_version)?;
        let version = selection
            .checker
            .check_with_version_ref(
                url,
                &selection.extract_key,
                version_ref,
                selection.check_test_version,
            )
            .await?;

        self.cache.set(&cache_key, &version);
        Ok(version)
    }

    /// Fan a URL batch out over at most `concurrency` tasks. Every task gets
    /// a 30-second deadline. A critical error from any task cancels the
    /// remaining ones; their slots record a cancellation error.
    pub async fn check_multiple(
        self: &Arc<Self>,
        urls: &[String],
        extract_key: &str,
        check_test_version: bool,
        concurrency: usize,
    ) -> Vec<BatchResult> {
        let concurrency = if concurrency == 0 {
            DEFAULT_CONCURRENCY
        } else {
            concurrency
        };
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let token = CancellationToken::new();
        let (err_tx, mut err_rx) = mpsc::channel::<bool>(urls.len().max(1));

        // Supervisor: the first critical error aborts the whole batch.
        let supervisor_token = token.clone();
        let supervisor = tokio::spawn(async move {
            while let Some(critical) = err_rx.recv().await {
                if critical {
                    error!("critical error in batch, cancelling remaining checks");
                    supervisor_token.cancel();
                    return;
                }
            }
        });

        let mut handles = Vec::with_capacity(urls.len());
        for url in urls {
            let checker = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let token = token.clone();
            let err_tx = err_tx.clone();
            let url = url.clone();
            let extract_key = extract_key.to_string();

            handles.push(tokio::spawn(async move {
                let started = Instant::now();
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    // A closed semaphore means the batch is being torn down.
                    Err(_) => {
                        return BatchResult {
                            url: url.clone(),
                            version: String::new(),
                            error: Some(CheckError::Cancelled(url)),
                            duration: started.elapsed(),
                        };
                    }
                };

                if token.is_cancelled() {
                    return BatchResult {
                        url: url.clone(),
                        version: String::new(),
                        error: Some(CheckError::Cancelled(url)),
                        duration: started.elapsed(),
                    };
                }

                let outcome = tokio::select! {
                    _ = token.cancelled() => Err(CheckError::Cancelled(url.clone())),
                    checked = tokio::time::timeout(
                        BATCH_TASK_TIMEOUT,
                        checker.check_single(&url, &extract_key, check_test_version),
                    ) => match checked {
                        Ok(result) => result,
                        Err(_) => Err(CheckError::Timeout(url.clone())),
                    },
                };

                match outcome {
                    Ok(version) => {
                        info!(url, version, elapsed = ?started.elapsed(), "batch check succeeded");
                        BatchResult {
                            url,
                            version,
                            error: None,
                            duration: started.elapsed(),
                        }
                    }
                    Err(err) => {
                        error!(url, error = %err, "batch check failed");
                        let _ = err_tx.send(err.is_critical()).await;
                        BatchResult {
                            url,
                            version: String::new(),
                            error: Some(err),
                            duration: started.elapsed(),
                        }
                    }
                }
            }));
        }
        drop(err_tx);

        let mut results = Vec::with_capacity(handles.len());
        for (i, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_err) => {
                    error!(url = %urls[i], error = %join_err, "batch task panicked");
                    results.push(BatchResult {
                        url: urls[i].clone(),
                        version: String::new(),
                        error: Some(CheckError::Cancelled(urls[i].clone())),
                        duration: Duration::ZERO,
                    });
                }
            }
        }

        supervisor.abort();
        results
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::registry::builtin_registry;
    use crate::config::UrlRule;
    use mockito::Server;

    fn json_rule(pattern: &str, key: &str) -> UrlRule {
        UrlRule {
            name: "json".to_string(),
            pattern: pattern.to_string(),
            checker: "json".to_string(),
            version_extract_key: key.to_string(),
            check_test_version: false,
            priority: 50,
        }
    }

    fn concurrent(rules: &[UrlRule], ttl: Duration) -> Arc<ConcurrentChecker> {
        let registry = Arc::new(builtin_registry(&Default::default()));
        let selector = Arc::new(CheckerSelector::new(registry, rules).unwrap());
        Arc::new(ConcurrentChecker::new(selector, ttl))
    }

    #[tokio::test]
    async fn second_check_within_ttl_hits_the_cache() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"version": "3.1"}"#)
            .expect(1)
            .create_async()
            .await;

        let checker = concurrent(&[json_rule(r"127\.0\.0\.1", "version")], Duration::from_secs(60));
        let url = format!("{}/v.json", server.url());

        let first = checker.check_single(&url, "", false).await.unwrap();
        let second = checker.check_single(&url, "", false).await.unwrap();

        // expect(1) proves the second call never reached the transport.
        mock.assert_async().await;
        assert_eq!(first, "3.1");
        assert_eq!(second, "3.1");
    }

    #[tokio::test]
    async fn expired_cache_entries_refetch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"version": "3.1"}"#)
            .expect(2)
            .create_async()
            .await;

        let checker = concurrent(&[json_rule(r"127\.0\.0\.1", "version")], Duration::ZERO);
        let url = format!("{}/v.json", server.url());

        checker.check_single(&url, "", false).await.unwrap();
        checker.check_single(&url, "", false).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn batch_returns_a_slot_per_url_in_order() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/a.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"version": "1.0.0"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/b.json")
            .with_status(404)
            .create_async()
            .await;

        let checker = concurrent(&[json_rule(r"127\.0\.0\.1", "version")], Duration::from_secs(60));
        let urls = vec![
            format!("{}/a.json", server.url()),
            format!("{}/b.json", server.url()),
        ];

        let results = checker.check_multiple(&urls, "", false, 2).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].version, "1.0.0");
        assert!(results[0].error.is_none());
        assert!(matches!(results[1].error, Some(CheckError::NotFound(_))));
    }
}
