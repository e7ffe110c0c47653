//! Asynchronous check orchestration: a bounded request map, a worker pool,
//! retry with exponential backoff and per-request callbacks.
//!
//! Requests are admitted into a map keyed by a digest id, workers claim the
//! first pending entry, run the check through the concurrent checker and
//! finalize the request with its callback on a fresh task. The result
//! stream is a best-effort observable: when its buffer is full the result
//! is dropped with a warning while the callback still fires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checker::CheckError;
use crate::concurrent::ConcurrentChecker;

/// Retry attempts per request; sleeps of `attempt²` seconds in between.
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Failed | RequestStatus::Cancelled
        )
    }
}

/// Published to the result stream and passed to callbacks once a request
/// reaches a terminal status.
#[derive(Debug, Clone)]
pub struct AsyncResult {
    pub id: String,
    pub url: String,
    pub version: String,
    pub error: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub duration: Duration,
}

pub type Callback = Arc<dyn Fn(AsyncResult) + Send + Sync>;

struct CheckRequest {
    id: String,
    url: String,
    extract_key: String,
    check_test_version: bool,
    status: RequestStatus,
    result: String,
    error: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    callback: Option<Callback>,
}

/// Monotonic counters plus a running mean of completed-check time.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct OrchestratorStats {
    pub total_requests: u64,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub average_time_ms: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub worker_count: usize,
    pub max_pending: usize,
    pub result_chan_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            max_pending: 1000,
            result_chan_size: 100,
        }
    }
}

pub struct AsyncOrchestrator {
    checker: Arc<ConcurrentChecker>,
    requests: Arc<RwLock<HashMap<String, CheckRequest>>>,
    stats: Arc<Mutex<OrchestratorStats>>,
    result_tx: mpsc::Sender<AsyncResult>,
    result_rx: Mutex<Option<mpsc::Receiver<AsyncResult>>>,
    token: CancellationToken,
    worker_count: AtomicUsize,
    max_pending: usize,
}

impl AsyncOrchestrator {
    pub fn new(checker: Arc<ConcurrentChecker>, config: OrchestratorConfig) -> Arc<Self> {
        let (result_tx, result_rx) = mpsc::channel(config.result_chan_size.max(1));
        Arc::new(Self {
            checker,
            requests: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(Mutex::new(OrchestratorStats::default())),
            result_tx,
            result_rx: Mutex::new(Some(result_rx)),
            token: CancellationToken::new(),
            worker_count: AtomicUsize::new(config.worker_count),
            max_pending: config.max_pending,
        })
    }

    /// Launch the worker pool and the result-stream consumer.
    pub fn start(self: &Arc<Self>) {
        let count = self.worker_count.load(Ordering::SeqCst);
        info!(workers = count, "starting async orchestrator");

        if let Some(mut rx) = self.result_rx.lock().unwrap().take() {
            let token = self.token.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        result = rx.recv() => match result {
                            Some(result) => {
                                debug!(id = %result.id, status = ?result.status, "async result observed");
                            }
                            None => return,
                        },
                    }
                }
            });
        }

        for worker_id in 0..count {
            self.spawn_worker(worker_id);
        }
    }

    /// Stop the pool. Workers exit at their next loop turn; in-flight
    /// checks observe the cancelled token inside their network calls.
    pub fn stop(&self) {
        info!("stopping async orchestrator");
        self.token.cancel();
    }

    /// Submit a check. Duplicate ids return the existing request unchanged.
    /// Fails with [`CheckError::QueueFull`] once `max_pending` requests are
    /// resident.
    pub fn submit(
        &self,
        url: &str,
        extract_key: &str,
        check_test_version: bool,
        callback: Option<Callback>,
    ) -> Result<String, CheckError> {
        let id = generate_request_id(url, extract_key, check_test_version);

        let mut requests = self.requests.write().unwrap();
        if requests.contains_key(&id) {
            debug!(id, "duplicate submission, returning existing request");
            return Ok(id);
        }
        if requests.len() >= self.max_pending {
            return Err(CheckError::QueueFull(self.max_pending));
        }

        requests.insert(
            id.clone(),
            CheckRequest {
                id: id.clone(),
                url: url.to_string(),
                extract_key: extract_key.to_string(),
                check_test_version,
                status: RequestStatus::Pending,
                result: String::new(),
                error: None,
                created_at: Utc::now(),
                completed_at: None,
                callback,
            },
        );
        drop(requests);

        self.stats.lock().unwrap().total_requests += 1;
        info!(id, url, "submitted async check request");
        Ok(id)
    }

    pub fn get_status(&self, id: &str) -> Option<RequestStatus> {
        self.requests.read().unwrap().get(id).map(|r| r.status)
    }

    /// Fetch the result of a terminal request. `None` while the request is
    /// still pending or processing, or when the id is unknown.
    pub fn get_result(&self, id: &str) -> Option<AsyncResult> {
        let requests = self.requests.read().unwrap();
        let request = requests.get(id)?;
        if !request.status.is_terminal() {
            return None;
        }
        Some(result_of(request))
    }

    /// Remove a request. Pending requests transition to cancelled and fire
    /// their callback; processing requests are left to finish on their own
    /// but their record is dropped.
    pub fn remove(&self, id: &str) -> bool {
        let mut requests = self.requests.write().unwrap();
        let Some(mut request) = requests.remove(id) else {
            return false;
        };
        if request.status == RequestStatus::Pending {
            request.status = RequestStatus::Cancelled;
            request.error = Some(format!("check cancelled for {}", request.url));
            request.completed_at = Some(Utc::now());
            fire_callback(&request);
        }
        debug!(id, "request removed");
        true
    }

    /// Cancel every pending request and empty the map. Each cancelled
    /// request fires its callback with a cancellation error.
    pub fn clear(&self) {
        let mut requests = self.requests.write().unwrap();
        for (_, request) in requests.iter_mut() {
            if request.status == RequestStatus::Pending {
                request.status = RequestStatus::Cancelled;
                request.error = Some(format!("check cancelled for {}", request.url));
                request.completed_at = Some(Utc::now());
                fire_callback(request);
            }
        }
        requests.clear();
        info!("all async check requests cleared");
    }

    pub fn stats(&self) -> OrchestratorStats {
        *self.stats.lock().unwrap()
    }

    /// Requests that are not yet terminal.
    pub fn pending_count(&self) -> usize {
        self.requests
            .read()
            .unwrap()
            .values()
            .filter(|r| !r.status.is_terminal())
            .count()
    }

    /// Grow the worker pool. Shrinking would require restarting the
    /// orchestrator and is refused with a warning.
    pub fn adjust_worker_count(self: &Arc<Self>, new_count: usize) {
        let current = self.worker_count.load(Ordering::SeqCst);
        if new_count == 0 || new_count == current {
            return;
        }
        if new_count < current {
            warn!(
                current,
                requested = new_count,
                "shrinking the worker pool requires a restart, keeping current count"
            );
            return;
        }
        info!(current, new = new_count, "growing worker pool");
        for worker_id in current..new_count {
            self.spawn_worker(worker_id);
        }
        self.worker_count.store(new_count, Ordering::SeqCst);
    }

    fn spawn_worker(self: &Arc<Self>, worker_id: usize) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            debug!(worker_id, "worker started");
            loop {
                if this.token.is_cancelled() {
                    debug!(worker_id, "worker stopping");
                    return;
                }

                let Some(job) = this.claim_next_pending() else {
                    // Nothing claimable: long sleep on an empty queue, short
                    // sleep when we lost a race for a pending entry.
                    let idle = if this.pending_count() == 0 {
                        Duration::from_secs(1)
                    } else {
                        Duration::from_millis(100)
                    };
                    tokio::select! {
                        _ = this.token.cancelled() => return,
                        _ = tokio::time::sleep(idle) => continue,
                    }
                };

                this.process(job).await;
            }
        });
    }

    /// Claim the first pending request, transitioning it to processing
    /// under the write lock.
    fn claim_next_pending(&self) -> Option<(String, String, String, bool)> {
        let mut requests = self.requests.write().unwrap();
        let request = requests
            .values_mut()
            .find(|r| r.status == RequestStatus::Pending)?;
        request.status = RequestStatus::Processing;
        Some((
            request.id.clone(),
            request.url.clone(),
            request.extract_key.clone(),
            request.check_test_version,
        ))
    }

    async fn process(&self, job: (String, String, String, bool)) {
        let (id, url, extract_key, check_test_version) = job;
        let started = std::time::Instant::now();
        let mut last_error: Option<CheckError> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                let backoff = Duration::from_secs(((attempt - 1) * (attempt - 1)) as u64);
                info!(id, attempt, "retrying check request");
                tokio::select! {
                    _ = self.token.cancelled() => {
                        last_error = Some(CheckError::Cancelled(url.clone()));
                        break;
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            let outcome = tokio::select! {
                _ = self.token.cancelled() => Err(CheckError::Cancelled(url.clone())),
                checked = self.checker.check_single(&url, &extract_key, check_test_version) => checked,
            };

            match outcome {
                Ok(version) => {
                    info!(id, version, "check request completed");
                    self.finalize(&id, RequestStatus::Completed, version, None, started.elapsed());
                    return;
                }
                Err(err) => {
                    error!(id, attempt, error = %err, "check attempt failed");
                    let critical = err.is_critical();
                    last_error = Some(err);
                    if critical {
                        break;
                    }
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "check failed".to_string());
        self.finalize(
            &id,
            RequestStatus::Failed,
            String::new(),
            Some(message),
            started.elapsed(),
        );
    }

    /// Write the terminal state, update stats, publish to the result stream
    /// and fire the callback on its own task.
    fn finalize(
        &self,
        id: &str,
        status: RequestStatus,
        version: String,
        error: Option<String>,
        elapsed: Duration,
    ) {
        let result = {
            let mut requests = self.requests.write().unwrap();
            let Some(request) = requests.get_mut(id) else {
                // Removed while processing; there is nobody to notify.
                debug!(id, "request vanished before finalization");
                return;
            };
            request.status = status;
            request.result = version;
            request.error = error;
            request.completed_at = Some(Utc::now());
            result_of(request)
        };

        {
            let mut stats = self.stats.lock().unwrap();
            match status {
                RequestStatus::Completed => {
                    stats.completed_requests += 1;
                    let n = stats.completed_requests as f64;
                    let ms = elapsed.as_secs_f64() * 1000.0;
                    stats.average_time_ms += (ms - stats.average_time_ms) / n;
                }
                RequestStatus::Failed => stats.failed_requests += 1,
                _ => {}
            }
        }

        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.result_tx.try_send(result.clone())
        {
            warn!(id = %dropped.id, "result stream full, dropping result");
        }

        let requests = self.requests.read().unwrap();
        if let Some(request) = requests.get(id) {
            fire_callback(request);
        }
    }
}

fn result_of(request: &CheckRequest) -> AsyncResult {
    let duration = request
        .completed_at
        .map(|done| (done - request.created_at).to_std().unwrap_or(Duration::ZERO))
        .unwrap_or(Duration::ZERO);
    AsyncResult {
        id: request.id.clone(),
        url: request.url.clone(),
        version: request.result.clone(),
        error: request.error.clone(),
        status: request.status,
        created_at: request.created_at,
        duration,
    }
}

/// Callbacks run on a fresh task so a slow consumer never blocks a worker.
fn fire_callback(request: &CheckRequest) {
    if let Some(callback) = request.callback.clone() {
        let result = result_of(request);
        tokio::spawn(async move {
            callback(result);
        });
    }
}

/// Sixteen hex characters over url, key, flag and creation nanos: stable
/// within a process, unique across submissions unless the clock collides.
fn generate_request_id(url: &str, extract_key: &str, check_test_version: bool) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{url}-{extract_key}-{}-{nanos}",
            if check_test_version { 1 } else { 0 }
        )
        .as_bytes(),
    );
    format!("{:x}", hasher.finalize())[..16].to_string()
}
