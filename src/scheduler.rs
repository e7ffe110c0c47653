//! Timer-driven whole-catalog refresh.
//!
//! A single-shot timer re-arms itself after each pass instead of ticking on
//! a fixed grid, so a pass that overruns the interval simply delays the
//! next one instead of overlapping it. Each pass refreshes the AUR side
//! first and the upstream side second, checking the stop signal in between.

use std::sync::{Arc, Mutex};
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The two phases of a catalog pass, implemented by the service layer.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait CatalogRefresh: Send + Sync + 'static {
    /// Refresh the packaging-side versions for every package.
    async fn refresh_aur(&self) -> anyhow::Result<()>;

    /// Refresh the upstream versions for every package.
    async fn refresh_upstream(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_minutes: u64,
}

struct SchedulerState {
    running: bool,
    interval: Duration,
    stop: CancellationToken,
}

pub struct Scheduler {
    catalog: Arc<dyn CatalogRefresh>,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(catalog: Arc<dyn CatalogRefresh>) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            state: Mutex::new(SchedulerState {
                running: false,
                interval: Duration::ZERO,
                stop: CancellationToken::new(),
            }),
        })
    }

    /// Arm the timer. A second start while running is a no-op.
    pub fn start(self: &Arc<Self>, interval_minutes: u64) {
        self.start_with_interval(Duration::from_secs(interval_minutes * 60), interval_minutes)
    }

    fn start_with_interval(self: &Arc<Self>, interval: Duration, interval_minutes: u64) {
        let mut state = self.state.lock().unwrap();
        if state.running {
            warn!("scheduler already running");
            return;
        }
        state.running = true;
        state.interval = Duration::from_secs(interval_minutes * 60);
        state.stop = CancellationToken::new();
        let stop = state.stop.clone();
        drop(state);

        info!(interval_minutes, "scheduler started");
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(interval, stop).await;
        });
    }

    /// Cancel the timer and signal any in-flight pass to short-circuit
    /// between its AUR and upstream phases.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.running {
            warn!("scheduler is not running");
            return;
        }
        state.running = false;
        state.stop.cancel();
        info!("scheduler stopped");
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.state.lock().unwrap();
        SchedulerStatus {
            running: state.running,
            interval_minutes: state.interval.as_secs() / 60,
        }
    }

    async fn run(self: Arc<Self>, interval: Duration, stop: CancellationToken) {
        loop {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }

            self.run_pass(&stop).await;

            if stop.is_cancelled() {
                return;
            }
            // Loop head re-arms the timer for the next pass.
        }
    }

    /// One full catalog pass: AUR refresh, stop check, upstream refresh.
    async fn run_pass(&self, stop: &CancellationToken) {
        info!("catalog pass starting");

        if let Err(e) = self.catalog.refresh_aur().await {
            error!(error = %e, "AUR refresh failed");
        } else {
            info!("AUR refresh finished");
        }

        if stop.is_cancelled() {
            info!("scheduler stopped mid-pass, skipping upstream refresh");
            return;
        }

        if let Err(e) = self.catalog.refresh_upstream().await {
            error!(error = %e, "upstream refresh failed");
        } else {
            info!("upstream refresh finished");
        }

        info!("catalog pass finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Test double that records phase entries and can dwell inside the AUR
    /// phase long enough for a stop to land mid-pass.
    struct RecordingCatalog {
        aur_calls: AtomicU32,
        upstream_calls: AtomicU32,
        aur_delay: Duration,
    }

    impl RecordingCatalog {
        fn new(aur_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                aur_calls: AtomicU32::new(0),
                upstream_calls: AtomicU32::new(0),
                aur_delay,
            })
        }
    }

    #[async_trait::async_trait]
    impl CatalogRefresh for RecordingCatalog {
        async fn refresh_aur(&self) -> anyhow::Result<()> {
            self.aur_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.aur_delay).await;
            Ok(())
        }

        async fn refresh_upstream(&self) -> anyhow::Result<()> {
            self.upstream_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_pass_runs_both_phases_and_rearms() {
        let catalog = RecordingCatalog::new(Duration::ZERO);
        let scheduler = Scheduler::new(catalog.clone());
        scheduler.start_with_interval(Duration::from_millis(20), 1);

        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.stop();

        let aur = catalog.aur_calls.load(Ordering::SeqCst);
        let upstream = catalog.upstream_calls.load(Ordering::SeqCst);
        assert!(aur >= 2, "timer never re-armed: {aur} passes");
        // The stop may land mid-pass, so the phases differ by at most one.
        assert!(aur - upstream <= 1, "aur {aur} vs upstream {upstream}");
    }

    #[tokio::test]
    async fn stop_between_phases_skips_the_upstream_refresh() {
        let catalog = RecordingCatalog::new(Duration::from_millis(150));
        let scheduler = Scheduler::new(catalog.clone());
        scheduler.start_with_interval(Duration::from_millis(10), 1);

        // Wait until the AUR phase is underway, then stop mid-pass.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(catalog.aur_calls.load(Ordering::SeqCst), 1);
        scheduler.stop();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(catalog.upstream_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn status_reflects_the_lifecycle() {
        let catalog = RecordingCatalog::new(Duration::ZERO);
        let scheduler = Scheduler::new(catalog);

        assert!(!scheduler.status().running);
        scheduler.start(30);
        let status = scheduler.status();
        assert!(status.running);
        assert_eq!(status.interval_minutes, 30);
        scheduler.stop();
        assert!(!scheduler.status().running);
    }

    #[tokio::test]
    async fn double_start_is_a_no_op() {
        let catalog = RecordingCatalog::new(Duration::ZERO);
        let scheduler = Scheduler::new(catalog.clone());
        scheduler.start_with_interval(Duration::from_millis(10), 1);
        scheduler.start_with_interval(Duration::from_millis(10), 1);

        tokio::time::sleep(Duration::from_millis(35)).await;
        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // A second pool of passes would roughly double the call count.
        let aur = catalog.aur_calls.load(Ordering::SeqCst);
        assert!(aur <= 4, "double start spawned extra timers: {aur}");
    }
}
