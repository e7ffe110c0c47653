//! Upstream refresh: drives the check machinery for stored packages and
//! merges the outcomes into the upstream state rows.

use std::sync::Arc;

use tracing::{error, info};

use crate::concurrent::ConcurrentChecker;
use crate::orchestrator::{AsyncOrchestrator, AsyncResult, RequestStatus};
use crate::store::models::{PackageInfo, UpdateState};
use crate::store::Store;

pub struct UpstreamService {
    store: Arc<Store>,
    checker: Arc<ConcurrentChecker>,
    orchestrator: Arc<AsyncOrchestrator>,
}

impl UpstreamService {
    pub fn new(
        store: Arc<Store>,
        checker: Arc<ConcurrentChecker>,
        orchestrator: Arc<AsyncOrchestrator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            checker,
            orchestrator,
        })
    }

    /// Synchronous single-package refresh, used by the check-one endpoint.
    /// Returns the discovered version.
    pub async fn check_one(&self, package_id: i64) -> anyhow::Result<String> {
        let package = self
            .store
            .get_package(package_id)?
            .ok_or_else(|| anyhow::anyhow!("package {package_id} not found"))?;
        let version_ref = self.version_ref_for(package_id);

        match self
            .checker
            .check_single_with_ref(
                &package.upstream_url,
                &package.version_extract_key,
                &version_ref,
                package.check_test_version,
            )
            .await
        {
            Ok(version) => {
                self.store
                    .upsert_upstream_info(package_id, &version, UpdateState::Ok)?;
                info!(package = %package.name, version, "upstream version refreshed");
                Ok(version)
            }
            Err(err) => {
                error!(package = %package.name, error = %err, "upstream refresh failed");
                self.store
                    .upsert_upstream_info(package_id, "", UpdateState::Fail)?;
                Err(err.into())
            }
        }
    }

    /// Submit every package to the orchestrator. Each result is persisted
    /// by the request callback; one bad package never stops the rest.
    /// Returns the number of accepted submissions.
    pub async fn check_all(&self) -> anyhow::Result<usize> {
        let packages = self.store.list_packages()?;
        let mut submitted = 0;

        for package in packages {
            let store = Arc::clone(&self.store);
            let package_id = package.id;
            let name = package.name.clone();

            let callback = Arc::new(move |result: AsyncResult| {
                let state = if result.status == RequestStatus::Completed {
                    UpdateState::Ok
                } else {
                    UpdateState::Fail
                };
                if let Err(e) = store.upsert_upstream_info(package_id, &result.version, state) {
                    error!(package = %name, error = %e, "failed to persist upstream state");
                }
            });

            match self.orchestrator.submit(
                &package.upstream_url,
                &package.version_extract_key,
                package.check_test_version,
                Some(callback),
            ) {
                Ok(_) => submitted += 1,
                Err(err) => {
                    error!(package = %package.name, error = %err, "submission rejected");
                    self.store
                        .upsert_upstream_info(package.id, "", UpdateState::Fail)?;
                }
            }
        }

        info!(submitted, "upstream refresh pass submitted");
        Ok(submitted)
    }

    /// The extraction-bias template recorded at the last AUR refresh, when
    /// one exists.
    fn version_ref_for(&self, package_id: i64) -> String {
        self.store
            .get_aur_info(package_id)
            .ok()
            .flatten()
            .map(|aur| aur.upstream_version_ref)
            .unwrap_or_default()
    }

    /// Whether the recorded upstream version is ahead of the AUR one, for
    /// callers that want to present drift.
    pub fn is_outdated(&self, package: &PackageInfo) -> bool {
        let aur = self.store.get_aur_info(package.id).ok().flatten();
        let upstream = self.store.get_upstream_info(package.id).ok().flatten();
        match (aur, upstream) {
            (Some(aur), Some(upstream)) if !upstream.upstream_version.is_empty() => {
                let (pkgver, _) = crate::aur::AurPackage::split_full_version(&aur.aur_version);
                crate::version::compare(&upstream.upstream_version, &pkgver)
                    == std::cmp::Ordering::Greater
            }
            _ => false,
        }
    }
}
