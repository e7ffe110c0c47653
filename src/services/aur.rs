//! Packaging-side refresh: pulls AUR metadata and merges it into the
//! per-package state rows.

use std::sync::Arc;

use tracing::{error, info};

use crate::aur::AurClient;
use crate::store::models::UpdateState;
use crate::store::Store;
use crate::version;

pub struct AurService {
    store: Arc<Store>,
    client: AurClient,
}

impl AurService {
    pub fn new(store: Arc<Store>, client: AurClient) -> Arc<Self> {
        Arc::new(Self { store, client })
    }

    /// Refresh one package's AUR state. A lookup failure marks the row
    /// failed and propagates the error.
    pub async fn check_one(&self, package_id: i64) -> anyhow::Result<()> {
        let package = self
            .store
            .get_package(package_id)?
            .ok_or_else(|| anyhow::anyhow!("package {package_id} not found"))?;

        match self.client.package_info(&package.name).await {
            Ok(aur) => {
                self.merge(package_id, &aur)?;
                Ok(())
            }
            Err(err) => {
                error!(package = %package.name, error = %err, "AUR refresh failed");
                self.store.mark_aur_failed(package_id)?;
                Err(err.into())
            }
        }
    }

    /// Refresh every package in one batch RPC call. Packages missing from
    /// the response are marked failed; the batch itself never aborts on a
    /// single bad package.
    pub async fn check_all(&self) -> anyhow::Result<usize> {
        let packages = self.store.list_packages()?;
        if packages.is_empty() {
            return Ok(0);
        }

        let names: Vec<String> = packages.iter().map(|p| p.name.clone()).collect();
        let found = self.client.packages_info(&names).await?;

        let mut refreshed = 0;
        for package in &packages {
            match found.iter().find(|a| a.name == package.name) {
                Some(aur) => {
                    if let Err(e) = self.merge(package.id, aur) {
                        error!(package = %package.name, error = %e, "failed to persist AUR state");
                    } else {
                        refreshed += 1;
                    }
                }
                None => {
                    error!(package = %package.name, "package missing from AUR response");
                    self.store.mark_aur_failed(package.id)?;
                }
            }
        }

        info!(refreshed, total = packages.len(), "AUR refresh pass finished");
        Ok(refreshed)
    }

    fn merge(&self, package_id: i64, aur: &crate::aur::AurPackage) -> anyhow::Result<()> {
        let (pkgver, _pkgrel) = aur.split_version();
        // The reference template biases later upstream extraction toward
        // the shape the packager last recorded.
        let version_ref = version::generate_version_ref(&pkgver);

        self.store.upsert_aur_info(
            package_id,
            &aur.version,
            &version_ref,
            aur.first_submitted_at(),
            aur.last_modified_at(),
            UpdateState::Ok,
        )?;
        Ok(())
    }
}
