//! Service layer: glue between persistence, the AUR client and the check
//! machinery.
//!
//! # Modules
//!
//! - [`package`]: catalog CRUD
//! - [`aur`]: packaging-side refresh via the AUR RPC
//! - [`upstream`]: upstream refresh through the orchestrator

pub mod aur;
pub mod package;
pub mod upstream;

use std::sync::Arc;

use crate::scheduler::CatalogRefresh;

/// The two refresh phases the scheduler drives, backed by the real
/// services.
pub struct ServiceCatalog {
    pub aur: Arc<aur::AurService>,
    pub upstream: Arc<upstream::UpstreamService>,
}

#[async_trait::async_trait]
impl CatalogRefresh for ServiceCatalog {
    async fn refresh_aur(&self) -> anyhow::Result<()> {
        self.aur.check_all().await?;
        Ok(())
    }

    async fn refresh_upstream(&self) -> anyhow::Result<()> {
        self.upstream.check_all().await?;
        Ok(())
    }
}
