//! The capability set every upstream checker satisfies.

#[cfg(test)]
use mockall::automock;

use crate::checker::error::CheckError;

/// A single upstream source kind: knows which URLs it can handle and how to
/// turn one into a version string.
///
/// [`check_with_version_ref`](UpstreamChecker::check_with_version_ref) is the
/// canonical operation; the other two check methods are wrappers with empty
/// reference / default options. Checkers that cannot use a version reference
/// simply ignore it.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait UpstreamChecker: Send + Sync {
    /// Registry name of this checker, e.g. `"github"`.
    fn name(&self) -> &'static str;

    /// Whether this checker can handle the given URL.
    fn supports(&self, url: &str) -> bool;

    /// Selection priority in `0..=100`; higher wins.
    fn priority(&self) -> u8;

    /// Push an effective extract key into the checker. Optional capability;
    /// the default implementation ignores it.
    fn set_extract_key(&mut self, _key: &str) {}

    /// Check with default options: no version reference, stable versions only.
    async fn check(&self, url: &str, extract_key: &str) -> Result<String, CheckError> {
        self.check_with_version_ref(url, extract_key, "", false).await
    }

    /// Check with an explicit pre-release policy.
    async fn check_with_options(
        &self,
        url: &str,
        extract_key: &str,
        check_test_version: bool,
    ) -> Result<String, CheckError> {
        self.check_with_version_ref(url, extract_key, "", check_test_version)
            .await
    }

    /// Check, biasing extraction toward versions shaped like `version_ref`
    /// (a template such as `a.b.c` produced by
    /// [`generate_version_ref`](crate::version::generate_version_ref)).
    async fn check_with_version_ref(
        &self,
        url: &str,
        extract_key: &str,
        version_ref: &str,
        check_test_version: bool,
    ) -> Result<String, CheckError>;
}

impl std::fmt::Debug for dyn UpstreamChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamChecker").field("name", &self.name()).finish()
    }
}
