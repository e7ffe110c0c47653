//! Upstream checkers: pluggable per-source-kind version discovery.
//!
//! A checker knows how to turn one kind of URL into a version string: forge
//! APIs, package indexes, redirect targets, raw HTML and JSON documents.
//! The [`registry`] maps names to constructors, the [`selector`] routes a
//! URL to a checker through the configured rules, and [`extract`] holds the
//! context-window and regex machinery the scraping checkers share.
//!
//! # Modules
//!
//! - [`traits`]: the `UpstreamChecker` capability set
//! - [`registry`]: name → constructor mapping
//! - [`selector`]: URL-rule driven selection
//! - [`error`]: the check error taxonomy
//! - [`extract`]: shared extraction helpers
//! - [`forge`], [`npm`], [`pypi`], [`redirect`], [`http`], [`curl`],
//!   [`json`]: the built-in checkers
//! - `headless`: Chromium-rendered fallback (feature `headless`)

pub mod curl;
pub mod error;
pub mod extract;
pub mod forge;
#[cfg(feature = "headless")]
pub mod headless;
pub mod http;
pub mod json;
pub mod npm;
pub mod pypi;
pub mod redirect;
pub mod registry;
pub mod selector;
pub mod traits;

pub use error::CheckError;
pub use registry::{builtin_registry, CheckerRegistry};
pub use selector::{CheckerSelector, Selection};
pub use traits::UpstreamChecker;
