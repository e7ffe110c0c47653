//! Version handling layer: normalization, standardization and comparison of
//! the heterogeneous version strings upstreams publish.
//!
//! Upstream projects tag releases as `v1.2.3`, `Alpha0.10.1`,
//! `6.0.0-ubuntu-amd64` or `1.10.12.394.001`. This layer turns those into a
//! standardized form and provides a total order over them.
//!
//! # Modules
//!
//! - [`processor`]: standardization and platform/pre-release suffix cleaning
//! - [`compare`]: total order, component extraction, version references

pub mod compare;
pub mod processor;

pub use compare::{compare, extract_components, generate_version_ref, is_stable, parse_and_compare};
pub use processor::{clean, standardize};
