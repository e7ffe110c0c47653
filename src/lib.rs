//! aurwatch: watches upstream releases for AUR packages and records when
//! upstream is ahead of the packaging metadata.
//!
//! The core is the version-discovery engine: pluggable [`checker`]s
//! selected per URL, the [`version`] processor that standardizes and
//! compares heterogeneous version strings, the [`orchestrator`]'s worker
//! pool with retries and callbacks, and the [`scheduler`] driving
//! whole-catalog passes. Around it sit the [`store`], the [`aur`] RPC
//! client, the [`services`] glue and the HTTP [`server`].

pub mod aur;
pub mod cache;
pub mod checker;
pub mod concurrent;
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod scheduler;
pub mod server;
pub mod services;
pub mod store;
pub mod version;
