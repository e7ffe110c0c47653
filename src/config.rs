//! Global configuration: check cadence, orchestration sizes, cache policy,
//! per-checker settings and the URL rule list.
//!
//! The file is JSON and default-tolerant: any missing field takes its
//! default, so a config containing nothing but `urlRules` is valid.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cache::EvictionPolicy;

/// Default catalog refresh interval.
pub const DEFAULT_CHECK_INTERVAL_MINUTES: u64 = 60;

/// Default fan-out width for batch checks.
pub const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 10;

/// Default orchestrator worker count.
pub const DEFAULT_ASYNC_WORKER_COUNT: usize = 5;

/// Default cache TTL.
pub const DEFAULT_CACHE_TTL_MINUTES: u64 = 30;

/// One URL routing rule. Rules are matched in descending priority order;
/// the first whose pattern matches the package URL picks the checker.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UrlRule {
    pub name: String,
    pub pattern: String,
    pub checker: String,
    #[serde(default)]
    pub version_extract_key: String,
    #[serde(default)]
    pub check_test_version: bool,
    #[serde(default)]
    pub priority: i32,
}

/// Per-checker tuning knobs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckerSettings {
    pub priority: u8,
    pub timeout_seconds: u64,
    pub retry_count: u32,
    /// Opt-out of TLS verification for hosts with broken certificate
    /// chains. Off by default.
    pub insecure_skip_tls: bool,
    /// Free-form checker-specific parameters, e.g. `"headless": "false"`
    /// for the browser checker.
    pub custom_params: HashMap<String, String>,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            priority: 50,
            timeout_seconds: 30,
            retry_count: 3,
            insecure_skip_tls: false,
            custom_params: HashMap::new(),
        }
    }
}

pub type CheckerSettingsMap = HashMap<String, CheckerSettings>;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub log_level: String,
    pub database_path: Option<PathBuf>,
    pub listen_address: String,
    pub check_interval_minutes: u64,
    pub max_concurrent_checks: usize,
    pub async_worker_count: usize,
    pub cache_ttl_minutes: u64,
    pub cache_max_size: usize,
    pub cache_eviction_policy: EvictionPolicy,
    pub checkers: CheckerSettingsMap,
    pub url_rules: Vec<UrlRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            database_path: None,
            listen_address: "127.0.0.1:8580".to_string(),
            check_interval_minutes: DEFAULT_CHECK_INTERVAL_MINUTES,
            max_concurrent_checks: DEFAULT_MAX_CONCURRENT_CHECKS,
            async_worker_count: DEFAULT_ASYNC_WORKER_COUNT,
            cache_ttl_minutes: DEFAULT_CACHE_TTL_MINUTES,
            cache_max_size: 1000,
            cache_eviction_policy: EvictionPolicy::Lru,
            checkers: HashMap::new(),
            url_rules: Vec::new(),
        }
    }
}

impl Config {
    /// Load from an explicit path, or from `<data dir>/config.json` when it
    /// exists, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = data_dir().join("config.json");
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let content = std::fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir().join("aurwatch.db"))
    }
}

/// Returns the data directory for aurwatch.
/// Uses $XDG_DATA_HOME/aurwatch when XDG_DATA_HOME is set, otherwise
/// ~/.local/share/aurwatch, or ./aurwatch as a last resort.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Directory holding the rolling log files.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let base = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("aurwatch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_config_takes_defaults_for_missing_fields() {
        let config: Config = serde_json::from_value(json!({
            "checkIntervalMinutes": 15
        }))
        .unwrap();

        assert_eq!(config.check_interval_minutes, 15);
        assert_eq!(config.async_worker_count, DEFAULT_ASYNC_WORKER_COUNT);
        assert_eq!(config.log_level, "info");
        assert!(config.url_rules.is_empty());
    }

    #[test]
    fn url_rules_parse_with_optional_fields() {
        let config: Config = serde_json::from_value(json!({
            "urlRules": [
                {"name": "forge", "pattern": "github\\.com", "checker": "github", "priority": 80},
                {
                    "name": "vendor",
                    "pattern": "example\\.com",
                    "checker": "curl",
                    "versionExtractKey": "DownloadFor",
                    "checkTestVersion": true,
                    "priority": 90
                }
            ]
        }))
        .unwrap();

        assert_eq!(config.url_rules.len(), 2);
        assert_eq!(config.url_rules[1].version_extract_key, "DownloadFor");
        assert!(config.url_rules[1].check_test_version);
        assert_eq!(config.url_rules[0].version_extract_key, "");
    }

    #[test]
    fn checker_settings_default_to_safe_values() {
        let config: Config = serde_json::from_value(json!({
            "checkers": {"curl": {"insecureSkipTls": true}}
        }))
        .unwrap();

        let curl = config.checkers.get("curl").unwrap();
        assert!(curl.insecure_skip_tls);
        assert_eq!(curl.timeout_seconds, 30);
        assert!(!CheckerSettings::default().insecure_skip_tls);
    }

    #[test]
    fn eviction_policy_parses_from_lowercase() {
        let config: Config =
            serde_json::from_value(json!({"cacheEvictionPolicy": "fifo"})).unwrap();
        assert_eq!(config.cache_eviction_policy, EvictionPolicy::Fifo);
    }

    #[test]
    fn data_dir_prefers_xdg_over_home() {
        assert_eq!(
            data_dir_with_env(Some("/xdg".to_string()), Some(PathBuf::from("/home/u"))),
            PathBuf::from("/xdg/aurwatch")
        );
        assert_eq!(
            data_dir_with_env(None, Some(PathBuf::from("/home/u"))),
            PathBuf::from("/home/u/.local/share/aurwatch")
        );
        assert_eq!(data_dir_with_env(None, None), PathBuf::from("./aurwatch"));
    }
}
