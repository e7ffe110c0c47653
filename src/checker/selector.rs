//! Routes a URL to a checker through the configured URL rules.
//!
//! Rules are compiled and sorted by descending priority when loaded;
//! selection scans them in order and the first regex match wins. A matching
//! rule may override the caller's extract key and raise the pre-release
//! flag. URLs matching no rule fall back to the default checker.

use std::sync::{Arc, RwLock};

use regex::Regex;
use tracing::debug;

use crate::checker::error::CheckError;
use crate::checker::registry::CheckerRegistry;
use crate::checker::traits::UpstreamChecker;
use crate::config::UrlRule;

const DEFAULT_CHECKER: &str = "github";

/// A URL rule with its pattern compiled.
struct CompiledRule {
    name: String,
    pattern: Regex,
    checker: String,
    version_extract_key: String,
    check_test_version: bool,
    priority: i32,
}

/// The outcome of a selection: the checker plus the effective parameters
/// after rule overrides.
pub struct Selection {
    pub checker: Box<dyn UpstreamChecker>,
    pub extract_key: String,
    pub check_test_version: bool,
}

pub struct CheckerSelector {
    registry: Arc<CheckerRegistry>,
    rules: RwLock<Arc<Vec<CompiledRule>>>,
}

impl CheckerSelector {
    /// Compile and sort the rule list. Invalid patterns fail the whole load;
    /// a bad rule silently skipped would change selection for every URL
    /// below it.
    pub fn new(registry: Arc<CheckerRegistry>, rules: &[UrlRule]) -> Result<Self, CheckError> {
        let compiled = Self::compile(rules)?;
        Ok(Self {
            registry,
            rules: RwLock::new(Arc::new(compiled)),
        })
    }

    /// Atomically replace the rule list.
    pub fn reload(&self, rules: &[UrlRule]) -> Result<(), CheckError> {
        let compiled = Self::compile(rules)?;
        *self.rules.write().unwrap() = Arc::new(compiled);
        debug!(rules = rules.len(), "url rules reloaded");
        Ok(())
    }

    fn compile(rules: &[UrlRule]) -> Result<Vec<CompiledRule>, CheckError> {
        let mut compiled = rules
            .iter()
            .map(|rule| {
                let pattern = Regex::new(&rule.pattern).map_err(|e| {
                    CheckError::Configuration(format!(
                        "rule '{}' has an invalid pattern: {e}",
                        rule.name
                    ))
                })?;
                Ok(CompiledRule {
                    name: rule.name.clone(),
                    pattern,
                    checker: rule.checker.clone(),
                    version_extract_key: rule.version_extract_key.clone(),
                    check_test_version: rule.check_test_version,
                    priority: rule.priority,
                })
            })
            .collect::<Result<Vec<_>, CheckError>>()?;
        compiled.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(compiled)
    }

    /// Pick a checker for `url`. Returns the instantiated checker and the
    /// effective extract key / pre-release flag after rule overrides.
    pub fn select(
        &self,
        url: &str,
        extract_key: &str,
        check_test_version: bool,
    ) -> Result<Selection, CheckError> {
        let rules = self.rules.read().unwrap().clone();

        for rule in rules.iter() {
            if !rule.pattern.is_match(url) {
                continue;
            }

            let effective_key = if rule.version_extract_key.is_empty() {
                extract_key.to_string()
            } else {
                rule.version_extract_key.clone()
            };
            let effective_test = check_test_version || rule.check_test_version;

            debug!(
                url,
                rule = %rule.name,
                checker = %rule.checker,
                "url matched rule"
            );

            let mut checker = self.registry.create(&rule.checker)?;
            checker.set_extract_key(&effective_key);
            return Ok(Selection {
                checker,
                extract_key: effective_key,
                check_test_version: effective_test,
            });
        }

        debug!(url, "no rule matched, using default checker");
        let mut checker = self.registry.create(DEFAULT_CHECKER)?;
        checker.set_extract_key(extract_key);
        Ok(Selection {
            checker,
            extract_key: extract_key.to_string(),
            check_test_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::registry::builtin_registry;

    fn rule(name: &str, pattern: &str, checker: &str, priority: i32) -> UrlRule {
        UrlRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
            checker: checker.to_string(),
            version_extract_key: String::new(),
            check_test_version: false,
            priority,
        }
    }

    fn selector(rules: &[UrlRule]) -> CheckerSelector {
        let registry = Arc::new(builtin_registry(&Default::default()));
        CheckerSelector::new(registry, rules).unwrap()
    }

    #[test]
    fn first_match_by_priority_wins() {
        let selector = selector(&[
            rule("low", r"example\.com", "curl", 10),
            rule("high", r"example\.com", "json", 90),
        ]);

        let selection = selector
            .select("https://example.com/releases", "", false)
            .unwrap();
        assert_eq!(selection.checker.name(), "json");
    }

    #[test]
    fn rule_overrides_extract_key_and_raises_test_flag() {
        let mut override_rule = rule("r", r"example\.com", "curl", 50);
        override_rule.version_extract_key = "DownloadFor".to_string();
        override_rule.check_test_version = true;
        let selector = selector(&[override_rule]);

        let selection = selector.select("https://example.com", "caller-key", false).unwrap();
        assert_eq!(selection.extract_key, "DownloadFor");
        assert!(selection.check_test_version);
    }

    #[test]
    fn empty_rule_key_keeps_the_callers() {
        let selector = selector(&[rule("r", r"example\.com", "curl", 50)]);
        let selection = selector.select("https://example.com", "caller-key", false).unwrap();
        assert_eq!(selection.extract_key, "caller-key");
        assert!(!selection.check_test_version);
    }

    #[test]
    fn unmatched_url_falls_back_to_github() {
        let selector = selector(&[rule("r", r"gitee\.com", "gitee", 50)]);
        let selection = selector
            .select("https://github.com/foo/bar", "", false)
            .unwrap();
        assert_eq!(selection.checker.name(), "github");
    }

    #[test]
    fn invalid_pattern_fails_the_load() {
        let registry = Arc::new(builtin_registry(&Default::default()));
        let result = CheckerSelector::new(registry, &[rule("bad", r"([", "curl", 1)]);
        assert!(matches!(result, Err(CheckError::Configuration(_))));
    }

    #[test]
    fn reload_replaces_rules_atomically() {
        let selector = selector(&[rule("r", r"example\.com", "curl", 50)]);
        selector
            .reload(&[rule("r2", r"example\.com", "json", 50)])
            .unwrap();
        let selection = selector.select("https://example.com", "", false).unwrap();
        assert_eq!(selection.checker.name(), "json");
    }
}
