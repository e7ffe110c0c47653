//! Name-to-constructor registry for upstream checkers.
//!
//! The registry stores constructors rather than instances so every selection
//! gets a fresh checker and no reference cycle forms between the factory and
//! the checkers it produces. It is not a process global: the service
//! container owns one, and tests build their own.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::checker::error::CheckError;
use crate::checker::traits::UpstreamChecker;

type Constructor = Box<dyn Fn() -> Box<dyn UpstreamChecker> + Send + Sync>;

pub struct CheckerRegistry {
    checkers: RwLock<HashMap<String, Constructor>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self {
            checkers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a constructor under `name`. Registering the same name twice
    /// overwrites the previous constructor with a warning.
    pub fn register<F>(&self, name: &str, constructor: F)
    where
        F: Fn() -> Box<dyn UpstreamChecker> + Send + Sync + 'static,
    {
        let mut checkers = self.checkers.write().unwrap();
        if checkers.insert(name.to_string(), Box::new(constructor)).is_some() {
            warn!(checker = name, "checker already registered, overwriting");
        } else {
            debug!(checker = name, "registered checker");
        }
    }

    /// Instantiate a fresh checker by name.
    pub fn create(&self, name: &str) -> Result<Box<dyn UpstreamChecker>, CheckError> {
        let checkers = self.checkers.read().unwrap();
        checkers
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| CheckError::CheckerNotFound(name.to_string()))
    }

    /// All registered checker names, in unspecified order.
    pub fn names(&self) -> Vec<String> {
        self.checkers.read().unwrap().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checkers.read().unwrap().contains_key(name)
    }
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a registry holding every built-in checker.
pub fn builtin_registry(settings: &crate::config::CheckerSettingsMap) -> CheckerRegistry {
    use crate::checker::{curl, forge, http, json, npm, pypi, redirect};

    let registry = CheckerRegistry::new();

    registry.register("github", || Box::new(forge::ForgeChecker::github()));
    registry.register("gitee", || Box::new(forge::ForgeChecker::gitee()));
    registry.register("gitlab", || Box::new(forge::ForgeChecker::gitlab()));
    registry.register("npm", || Box::new(npm::NpmChecker::new()));
    registry.register("pypi", || Box::new(pypi::PypiChecker::new()));
    registry.register("redirect", || Box::new(redirect::RedirectChecker::new()));
    registry.register("http", || Box::new(http::HttpChecker::new()));
    registry.register("json", || Box::new(json::JsonChecker::new()));

    let curl_settings = settings.get("curl").cloned().unwrap_or_default();
    registry.register("curl", move || {
        Box::new(curl::CurlChecker::new(curl_settings.insecure_skip_tls))
    });

    #[cfg(feature = "headless")]
    {
        use crate::checker::headless;
        let headless_settings = settings.get("headless").cloned().unwrap_or_default();
        let visible = headless_settings
            .custom_params
            .get("headless")
            .is_some_and(|v| v == "false");
        registry.register("headless", move || {
            Box::new(headless::HeadlessChecker::new(
                headless_settings.timeout_seconds,
                !visible,
            ))
        });
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::traits::MockUpstreamChecker;

    fn mock_constructor(name: &'static str) -> impl Fn() -> Box<dyn UpstreamChecker> {
        move || {
            let mut checker = MockUpstreamChecker::new();
            checker.expect_name().return_const(name);
            Box::new(checker)
        }
    }

    #[test]
    fn create_returns_a_fresh_instance_per_call() {
        let registry = CheckerRegistry::new();
        registry.register("mock", mock_constructor("mock"));

        let first = registry.create("mock").unwrap();
        let second = registry.create("mock").unwrap();
        assert_eq!(first.name(), "mock");
        assert_eq!(second.name(), "mock");
    }

    #[test]
    fn create_unknown_name_is_an_error() {
        let registry = CheckerRegistry::new();
        let err = registry.create("nope").unwrap_err();
        assert!(matches!(err, CheckError::CheckerNotFound(_)));
    }

    #[test]
    fn double_registration_overwrites() {
        let registry = CheckerRegistry::new();
        registry.register("mock", mock_constructor("first"));
        registry.register("mock", mock_constructor("second"));

        assert_eq!(registry.create("mock").unwrap().name(), "second");
        assert_eq!(registry.names().len(), 1);
    }

    #[test]
    fn builtin_registry_contains_the_expected_checkers() {
        let registry = builtin_registry(&Default::default());
        for name in ["github", "gitee", "gitlab", "npm", "pypi", "redirect", "http", "json", "curl"]
        {
            assert!(registry.contains(name), "missing {name}");
        }
    }
}
