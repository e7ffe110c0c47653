//! Error types for upstream checks.
//!
//! Every error carries enough context to decide two things at the retry
//! sites: whether retrying can help at all ([`CheckError::is_retryable`]),
//! and whether the failure is *critical* — nothing about the target will
//! change, so retry loops must stop immediately
//! ([`CheckError::is_critical`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("timeout while checking {0}")]
    Timeout(String),

    #[error("network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied ({status}) for {url}")]
    Permission { url: String, status: u16 },

    #[error("rate limited by {url}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        url: String,
        retry_after_secs: Option<u64>,
    },

    #[error("parse error for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("no checker supports URL '{0}'")]
    Unsupported(String),

    #[error("no checker named '{0}' is registered")]
    CheckerNotFound(String),

    #[error("check cancelled for {0}")]
    Cancelled(String),

    #[error("pending request limit of {0} reached")]
    QueueFull(usize),
}

impl CheckError {
    /// Classify a transport failure from reqwest against the originating URL.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return CheckError::Timeout(url.to_string());
        }
        if err.is_builder() {
            return CheckError::InvalidUrl(url.to_string());
        }
        CheckError::Network {
            url: url.to_string(),
            source: err,
        }
    }

    /// Map a non-success HTTP status to the matching error kind.
    pub fn from_status(url: &str, status: u16) -> Self {
        match status {
            401 | 403 => CheckError::Permission {
                url: url.to_string(),
                status,
            },
            404 => CheckError::NotFound(url.to_string()),
            429 => CheckError::RateLimited {
                url: url.to_string(),
                retry_after_secs: None,
            },
            _ => CheckError::Http {
                url: url.to_string(),
                status,
            },
        }
    }

    /// Whether a later retry has any chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckError::Timeout(_) | CheckError::Network { .. } | CheckError::RateLimited { .. } => {
                true
            }
            CheckError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the failure is terminal for the whole retry sequence: bad
    /// URLs, unsupported schemes, unresolvable hosts, cancellation and
    /// timeouts will not improve on retry.
    pub fn is_critical(&self) -> bool {
        match self {
            CheckError::InvalidUrl(_)
            | CheckError::Unsupported(_)
            | CheckError::CheckerNotFound(_)
            | CheckError::Cancelled(_)
            | CheckError::Timeout(_) => true,
            CheckError::Network { source, .. } => {
                // DNS failures surface as connect errors whose message names
                // the host lookup; keep the match on the rendered chain.
                let rendered = format!("{source:?}").to_ascii_lowercase();
                rendered.contains("dns") || rendered.contains("no such host")
            }
            _ => false,
        }
    }
}
