//! Solver endpoint configuration.

use std::env;

pub const ENV_BASE_URL: &str = "SOLVER_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "SOLVER_TIMEOUT_SECS";
pub const ENV_TIME_LIMIT_SECONDS: &str = "SOLVER_TIME_LIMIT_SECONDS";

#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Base URL of the solver service; solving is unavailable without it.
    pub base_url: Option<String>,
    /// Timeout for a whole solve request.
    pub timeout_secs: u64,
    /// Wall-clock limit passed to the solver when the request sets none.
    pub time_limit_seconds: Option<f64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
            time_limit_seconds: None,
        }
    }
}

impl SolverConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    /// Reads `SOLVER_BASE_URL`, `SOLVER_TIMEOUT_SECS` and
    /// `SOLVER_TIME_LIMIT_SECONDS`; unparsable values keep the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: lookup(ENV_BASE_URL)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            timeout_secs: lookup(ENV_TIMEOUT_SECS)
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(defaults.timeout_secs),
            time_limit_seconds: lookup(ENV_TIME_LIMIT_SECONDS)
                .and_then(|value| value.trim().parse().ok())
                .filter(|limit: &f64| limit.is_finite() && *limit > 0.0),
        }
    }

    /// The base URL without trailing slashes, if one is configured.
    pub fn endpoint(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }
}
