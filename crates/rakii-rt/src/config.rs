// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scope configuration.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Environment variable selecting the teardown policy.
pub const TEARDOWN_POLICY_VAR: &str = "RAKII_TEARDOWN_POLICY";

/// What a scope reports when teardown actions fail.
///
/// Both policies run every action; they differ only in what is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeardownPolicy {
    /// Return every failure, in execution order.
    #[default]
    CollectAll,
    /// Return the first failure; later ones are logged.
    FirstFailure,
}

impl FromStr for TeardownPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "collect" | "collect-all" | "all" => Ok(TeardownPolicy::CollectAll),
            "first" | "first-failure" => Ok(TeardownPolicy::FirstFailure),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for TeardownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownPolicy::CollectAll => write!(f, "collect"),
            TeardownPolicy::FirstFailure => write!(f, "first"),
        }
    }
}

/// Settings for `deferring_with`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeConfig {
    pub teardown_policy: TeardownPolicy,
}

impl ScopeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_teardown_policy(mut self, policy: TeardownPolicy) -> Self {
        self.teardown_policy = policy;
        self
    }

    /// Read `RAKII_TEARDOWN_POLICY`. An unset variable keeps the default;
    /// an invalid one is logged and ignored.
    pub fn from_env() -> Self {
        let config = Self::from_lookup(|var| std::env::var(var).ok());
        tracing::debug!(
            teardown_policy = %config.teardown_policy,
            "scope configuration loaded from environment"
        );
        config
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(TEARDOWN_POLICY_VAR) {
            match raw.parse() {
                Ok(policy) => config.teardown_policy = policy,
                Err(error) => tracing::warn!(%error, "ignoring {}", TEARDOWN_POLICY_VAR),
            }
        }
        config
    }
}
