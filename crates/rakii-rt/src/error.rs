// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Drop runtime errors.

use rakii::BoxError;
use thiserror::Error;

/// A failure raised by the drop runtime.
#[derive(Debug, Error)]
pub enum DropError {
    /// The lazy initializer failed. `source` is the initializer's error;
    /// `failures` are the drop-chain and error-handler failures that
    /// happened while reacting to it, in the order they occurred.
    #[error("failed to initialize dropping value{}", follow_ups(.failures))]
    Initialization {
        #[source]
        source: BoxError,
        failures: Vec<DropError>,
    },

    /// The drop handler failed while releasing a value.
    #[error("drop handler did not complete")]
    Drop {
        #[source]
        source: BoxError,
    },

    /// An auxiliary release from an error drop chain failed.
    #[error("drop chain did not complete")]
    DropChain {
        #[source]
        source: BoxError,
    },

    /// A registered error handler failed.
    #[error("error handler did not complete")]
    Handler {
        #[source]
        source: BoxError,
    },

    /// The value was already dropped and can't be initialized again.
    #[error("value was already dropped")]
    Dropped,

    /// The value was requested from inside its own initializer.
    #[error("value requested from inside its own initializer")]
    Reentrant,

    /// A teardown action panicked.
    #[error("teardown action panicked: {message}")]
    Panicked { message: String },

    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

impl DropError {
    /// The last drop-chain or handler failure recorded during a failed
    /// initialization.
    pub fn last_failure(&self) -> Option<&DropError> {
        match self {
            DropError::Initialization { failures, .. } => failures.last(),
            _ => None,
        }
    }

    /// Every drop-chain or handler failure recorded during a failed
    /// initialization, in the order they occurred.
    pub fn failures(&self) -> &[DropError] {
        match self {
            DropError::Initialization { failures, .. } => failures,
            _ => &[],
        }
    }

    pub fn is_initialization(&self) -> bool {
        matches!(self, DropError::Initialization { .. })
    }

    /// Find an error of type `E` in this error's source chain.
    pub fn find_cause<E: std::error::Error + 'static>(&self) -> Option<&E> {
        crate::kind::find_in_chain::<E>(self)
    }

    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        DropError::Panicked { message }
    }
}

fn follow_ups(failures: &[DropError]) -> String {
    match failures.len() {
        0 => String::new(),
        1 => " (1 follow-up failure)".to_string(),
        n => format!(" ({n} follow-up failures)"),
    }
}

/// Invalid runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown teardown policy `{0}` (expected `collect` or `first`)")]
    UnknownPolicy(String),
}

/// One or more scope teardown actions failed.
///
/// Every action was attempted. `failures` are in execution order, which is
/// reverse registration order.
#[derive(Debug)]
pub struct TeardownError {
    failures: Vec<BoxError>,
    interrupted: Option<BoxError>,
}

impl TeardownError {
    pub(crate) fn new(failures: Vec<BoxError>) -> Self {
        Self {
            failures,
            interrupted: None,
        }
    }

    /// Record the body error that was already propagating when teardown failed.
    pub(crate) fn interrupting(mut self, error: BoxError) -> Self {
        self.interrupted = Some(error);
        self
    }

    pub fn failures(&self) -> &[BoxError] {
        &self.failures
    }

    pub fn first(&self) -> Option<&BoxError> {
        self.failures.first()
    }

    /// The error the scope body returned, if teardown failed on top of it.
    pub fn interrupted(&self) -> Option<&BoxError> {
        self.interrupted.as_ref()
    }

    pub fn into_failures(self) -> Vec<BoxError> {
        self.failures
    }
}

impl std::fmt::Display for TeardownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.failures.as_slice() {
            [] => write!(f, "scope teardown failed"),
            [only] => write!(f, "scope teardown failed: {}", only),
            [first, rest @ ..] => write!(
                f,
                "scope teardown failed: {} (and {} more)",
                first,
                rest.len()
            ),
        }
    }
}

impl std::error::Error for TeardownError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.interrupted {
            Some(error) => Some(&**error as &(dyn std::error::Error + 'static)),
            None => self
                .failures
                .first()
                .map(|e| &**e as &(dyn std::error::Error + 'static)),
        }
    }
}
