// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Error kinds used to select drop-chain links and error handlers.
//!
//! Matching is polymorphic: a kind registered for `E` also catches errors
//! that wrap an `E` somewhere in their `source()` chain, the way a handler
//! for a supertype catches its subtypes.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

type Predicate = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

#[derive(Clone)]
enum Matcher {
    Any,
    Chain(fn(&(dyn Error + 'static)) -> bool),
    Exact(fn(&(dyn Error + 'static)) -> bool),
    Custom(Predicate),
}

/// A class of failures.
#[derive(Clone)]
pub struct ErrorKind {
    name: &'static str,
    matcher: Matcher,
}

impl ErrorKind {
    /// Matches every error.
    pub fn any() -> Self {
        Self {
            name: "any",
            matcher: Matcher::Any,
        }
    }

    /// Matches `E` itself and any error caused by an `E`.
    pub fn of<E: Error + 'static>() -> Self {
        Self {
            name: std::any::type_name::<E>(),
            matcher: Matcher::Chain(caused_by::<E>),
        }
    }

    /// Matches only when the top-level error is an `E`.
    pub fn exact<E: Error + 'static>() -> Self {
        Self {
            name: std::any::type_name::<E>(),
            matcher: Matcher::Exact(is_exactly::<E>),
        }
    }

    /// Matches whatever `predicate` accepts. Useful for families that aren't
    /// separate types, such as one variant of an error enum.
    pub fn matching<F>(name: &'static str, predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        Self {
            name,
            matcher: Matcher::Custom(Arc::new(predicate)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_any(&self) -> bool {
        matches!(self.matcher, Matcher::Any)
    }

    pub fn matches(&self, error: &(dyn Error + 'static)) -> bool {
        match &self.matcher {
            Matcher::Any => true,
            Matcher::Chain(f) | Matcher::Exact(f) => f(error),
            Matcher::Custom(f) => f(error),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorKind").field(&self.name).finish()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn is_exactly<E: Error + 'static>(error: &(dyn Error + 'static)) -> bool {
    error.is::<E>()
}

fn caused_by<E: Error + 'static>(error: &(dyn Error + 'static)) -> bool {
    find_in_chain::<E>(error).is_some()
}

/// Walk `error` and its sources, returning the first `E`.
pub fn find_in_chain<'a, E: Error + 'static>(error: &'a (dyn Error + 'static)) -> Option<&'a E> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(found) = err.downcast_ref::<E>() {
            return Some(found);
        }
        current = err.source();
    }
    None
}
