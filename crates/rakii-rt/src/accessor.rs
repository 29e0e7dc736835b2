// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Terminal accessors that turn initialization failures into values.
//!
//! They wrap `get_value()`; the delegate still runs its drop chain and
//! error handlers on failure, only the error itself is replaced.

use std::fmt;
use std::ops::Deref;

use crate::delegate::{DropDelegate, ValueRef};

/// Either the delegate's value or a fallback produced after a failure.
pub enum Value<T> {
    Held(ValueRef<T>),
    Fallback(T),
}

impl<T> Value<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Value::Fallback(_))
    }
}

impl<T> Deref for Value<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            Value::Held(value) => &**value,
            Value::Fallback(value) => value,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Held(value) => f.debug_tuple("Held").field(&**value).finish(),
            Value::Fallback(value) => f.debug_tuple("Fallback").field(value).finish(),
        }
    }
}

/// Get-only accessor yielding `None` when the delegate can't produce a value.
pub struct NullOnError<T, O> {
    delegate: DropDelegate<T, O>,
}

impl<T, O> NullOnError<T, O> {
    pub(crate) fn new(delegate: DropDelegate<T, O>) -> Self {
        Self { delegate }
    }

    pub fn get(&self) -> Option<ValueRef<T>> {
        match self.delegate.get_value() {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::debug!(error = %error, "dropping value unavailable, yielding none");
                None
            }
        }
    }

    /// The wrapped delegate, for wiring its drop into an owner.
    pub fn delegate(&self) -> &DropDelegate<T, O> {
        &self.delegate
    }
}

/// Get-only accessor yielding a fallback when the delegate can't produce a value.
pub struct DefaultOnError<T, O, F> {
    delegate: DropDelegate<T, O>,
    fallback: F,
}

impl<T, O, F> DefaultOnError<T, O, F>
where
    F: Fn() -> T,
{
    pub(crate) fn new(delegate: DropDelegate<T, O>, fallback: F) -> Self {
        Self { delegate, fallback }
    }

    pub fn get(&self) -> Value<T> {
        match self.delegate.get_value() {
            Ok(value) => Value::Held(value),
            Err(error) => {
                tracing::debug!(error = %error, "dropping value unavailable, using fallback");
                Value::Fallback((self.fallback)())
            }
        }
    }

    pub fn delegate(&self) -> &DropDelegate<T, O> {
        &self.delegate
    }
}
