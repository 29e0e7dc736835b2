// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Droppable capability.
//!
//! A `Droppable` owns something that has to be released explicitly, exactly
//! once, with a release step that can fail. Rust's own `Drop` cannot report
//! failure, so the drop action here returns a `Result` and callers decide
//! what to do with it.

mod guard;

pub use guard::DropGuard;

/// Error type for every user-supplied failure (initializers, drop actions,
/// error handlers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A value with a user-defined drop action.
///
/// Implementations should be idempotent where they can; the runtime only
/// guarantees at-most-once for values it owns through a delegate.
pub trait Droppable {
    /// Release the resource.
    fn drop(&self) -> Result<(), BoxError>;

    /// Move `self` into a guard that drops it when the guard goes out of scope.
    fn into_guard(self) -> DropGuard<Self>
    where
        Self: Sized,
    {
        DropGuard::new(self)
    }
}

/// Droppable backed by a closure. Built with [`drop_fn`].
pub struct DropFn<F> {
    f: F,
}

impl<F> Droppable for DropFn<F>
where
    F: Fn() -> Result<(), BoxError>,
{
    fn drop(&self) -> Result<(), BoxError> {
        (self.f)()
    }
}

impl<F> std::fmt::Debug for DropFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DropFn(<closure>)")
    }
}

/// Turn a closure into a `Droppable`.
///
/// ```
/// use rakii::{drop_fn, Droppable};
///
/// let d = drop_fn(|| Ok(()));
/// assert!(Droppable::drop(&d).is_ok());
/// ```
pub fn drop_fn<F>(f: F) -> DropFn<F>
where
    F: Fn() -> Result<(), BoxError>,
{
    DropFn { f }
}
