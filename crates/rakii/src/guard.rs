// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scope-exit guard for droppables.
//!
//! Ties a `Droppable` to Rust's ownership: when the guard goes out of scope
//! its value is dropped. Failures inside `Drop` can't be returned, so they
//! are logged; call [`DropGuard::release`] to observe them instead.

use std::ops::Deref;

use crate::{BoxError, Droppable};

/// Drops the wrapped value when the guard itself is dropped.
pub struct DropGuard<D: Droppable> {
    value: Option<D>,
}

impl<D: Droppable> DropGuard<D> {
    pub fn new(value: D) -> Self {
        Self { value: Some(value) }
    }

    /// Drop the value now and report the outcome.
    pub fn release(mut self) -> Result<(), BoxError> {
        match self.value.take() {
            Some(value) => Droppable::drop(&value),
            None => Ok(()),
        }
    }

    /// Disarm the guard and hand the value back without dropping it.
    pub fn into_inner(mut self) -> D {
        match self.value.take() {
            Some(value) => value,
            // `value` is only taken by `release`/`into_inner`, both of which consume the guard.
            None => unreachable!("guard emptied before being consumed"),
        }
    }
}

impl<D: Droppable> Deref for DropGuard<D> {
    type Target = D;

    fn deref(&self) -> &D {
        match &self.value {
            Some(value) => value,
            None => unreachable!("guard emptied before being consumed"),
        }
    }
}

impl<D: Droppable> Drop for DropGuard<D> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            if let Err(error) = Droppable::drop(&value) {
                tracing::error!(error = %error, "guarded value failed to drop");
            }
        }
    }
}

impl<D: Droppable + std::fmt::Debug> std::fmt::Debug for DropGuard<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropGuard").field("value", &self.value).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drop_fn;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn flagged() -> (Arc<AtomicBool>, impl Droppable) {
        let flag = Arc::new(AtomicBool::new(false));
        let f = flag.clone();
        let d = drop_fn(move || {
            f.store(true, Ordering::SeqCst);
            Ok(())
        });
        (flag, d)
    }

    #[test]
    fn drops_on_scope_exit() {
        let (flag, d) = flagged();
        {
            let _guard = d.into_guard();
            assert!(!flag.load(Ordering::SeqCst));
        }
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn release_reports_error() {
        let guard = DropGuard::new(drop_fn(|| Err("busy".into())));
        assert_eq!(guard.release().unwrap_err().to_string(), "busy");
    }

    #[test]
    fn into_inner_disarms() {
        let (flag, d) = flagged();
        let inner = d.into_guard().into_inner();
        assert!(!flag.load(Ordering::SeqCst));
        Droppable::drop(&inner).unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn failure_in_drop_does_not_panic() {
        let guard = DropGuard::new(drop_fn(|| Err("ignored".into())));
        std::mem::drop(guard);
    }
}
