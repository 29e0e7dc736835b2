// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Dropping scopes: deferred teardown for function-local resources.
//!
//! A scope collects teardown actions while a block runs and executes them
//! in LIFO order when the block exits. Delegates created through the scope
//! are registered at creation time, before they are ever accessed; tearing
//! down one that was never initialized does nothing.
//!
//! Actions may borrow from the enclosing frame: a `DroppingScope<'scope>`
//! accepts any action that lives for `'scope`, and it runs them all before
//! it goes away.

use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use rakii::{BoxError, Droppable};

use crate::config::TeardownPolicy;
use crate::delegate::DropDelegate;
use crate::error::{DropError, TeardownError};

type TeardownAction<'scope> = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'scope>;

/// Ordered teardown actions for one lexical block.
///
/// `run_all` runs whatever is registered, newest first. A scope dropped
/// with actions still pending runs them too and logs any failure.
pub struct DroppingScope<'scope> {
    actions: Mutex<Vec<TeardownAction<'scope>>>,
    policy: TeardownPolicy,
}

impl<'scope> DroppingScope<'scope> {
    pub fn new() -> Self {
        Self::with_policy(TeardownPolicy::default())
    }

    pub fn with_policy(policy: TeardownPolicy) -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            policy,
        }
    }

    pub fn policy(&self) -> TeardownPolicy {
        self.policy
    }

    /// Run `action` when the scope is torn down.
    pub fn defer<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'scope,
    {
        self.push(Box::new(move || {
            action();
            Ok(())
        }));
    }

    /// Run a fallible `action` when the scope is torn down.
    pub fn try_defer<F, E>(&self, action: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'scope,
        E: Into<BoxError>,
    {
        self.push(Box::new(move || action().map_err(Into::into)));
    }

    fn push(&self, action: TeardownAction<'scope>) {
        self.actions.lock().push(action);
    }

    /// Create a delegate owned by this scope. Its drop is registered now;
    /// the value is only produced on first access.
    pub fn register_drop<T, D, I>(&self, drop_handler: D, initializer: I) -> DropDelegate<T>
    where
        T: Send + Sync + 'static,
        D: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
        I: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.adopt(DropDelegate::new(drop_handler, initializer))
    }

    /// Like [`register_drop`](Self::register_drop), releasing the value
    /// with its own `Droppable::drop`.
    pub fn register_closing<T, I>(&self, initializer: I) -> DropDelegate<T>
    where
        T: Droppable + Send + Sync + 'static,
        I: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.adopt(DropDelegate::closing(initializer))
    }

    /// Like [`register_drop`](Self::register_drop) for values whose Rust
    /// `Drop` already releases them. Teardown gives up the scope's share;
    /// the value goes away with its last holder.
    pub fn register_owned<T, I>(&self, initializer: I) -> DropDelegate<T>
    where
        T: Send + Sync + 'static,
        I: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register_drop(|_: &T| Ok(()), initializer)
    }

    /// Register an existing delegate's drop with this scope.
    pub fn adopt<T, O>(&self, delegate: DropDelegate<T, O>) -> DropDelegate<T, O>
    where
        T: Send + Sync + 'scope,
        O: 'scope,
    {
        let handle = delegate.clone();
        self.try_defer(move || handle.drop());
        delegate
    }

    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.lock().is_empty()
    }

    /// Discard every pending action without running it.
    pub fn reset(&self) {
        let discarded = std::mem::take(&mut *self.actions.lock());
        if !discarded.is_empty() {
            tracing::debug!(discarded = discarded.len(), "dropping scope reset");
        }
    }

    /// Run every pending action, newest first.
    ///
    /// A failing or panicking action does not stop the rest. Actions
    /// deferred while teardown is running are run as well. Failures are
    /// reported according to the scope's [`TeardownPolicy`].
    pub fn run_all(&self) -> Result<(), TeardownError> {
        let mut failures: Vec<BoxError> = Vec::new();
        let mut ran = 0usize;
        loop {
            let batch = std::mem::take(&mut *self.actions.lock());
            if batch.is_empty() {
                break;
            }
            for action in batch.into_iter().rev() {
                ran += 1;
                match panic::catch_unwind(AssertUnwindSafe(action)) {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => failures.push(error),
                    Err(payload) => failures.push(Box::new(DropError::from_panic(payload.as_ref()))),
                }
            }
        }
        tracing::trace!(actions = ran, failures = failures.len(), "dropping scope torn down");

        if failures.is_empty() {
            return Ok(());
        }
        match self.policy {
            TeardownPolicy::CollectAll => Err(TeardownError::new(failures)),
            TeardownPolicy::FirstFailure => {
                let mut failures = failures.into_iter();
                let first: Vec<BoxError> = failures.by_ref().take(1).collect();
                for later in failures {
                    tracing::warn!(error = %later, "additional teardown failure");
                }
                Err(TeardownError::new(first))
            }
        }
    }
}

impl Default for DroppingScope<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DroppingScope<'_> {
    fn drop(&mut self) {
        if self.actions.get_mut().is_empty() {
            return;
        }
        if let Err(error) = self.run_all() {
            tracing::error!(error = %error, "dropping scope failed to tear down");
        }
    }
}

impl std::fmt::Debug for DroppingScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DroppingScope")
            .field("pending", &self.len())
            .field("policy", &self.policy)
            .finish()
    }
}
