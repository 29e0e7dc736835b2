// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Drop delegates: lazily initialized, drop-tracked resource slots.
//!
//! A delegate starts uninitialized. The first `get_value()` runs the
//! initializer; success stores the value, failure releases the matching
//! drop-chain links, runs the matching error handlers and reports
//! `DropError::Initialization`. A failed initialization leaves the slot
//! uninitialized, so a later access retries.
//!
//! `drop()` flips the dropped flag with a compare-and-swap. Exactly one
//! caller wins; the winner exchanges the slot for `None` and hands the value
//! to the drop handler. Dropped is terminal: the slot never initializes again.
//!
//! Values are shared as `Arc<T>`. The slot lock is only held to clone or
//! exchange the `Arc`, never while user code runs, so a holder may drop its
//! own delegate and `drop()` never waits for readers. Holders that outlive
//! the drop keep the memory alive; the resource itself has been released.

use std::cell::Cell;
use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use rakii::{BoxError, Droppable};

use crate::accessor::{DefaultOnError, NullOnError};
use crate::error::DropError;
use crate::kind::{find_in_chain, ErrorKind};
use crate::owner::ScopeOwner;
use crate::registry::{ChainLink, ErrorHandler, Registry};

/// Shared handle to a delegate's value.
pub type ValueRef<T> = Arc<T>;

type DropHandler<T> = Arc<dyn Fn(&T) -> Result<(), BoxError> + Send + Sync>;
type Initializer<T> = Arc<dyn Fn() -> Result<T, BoxError> + Send + Sync>;

struct Slot<T> {
    dropped: AtomicBool,
    value: Mutex<Option<Arc<T>>>,
    /// Serializes initializers. The flag is set while this thread runs one.
    init: ReentrantMutex<Cell<bool>>,
    drop_handler: DropHandler<T>,
    initializer: Initializer<T>,
    drop_chain: Registry<ChainLink>,
    error_handlers: Registry<ErrorHandler>,
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        if self.value.get_mut().is_some() {
            tracing::warn!(
                value_type = std::any::type_name::<T>(),
                "drop delegate discarded while still holding a value"
            );
        }
    }
}

/// Clears the initializing flag, also when the initializer panics.
struct Initializing<'a>(&'a Cell<bool>);

impl<'a> Initializing<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Initializing<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A lazily initialized resource released at most once.
///
/// `O` names the owner type the delegate belongs to. Delegates created by a
/// [`DroppingScope`](crate::DroppingScope) use [`ScopeOwner`].
///
/// Cloning a delegate clones the handle, not the slot: clones observe and
/// drop the same value. Use [`copy_without_value`](Self::copy_without_value)
/// for an independent slot with the same configuration.
pub struct DropDelegate<T, O = ScopeOwner> {
    slot: Arc<Slot<T>>,
    _owner: PhantomData<fn() -> O>,
}

impl<T, O> DropDelegate<T, O> {
    /// Create an uninitialized delegate. `drop_handler` releases the value;
    /// it runs once, while other holders may still reference the value.
    pub fn new<D, I>(drop_handler: D, initializer: I) -> Self
    where
        D: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
        I: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::from_parts(
            Arc::new(drop_handler),
            Arc::new(initializer),
            Registry::new(),
            Registry::new(),
        )
    }

    fn from_parts(
        drop_handler: DropHandler<T>,
        initializer: Initializer<T>,
        drop_chain: Registry<ChainLink>,
        error_handlers: Registry<ErrorHandler>,
    ) -> Self {
        Self {
            slot: Arc::new(Slot {
                dropped: AtomicBool::new(false),
                value: Mutex::new(None),
                init: ReentrantMutex::new(Cell::new(false)),
                drop_handler,
                initializer,
                drop_chain,
                error_handlers,
            }),
            _owner: PhantomData,
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.slot.dropped.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.value.lock().is_some()
    }

    /// The value if it was initialized and not yet dropped. Never runs the
    /// initializer.
    pub fn nullable_value(&self) -> Option<ValueRef<T>> {
        self.slot.value.lock().clone()
    }

    /// The value, initializing it on first access.
    ///
    /// Calling this from inside the delegate's own initializer returns
    /// `DropError::Reentrant`.
    pub fn get_value(&self) -> Result<ValueRef<T>, DropError> {
        if let Some(value) = self.nullable_value() {
            return Ok(value);
        }

        let init = self.slot.init.lock();
        if init.get() {
            return Err(DropError::Reentrant);
        }
        // Another thread may have finished while we waited for the lock.
        if let Some(value) = self.nullable_value() {
            return Ok(value);
        }
        if self.is_dropped() {
            return Err(DropError::Dropped);
        }

        let produced = {
            let _initializing = Initializing::enter(&init);
            (self.slot.initializer)()
        };
        match produced {
            Ok(value) => {
                let value = Arc::new(value);
                let mut slot = self.slot.value.lock();
                // Checked under the slot lock: `drop()` sets the flag before
                // it takes the lock, so a value stored here is always seen.
                if self.is_dropped() {
                    std::mem::drop(slot);
                    std::mem::drop(init);
                    if let Err(error) = (self.slot.drop_handler)(&value) {
                        tracing::warn!(error = %error, "releasing value produced after drop failed");
                    }
                    return Err(DropError::Dropped);
                }
                *slot = Some(value.clone());
                tracing::trace!(
                    value_type = std::any::type_name::<T>(),
                    "drop delegate initialized"
                );
                Ok(value)
            }
            Err(error) => {
                std::mem::drop(init);
                Err(self.fail_initialization(error))
            }
        }
    }

    /// Run `f` against the value, initializing it on first access.
    pub fn with_value<R, F>(&self, f: F) -> Result<R, DropError>
    where
        F: FnOnce(&T) -> R,
    {
        let value = self.get_value()?;
        Ok(f(&value))
    }

    fn fail_initialization(&self, error: BoxError) -> DropError {
        let cause: &(dyn Error + 'static) = &*error;
        let links = self.slot.drop_chain.matching(cause);
        let handlers = self.slot.error_handlers.matching(cause);
        tracing::debug!(
            error = %error,
            chain_links = links.len(),
            handlers = handlers.len(),
            "drop delegate failed to initialize"
        );

        let mut failures = Vec::new();
        for link in links {
            if let Err(source) = Droppable::drop(&*link) {
                tracing::warn!(error = %source, "drop chain link failed");
                failures.push(DropError::DropChain { source });
            }
        }
        for handler in handlers {
            if let Err(source) = handler(cause) {
                tracing::warn!(error = %source, "initialization error handler failed");
                failures.push(DropError::Handler { source });
            }
        }

        DropError::Initialization {
            source: error,
            failures,
        }
    }

    /// Release the value. Only the first call can invoke the drop handler,
    /// and only if a value was produced; every other call is a no-op.
    pub fn drop(&self) -> Result<(), DropError> {
        if self
            .slot
            .dropped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let value = self.slot.value.lock().take();
        match value {
            Some(value) => {
                tracing::trace!(
                    value_type = std::any::type_name::<T>(),
                    "dropping delegate value"
                );
                (self.slot.drop_handler)(&value).map_err(|source| DropError::Drop { source })
            }
            None => Ok(()),
        }
    }

    /// A new uninitialized delegate sharing this one's drop handler,
    /// initializer, drop chain and error handlers.
    pub fn copy_without_value(&self) -> Self {
        Self::from_parts(
            self.slot.drop_handler.clone(),
            self.slot.initializer.clone(),
            self.slot.drop_chain.snapshot(),
            self.slot.error_handlers.snapshot(),
        )
    }

    /// Like [`copy_without_value`](Self::copy_without_value), also cloning
    /// the current value if there is one.
    pub fn copy_with_value(&self) -> Self
    where
        T: Clone,
    {
        let copy = self.copy_without_value();
        if let Some(value) = self.nullable_value() {
            *copy.slot.value.lock() = Some(Arc::new(T::clone(&value)));
        }
        copy
    }

    /// Release `droppable` if initialization fails with an error of `kind`.
    pub fn register_drop_on_error<D>(&self, kind: ErrorKind, droppable: D)
    where
        D: Droppable + Send + Sync + 'static,
    {
        self.slot.drop_chain.register(kind, Arc::new(droppable));
    }

    /// Call `callback` if initialization fails with an error of `kind`.
    pub fn register_error_handler<F>(&self, kind: ErrorKind, callback: F)
    where
        F: Fn(&(dyn Error + 'static)) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.slot.error_handlers.register(kind, Arc::new(callback));
    }

    pub fn drop_on_error<D>(self, kind: ErrorKind, droppable: D) -> Self
    where
        D: Droppable + Send + Sync + 'static,
    {
        self.register_drop_on_error(kind, droppable);
        self
    }

    pub fn drop_on_any_error<D>(self, droppable: D) -> Self
    where
        D: Droppable + Send + Sync + 'static,
    {
        self.drop_on_error(ErrorKind::any(), droppable)
    }

    /// Call `callback` with the `E` behind an initialization failure.
    pub fn on_error<E, F>(self, callback: F) -> Self
    where
        E: Error + 'static,
        F: Fn(&E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register_error_handler(ErrorKind::of::<E>(), move |error| {
            match find_in_chain::<E>(error) {
                Some(error) => callback(error),
                None => Ok(()),
            }
        });
        self
    }

    pub fn on_any_error<F>(self, callback: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register_error_handler(ErrorKind::any(), callback);
        self
    }

    /// Accessor that yields `None` instead of failing.
    pub fn null_on_error(self) -> NullOnError<T, O> {
        NullOnError::new(self)
    }

    /// Accessor that falls back to `fallback()` instead of failing.
    pub fn default_on_error<F>(self, fallback: F) -> DefaultOnError<T, O, F>
    where
        F: Fn() -> T,
    {
        DefaultOnError::new(self, fallback)
    }

    pub fn drop_chain_len(&self) -> usize {
        self.slot.drop_chain.len()
    }

    pub fn error_handler_len(&self) -> usize {
        self.slot.error_handlers.len()
    }

    /// Whether two handles refer to the same slot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T: Droppable, O> DropDelegate<T, O> {
    /// Delegate whose drop handler is the value's own `Droppable::drop`.
    pub fn closing<I>(initializer: I) -> Self
    where
        I: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::new(|value: &T| Droppable::drop(value), initializer)
    }
}

impl<T, O> Clone for DropDelegate<T, O> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            _owner: PhantomData,
        }
    }
}

impl<T, O> Droppable for DropDelegate<T, O> {
    fn drop(&self) -> Result<(), BoxError> {
        DropDelegate::drop(self).map_err(Into::into)
    }
}

impl<T, O> fmt::Debug for DropDelegate<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropDelegate")
            .field("value_type", &std::any::type_name::<T>())
            .field("owner", &std::any::type_name::<O>())
            .field("dropped", &self.is_dropped())
            .field("initialized", &self.is_initialized())
            .field("drop_chain", &self.slot.drop_chain)
            .field("error_handlers", &self.slot.error_handlers)
            .finish()
    }
}
