// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Kind-keyed registries for drop chains and error handlers.
//!
//! Entries keep registration order. Lookups snapshot the matching entries so
//! the lock is never held while user code runs.

use std::error::Error;
use std::sync::Arc;

use parking_lot::Mutex;
use rakii::{BoxError, Droppable};

use crate::kind::ErrorKind;

/// Auxiliary droppable released when an initialization fails.
pub type ChainLink = Arc<dyn Droppable + Send + Sync>;

/// Callback invoked with the initializer's error.
pub type ErrorHandler = Arc<dyn Fn(&(dyn Error + 'static)) -> Result<(), BoxError> + Send + Sync>;

/// Ordered `(kind, entry)` pairs.
pub struct Registry<E> {
    entries: Mutex<Vec<(ErrorKind, E)>>,
}

impl<E: Clone> Registry<E> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, kind: ErrorKind, entry: E) {
        self.entries.lock().push((kind, entry));
    }

    /// Entries whose kind matches `error`, in registration order.
    pub fn matching(&self, error: &(dyn Error + 'static)) -> Vec<E> {
        self.entries
            .lock()
            .iter()
            .filter(|(kind, _)| kind.matches(error))
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Independent copy holding the same entries.
    pub fn snapshot(&self) -> Self {
        Self {
            entries: Mutex::new(self.entries.lock().clone()),
        }
    }
}

impl<E: Clone> Default for Registry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        f.debug_list()
            .entries(entries.iter().map(|(kind, _)| kind.name()))
            .finish()
    }
}
