// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Owners of drop delegates.
//!
//! A type that keeps delegates in its fields implements [`DropOwner`] by
//! listing them in declaration order; [`DropOwner::drop_owned`] then
//! releases them newest-first, the order a hand-written destructor would
//! use. Types that manage their resources by hand implement `Droppable`
//! directly and skip `DropOwner`.

use rakii::{BoxError, Droppable};

use crate::error::{DropError, TeardownError};

/// Owner identity for delegates created inside a scope. Its own drop does
/// nothing; the scope's teardown releases the delegates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ScopeOwner;

impl Droppable for ScopeOwner {
    fn drop(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A type whose teardown is the teardown of its drop-tracked fields.
pub trait DropOwner {
    /// Drop-tracked fields in declaration order.
    fn drop_slots(&self) -> Vec<&dyn Droppable>;

    /// Drop every slot in reverse declaration order.
    ///
    /// All slots are attempted; failures are collected in the order they
    /// happened. Slots already dropped (for example through another slot's
    /// error drop chain) are skipped by their own idempotence.
    fn drop_owned(&self) -> Result<(), DropError> {
        let mut failures = Vec::new();
        for slot in self.drop_slots().into_iter().rev() {
            if let Err(error) = Droppable::drop(slot) {
                failures.push(error);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            tracing::debug!(failures = failures.len(), "owner teardown failed");
            Err(TeardownError::new(failures).into())
        }
    }
}
