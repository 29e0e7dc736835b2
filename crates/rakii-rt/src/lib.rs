// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! RAII runtime: drop delegates, dropping scopes and their failure protocol.
//!
//! Components:
//! - delegate: lazily initialized, drop-at-most-once resource slots
//! - kind/registry: error kinds selecting drop-chain links and handlers
//! - accessor: terminal accessors that swallow initialization failures
//! - owner: reverse-declaration-order teardown for delegate owners
//! - scope/deferring: deferred teardown for function-local resources
//! - config: teardown policy
//!
//! The capability crate `rakii` is re-exported, so users depend on this
//! crate alone.

pub mod accessor;
pub mod config;
pub mod deferring;
pub mod delegate;
pub mod error;
pub mod kind;
pub mod owner;
pub mod registry;
pub mod scope;

pub use rakii::{drop_fn, BoxError, DropFn, DropGuard, Droppable};

pub use accessor::{DefaultOnError, NullOnError, Value};
pub use config::{ScopeConfig, TeardownPolicy, TEARDOWN_POLICY_VAR};
pub use deferring::{deferring, deferring_with};
pub use delegate::{DropDelegate, ValueRef};
pub use error::{ConfigError, DropError, TeardownError};
pub use kind::{find_in_chain, ErrorKind};
pub use owner::{DropOwner, ScopeOwner};
pub use registry::{ChainLink, ErrorHandler, Registry};
pub use scope::DroppingScope;
