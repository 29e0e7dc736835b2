// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The `deferring` entry point.
//!
//! `deferring` hands a fresh [`DroppingScope`] to its body and tears the
//! scope down on every exit path: normal return, error return, or panic.
//! Teardown finishes before `deferring` returns or the panic resumes, so
//! deferred actions may borrow anything that outlives the call.

use std::panic::{self, AssertUnwindSafe};

use rakii::BoxError;

use crate::config::ScopeConfig;
use crate::error::DropError;
use crate::scope::DroppingScope;

/// Run `body` with a new scope and tear the scope down afterwards.
///
/// Outcomes:
/// - body `Ok`, teardown clean: the body's value.
/// - body `Ok`, teardown failed: `DropError::Teardown`.
/// - body `Err`, teardown clean: the body's error, unchanged.
/// - body `Err`, teardown failed: `DropError::Teardown`, with the body's
///   error available as [`TeardownError::interrupted`](crate::TeardownError::interrupted).
/// - body panicked: teardown runs, its failures are logged, the panic resumes.
///
/// ```
/// use std::sync::Mutex;
/// use rakii_rt::{deferring, DropError};
///
/// let order = Mutex::new(Vec::new());
/// deferring(|scope| {
///     scope.defer(|| order.lock().unwrap().push(1));
///     scope.defer(|| order.lock().unwrap().push(2));
///     Ok::<_, DropError>(())
/// })
/// .unwrap();
/// assert_eq!(*order.lock().unwrap(), vec![2, 1]);
/// ```
pub fn deferring<'env, R, E, F>(body: F) -> Result<R, E>
where
    F: FnOnce(&DroppingScope<'env>) -> Result<R, E>,
    E: From<DropError> + Into<BoxError>,
{
    deferring_with(&ScopeConfig::default(), body)
}

/// [`deferring`] with an explicit configuration.
pub fn deferring_with<'env, R, E, F>(config: &ScopeConfig, body: F) -> Result<R, E>
where
    F: FnOnce(&DroppingScope<'env>) -> Result<R, E>,
    E: From<DropError> + Into<BoxError>,
{
    let scope = DroppingScope::with_policy(config.teardown_policy);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&scope)));
    let teardown = scope.run_all();

    match outcome {
        Ok(Ok(value)) => match teardown {
            Ok(()) => Ok(value),
            Err(error) => Err(DropError::from(error).into()),
        },
        Ok(Err(body_error)) => match teardown {
            Ok(()) => Err(body_error),
            Err(error) => {
                let error = error.interrupting(body_error.into());
                Err(DropError::from(error).into())
            }
        },
        Err(payload) => {
            if let Err(error) = teardown {
                tracing::error!(error = %error, "scope teardown failed while unwinding");
            }
            panic::resume_unwind(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TeardownPolicy;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    type Order = Arc<Mutex<Vec<u32>>>;

    #[test]
    fn invokes_deferred_actions() {
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        let value: Result<u32, DropError> = deferring(|scope| {
            scope.defer(move || r.store(true, Ordering::SeqCst));
            Ok(5)
        });
        assert_eq!(value.unwrap(), 5);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn propagates_defer_errors() {
        let result: Result<(), DropError> = deferring(|scope| {
            scope.try_defer(|| Err::<(), _>("close failed"));
            Ok(())
        });
        match result {
            Err(DropError::Teardown(teardown)) => {
                assert_eq!(teardown.first().unwrap().to_string(), "close failed");
                assert!(teardown.interrupted().is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn body_error_propagates_after_teardown() {
        let order = Order::default();
        let o = order.clone();
        let result: Result<(), BoxError> = deferring(|scope| {
            scope.defer(move || o.lock().unwrap().push(1));
            Err("body failed".into())
        });
        assert_eq!(result.unwrap_err().to_string(), "body failed");
        assert_eq!(*order.lock().unwrap(), vec![1]);
    }

    #[test]
    fn teardown_failure_keeps_body_error() {
        let result: Result<(), DropError> = deferring(|scope| {
            scope.try_defer(|| Err::<(), _>("close failed"));
            Err(DropError::Dropped)
        });
        match result {
            Err(DropError::Teardown(teardown)) => {
                let interrupted = teardown.interrupted().unwrap();
                assert!(matches!(
                    interrupted.downcast_ref::<DropError>(),
                    Some(DropError::Dropped)
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn panicking_body_still_tears_down() {
        let order = Order::default();
        let o = order.clone();
        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), DropError> = deferring(|scope| {
                scope.defer(move || o.lock().unwrap().push(1));
                panic!("body exploded");
            });
        }));
        assert!(caught.is_err());
        assert_eq!(*order.lock().unwrap(), vec![1]);
    }

    #[test]
    fn policy_comes_from_config() {
        let config = ScopeConfig::new().with_teardown_policy(TeardownPolicy::FirstFailure);
        let result: Result<(), DropError> = deferring_with(&config, |scope| {
            assert_eq!(scope.policy(), TeardownPolicy::FirstFailure);
            scope.try_defer(|| Err::<(), _>("older"));
            scope.try_defer(|| Err::<(), _>("newer"));
            Ok(())
        });
        match result {
            Err(DropError::Teardown(teardown)) => assert_eq!(teardown.failures().len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn deferred_actions_borrow_caller_locals() {
        let order = Mutex::new(Vec::new());
        let name = String::from("socket");
        let result: Result<usize, DropError> = deferring(|scope| {
            scope.defer(|| order.lock().unwrap().push(1));
            scope.defer(|| {
                assert_eq!(name, "socket");
                order.lock().unwrap().push(2);
            });
            Ok(name.len())
        });
        assert_eq!(result.unwrap(), 6);
        assert_eq!(*order.lock().unwrap(), vec![2, 1]);
    }

    #[test]
    fn nested_scopes_tear_down_inner_first() {
        let order = Order::default();
        let (outer, inner) = (order.clone(), order.clone());
        let result: Result<(), DropError> = deferring(|scope| {
            scope.defer(move || outer.lock().unwrap().push(1));
            deferring(|nested| {
                nested.defer(move || inner.lock().unwrap().push(2));
                Ok::<_, DropError>(())
            })?;
            Ok(())
        });
        result.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![2, 1]);
    }
}
