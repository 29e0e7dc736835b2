// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `deferring` and `DroppingScope` through the public API.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rakii_rt::{
    deferring, deferring_with, BoxError, DropError, DroppingScope, Droppable, ScopeConfig,
    TeardownPolicy,
};

type Order = Arc<Mutex<Vec<u32>>>;

fn recorder(order: &Order, n: u32) -> impl FnOnce() + Send + 'static {
    let order = order.clone();
    move || order.lock().unwrap().push(n)
}

#[test]
fn deferred_blocks_run_in_reverse() {
    let order = Order::default();
    let result: Result<(), DropError> = deferring(|scope| {
        scope.defer(recorder(&order, 1));
        scope.defer(recorder(&order, 2));
        Ok(())
    });
    result.unwrap();
    assert_eq!(*order.lock().unwrap(), vec![2, 1]);
}

#[test]
fn all_actions_run_before_body_error_escapes() {
    let order = Order::default();
    let result: Result<(), BoxError> = deferring(|scope| {
        for n in 1..=4 {
            scope.defer(recorder(&order, n));
        }
        Err("body failed".into())
    });
    assert_eq!(result.unwrap_err().to_string(), "body failed");
    assert_eq!(*order.lock().unwrap(), vec![4, 3, 2, 1]);
}

#[test]
fn all_actions_run_before_panic_resumes() {
    let order = Order::default();
    let caught = panic::catch_unwind(AssertUnwindSafe(|| {
        let _: Result<(), DropError> = deferring(|scope| {
            scope.defer(recorder(&order, 1));
            scope.defer(recorder(&order, 2));
            panic!("cancelled");
        });
    }));
    let payload = caught.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"cancelled"));
    assert_eq!(*order.lock().unwrap(), vec![2, 1]);
}

#[test]
fn scope_delegates_are_dropped_only_if_used() {
    let (used, unused) = (Arc::new(AtomicBool::new(false)), Arc::new(AtomicBool::new(false)));
    let (u1, u2) = (used.clone(), unused.clone());
    let result: Result<usize, DropError> = deferring(|scope| {
        let config = scope.register_drop(
            move |_: &String| {
                u1.store(true, Ordering::SeqCst);
                Ok(())
            },
            || Ok("verbose=true".to_string()),
        );
        let _cache = scope.register_drop(
            move |_: &Vec<u8>| {
                u2.store(true, Ordering::SeqCst);
                Ok(())
            },
            || Ok(vec![0; 1024]),
        );
        assert_eq!(scope.len(), 2);
        let len = config.get_value()?.len();
        Ok(len)
    });
    assert_eq!(result.unwrap(), 12);
    assert!(used.load(Ordering::SeqCst));
    assert!(!unused.load(Ordering::SeqCst));
}

#[test]
fn teardown_failures_are_aggregated_after_all_actions_run() {
    let order = Order::default();
    let result: Result<(), DropError> = deferring(|scope| {
        scope.defer(recorder(&order, 1));
        scope.try_defer(|| Err::<(), _>("flush failed"));
        scope.defer(recorder(&order, 3));
        scope.try_defer(|| Err::<(), _>("unlock failed"));
        Ok(())
    });
    assert_eq!(*order.lock().unwrap(), vec![3, 1]);
    let Err(DropError::Teardown(teardown)) = result else {
        panic!("expected a teardown failure");
    };
    let messages: Vec<String> = teardown.failures().iter().map(ToString::to_string).collect();
    assert_eq!(messages, vec!["unlock failed", "flush failed"]);
    assert_eq!(teardown.to_string(), "scope teardown failed: unlock failed (and 1 more)");
}

#[test]
fn first_failure_policy_from_env_style_lookup() {
    let config = ScopeConfig::from_lookup(|var| match var {
        "RAKII_TEARDOWN_POLICY" => Some("first".to_string()),
        _ => None,
    });
    assert_eq!(config.teardown_policy, TeardownPolicy::FirstFailure);

    let result: Result<(), DropError> = deferring_with(&config, |scope| {
        scope.try_defer(|| Err::<(), _>("a"));
        scope.try_defer(|| Err::<(), _>("b"));
        Ok(())
    });
    let Err(DropError::Teardown(teardown)) = result else {
        panic!("expected a teardown failure");
    };
    assert_eq!(teardown.failures().len(), 1);
    assert_eq!(teardown.first().unwrap().to_string(), "b");
}

#[test]
fn standalone_scope_with_closing_values() {
    struct Lock {
        released: Arc<AtomicBool>,
    }

    impl Droppable for Lock {
        fn drop(&self) -> Result<(), BoxError> {
            self.released.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    let released = Arc::new(AtomicBool::new(false));
    let r = released.clone();
    let scope = DroppingScope::new();
    let lock = scope.register_closing(move || {
        Ok(Lock {
            released: r.clone(),
        })
    });
    lock.get_value().unwrap();
    assert!(!released.load(Ordering::SeqCst));
    scope.run_all().unwrap();
    assert!(released.load(Ordering::SeqCst));
    assert!(lock.is_dropped());
}
