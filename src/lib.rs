// Copyright 2026 vstm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! This library implements
//! [software transactional memory](https://en.wikipedia.org/wiki/Software_transactional_memory),
//! often abbreviated with STM, with versioned variables.
//!
//! Threads coordinate updates to shared [`TVar`]s through atomic
//! transactions. A transaction is a procedure that reads and writes vars;
//! the runtime makes it take effect as one indivisible step against a
//! consistent snapshot, or reruns it until it can. All reads and writes go
//! into a per-attempt log. When the procedure has finished and the observed
//! values are still current, the writes are committed as a single atomic
//! operation under one fresh tick of a global commit clock. Otherwise the
//! computation repeats. This may lead to starvation under heavy contention,
//! but avoids the common sources of locking bugs.
//!
//! Whether an observation is still current is decided by *value*: every var
//! carries a version stamped by the commit that wrote it, and a read
//! validates if the version is untouched or the stored value still equals
//! the observed one. A commit that republishes an equal value never forces
//! readers to rerun.
//!
//! A transaction may also [`retry`]: the attempt is abandoned and the thread
//! sleeps until another commit writes one of the vars the attempt has read.
//! [`select`] builds a procedure out of alternatives and takes the first one
//! that does not retry; [`compose`] chains procedures into one atomic step.
//!
//! # Usage
//!
//! You can run a top-level atomic operation by calling `atomically`.
//!
//! ```
//! # use vstm::atomically;
//! atomically(|_| {
//!     // some action
//!     // return value as `StmResult`, for example
//!     Ok(42)
//! });
//! ```
//!
//! Nested calls to `atomically` are not allowed. A run-time check prevents
//! this. Instead of using `atomically` internally, add a `&mut Transaction`
//! parameter and return [`StmResult`], so that callers can compose the
//! function into larger transactions.
//!
//! Use `?` on `StmResult` to propagate a transaction error through the
//! system. Do not handle the error yourself.
//!
//! ```
//! # use vstm::{atomically, TVar};
//! let var = TVar::new(0);
//!
//! let x = atomically(|tx| {
//!     var.write(tx, 42)?; // Pass failure to parent.
//!     var.read(tx) // Return the value saved in var.
//! });
//!
//! println!("var = {}", x);
//! // var = 42
//! ```
//!
//! # Transaction safety
//!
//! Software transactional memory is completely safe in the rust sense, so
//! undefined behavior will never occur.
//! Still there are multiple rules that
//! you should obey when dealing with software transactional memory.
//!
//! * Don't run code with side effects, especially no IO-code.
//!   Transactions repeat in failure cases. Using IO would repeat this IO-code.
//!   Return a closure if you have to.
//! * Don't handle `StmResult` yourself.
//!   Use `Transaction::or`, `select` or `optionally` to combine alternative
//!   paths. Always use `?` and never ignore a `StmResult`.
//! * Don't run `atomically` inside of another. `atomically` is designed to
//!   have side effects and will therefore break transaction safety.
//!   Nested calls are detected at runtime and handled with panicking.
//! * Don't mix locks and transactions. Your code will easily deadlock or
//!   slow down unpredictably.
//! * Don't use inner mutability to change the content of a `TVar`. The
//!   conflict detection compares values; a payload mutated behind the
//!   library's back breaks its assumptions.
//!
//! Panicking in a transaction is transaction-safe. The transaction aborts
//! and all changes are discarded. No poisoning or half written transactions
//! happen.
//!
//! # Speed
//!
//! Generally keep your atomic blocks as small as possible, because
//! the more time you spend, the more likely it is to collide with
//! other threads. For STM, reading `TVar`s is quite slow, because it
//! needs to look them up in the log every time.
//! Every used `TVar` increases the chance of collisions. Therefore you
//! should keep the amount of accessed variables as low as needed.

mod clock;
mod combinators;
pub mod queues;
mod result;
mod semaphore;
mod transaction;
mod tvar;


pub use combinators::{compose, select, TxFn};
pub use result::{StmError, StmResult};
pub use semaphore::Semaphore;
pub use transaction::{atomically, atomically_with_control, Transaction, TransactionControl};
pub use tvar::{ArcAny, Snapshot, TVar, VarControlBlock};

/// Call `retry` to abort an operation and run the whole transaction again.
///
/// Semantically `retry` allows spin-lock-like behavior, but the library
/// blocks until one of the used `TVar`s has changed, to keep CPU-usage low.
///
/// `Transaction::or` and `select` allow to define alternatives. If the first
/// function wants to retry, then the next one has a chance to run.
///
/// # Examples
///
/// ```no_run
/// # use vstm::*;
/// let infinite_retry: i32 = atomically(|_| retry());
/// ```
#[inline]
pub fn retry<T>() -> StmResult<T> {
    Err(StmError::Retry)
}

/// Retry until `cond` is true.
///
/// # Example
///
/// ```
/// # use vstm::*;
/// let var = TVar::new(42);
///
/// let x = atomically(|tx| {
///     let v = var.read(tx)?;
///     guard(v == 42)?;
///     // v is now always 42.
///     Ok(v)
/// });
/// assert_eq!(x, 42);
/// ```
#[inline]
pub fn guard(cond: bool) -> StmResult<()> {
    if cond {
        Ok(())
    } else {
        retry()
    }
}

/// Unwrap `Option` or call retry if it is `None`.
///
/// `unwrap_or_retry` is the inverse of `optionally`.
///
/// # Example
///
/// ```
/// # use vstm::*;
/// let x = TVar::new(Some(42));
///
/// atomically(|tx| {
///     let inner = unwrap_or_retry(x.read(tx)?)?;
///     assert_eq!(inner, 42); // inner is always 42.
///     Ok(inner)
/// });
/// ```
#[inline]
pub fn unwrap_or_retry<T>(option: Option<T>) -> StmResult<T> {
    match option {
        Some(x) => Ok(x),
        None => retry(),
    }
}

/// Optionally run a transaction `f`. If `f` fails with a `retry()`, it does
/// not cancel the whole transaction, but returns `None`.
///
/// Note that `optionally` does not always recover the function, if
/// inconsistencies were found.
///
/// `optionally` is the inverse of `unwrap_or_retry`.
///
/// # Example
///
/// ```
/// # use vstm::*;
/// let x: Option<i32> = atomically(|tx|
///     optionally(tx, |_| retry()));
/// assert_eq!(x, None);
/// ```
#[inline]
pub fn optionally<T, F>(tx: &mut Transaction, f: F) -> StmResult<Option<T>>
where
    F: Fn(&mut Transaction) -> StmResult<T>,
{
    tx.or(|t| f(t).map(Some), |_| Ok(None))
}

#[cfg(test)]
mod test_lib {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::thread;
    use std::time::Duration;

    use test_log::test;

    #[test]
    fn infinite_retry() {
        let terminated = test::terminates(300, || {
            let _infinite_retry: i32 = atomically(|_| retry());
        });
        assert!(!terminated);
    }

    #[test]
    fn stm_nested() {
        let var = TVar::new(0);

        let x = atomically(|tx| {
            var.write(tx, 42)?;
            var.read(tx)
        });

        assert_eq!(42, x);
    }

    /// Reading a variable written in the same transaction returns the
    /// previously written value.
    #[test]
    fn read_previously_written() {
        let var = TVar::new(3);

        atomically(|tx| {
            var.write(tx, 5)?;
            let v = var.read(tx)?;
            guard(v == 5)
        });
    }

    /// Run multiple threads.
    ///
    /// Thread 1: Read a var, block until it is not 0 and then
    /// return that value.
    ///
    /// Thread 2: Wait a bit. Then write a value.
    ///
    /// Check if Thread 1 is woken up correctly and then check for
    /// correctness.
    #[test]
    fn threaded() {
        let var = TVar::new(0);
        // Clone for the other thread.
        let varc = var.clone();

        let x = test::run_async(
            800,
            move || {
                atomically(|tx| {
                    let x = varc.read(tx)?;
                    if x == 0 {
                        retry()
                    } else {
                        Ok(x)
                    }
                })
            },
            || {
                thread::sleep(Duration::from_millis(100));

                atomically(|tx| var.write(tx, 42));
            },
        )
        .unwrap();

        assert_eq!(42, x);
    }

    /// Test if a STM calculation is rerun when a var changes while executing.
    #[test]
    fn read_write_interfere() {
        // Create var.
        let var = TVar::new(0);
        let varc = var.clone(); // Clone for other thread.

        // Spawn a thread.
        let t = thread::spawn(move || {
            atomically(|tx| {
                // Read the var.
                let x = varc.read(tx)?;
                // Ensure that the var changes in between.
                thread::sleep(Duration::from_millis(500));

                // Write back modified data. This should only
                // happen when the value has not changed.
                varc.write(tx, x + 10)
            });
        });

        // Ensure that the thread has started and already read the var.
        thread::sleep(Duration::from_millis(100));

        // Now change it.
        atomically(|tx| var.write(tx, 32));

        // Finish and compare.
        let _ = t.join();
        assert_eq!(42, var.read_atomic());
    }

    /// 500 threads decrement the same var by one. Each decrement commits
    /// exactly once, whatever the interleaving.
    #[test]
    fn concurrent_decrement() {
        let x = TVar::new(1000);

        let handles: Vec<_> = (0..500)
            .map(|_| {
                let x = x.clone();
                thread::spawn(move || atomically(|tx| x.modify(tx, |v| v - 1)))
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(500, x.read_atomic());
    }

    /// Read-only transactions still validate their whole read set.
    ///
    /// The transaction reads `x`, lets another thread write `x` and then
    /// reads `y`. Returning the stale `x` together with `y` would be an
    /// inconsistent snapshot, so the attempt has to rerun.
    #[test]
    fn read_set_validation() {
        let x = TVar::new(1);
        let y = TVar::new(2);

        // Reader -> writer: "I have read x". Writer -> reader: "I have written x".
        let (read_tx, read_rx) = channel();
        let (wrote_tx, wrote_rx) = channel();

        let xc = x.clone();
        let writer = thread::spawn(move || {
            read_rx.recv().unwrap();
            xc.write_atomic(3);
            wrote_tx.send(()).unwrap();
            // The reader restarts once and hands over a second time.
            read_rx.recv().unwrap();
            wrote_tx.send(()).unwrap();
        });

        let (xv, yv) = atomically(|tx| {
            let xv = x.read(tx)?;
            read_tx.send(()).unwrap();
            wrote_rx.recv().unwrap();
            let yv = y.read(tx)?;
            Ok((xv, yv))
        });

        writer.join().unwrap();

        assert_ne!((1, 2), (xv, yv));
        assert_eq!((3, 2), (xv, yv));
    }

    #[derive(Clone, PartialEq, Debug)]
    struct Payload {
        i: i32,
    }

    /// Validation compares values, not allocation addresses.
    ///
    /// A transaction rewrites a field of a structured payload. A concurrent
    /// reader that observed the old payload must rerun and see the new one.
    #[test]
    fn value_based_verify() {
        let x = TVar::new(Payload { i: 3 });

        let (read_tx, read_rx) = channel();
        let (wrote_tx, wrote_rx) = channel();

        let xc = x.clone();
        let writer = thread::spawn(move || {
            atomically(|tx| {
                read_rx.recv().unwrap();
                let mut p = xc.read(tx)?;
                p.i = 7;
                xc.write(tx, p)
            });
            wrote_tx.send(()).unwrap();
            // One more handover for the reader's rerun.
            read_rx.recv().unwrap();
            wrote_tx.send(()).unwrap();
        });

        let i = atomically(|tx| {
            let p = x.read(tx)?;
            read_tx.send(()).unwrap();
            wrote_rx.recv().unwrap();
            Ok(p.i)
        });

        writer.join().unwrap();

        assert_eq!(7, i);
    }

    /// A concurrent write that republishes an equal value must not force
    /// the reader to rerun, even though it moves the var's version.
    #[test]
    fn equal_value_write_no_restart() {
        let x = TVar::new(1);
        let y = TVar::new(2);
        let attempts = AtomicUsize::new(0);

        let (read_tx, read_rx) = channel();
        let (wrote_tx, wrote_rx) = channel();

        let xc = x.clone();
        let writer = thread::spawn(move || {
            read_rx.recv().unwrap();
            xc.write_atomic(1);
            wrote_tx.send(()).unwrap();
            // Answer any further handovers; none are expected.
            while read_rx.recv().is_ok() {
                let _ = wrote_tx.send(());
            }
        });

        let (xv, yv) = atomically(|tx| {
            attempts.fetch_add(1, Ordering::SeqCst);
            let xv = x.read(tx)?;
            read_tx.send(()).unwrap();
            wrote_rx.recv().unwrap();
            let yv = y.read(tx)?;
            Ok((xv, yv))
        });

        drop(read_tx);
        writer.join().unwrap();

        assert_eq!((1, 2), (xv, yv));
        assert_eq!(1, attempts.load(Ordering::SeqCst));
    }

    /// A blocked reader wakes at most once per writing commit.
    ///
    /// One thread decrements a var from 10 to 0 in separate transactions;
    /// a reader waiting for 0 cannot retry more often than there are
    /// commits.
    #[test]
    fn bounded_retries() {
        let x = TVar::new(10);

        let xc = x.clone();
        let writer = thread::spawn(move || {
            for _ in 0..10 {
                thread::sleep(Duration::from_millis(10));
                atomically(|tx| xc.modify(tx, |v| v - 1));
            }
        });

        let retries = AtomicUsize::new(0);
        atomically(|tx| {
            let cur = x.read(tx)?;
            if cur != 0 {
                retries.fetch_add(1, Ordering::SeqCst);
                retry()
            } else {
                Ok(())
            }
        });

        writer.join().unwrap();

        let retries = retries.load(Ordering::SeqCst);
        assert!(retries <= 10, "expected at most 10 retries, got {}", retries);
    }

    /// An atomic set wakes a transaction blocked on a guard.
    #[test]
    fn atomic_set_wakes_guard() {
        let x = TVar::new(3);
        let xc = x.clone();

        let woke = test::run_async(
            1000,
            move || {
                atomically(|tx| {
                    let v = xc.read(tx)?;
                    guard(v == 5)
                })
            },
            || {
                thread::sleep(Duration::from_millis(10));
                x.write_atomic(5);
            },
        );

        assert_eq!(Some(()), woke);
    }

    /// A blocked select sleeps on the union of the read sets of all its
    /// alternatives; a write into any branch wakes it.
    #[test]
    fn select_wakes_on_any_branch() {
        let a = TVar::new(0);
        let b = TVar::new(0);
        let (ac, bc) = (a.clone(), b.clone());

        let x = test::run_async(
            1000,
            move || {
                atomically(select(vec![
                    Box::new(move |tx: &mut Transaction| {
                        let v = ac.read(tx)?;
                        guard(v != 0)?;
                        Ok("a")
                    }) as TxFn<&'static str>,
                    Box::new(move |tx: &mut Transaction| {
                        let v = bc.read(tx)?;
                        guard(v != 0)?;
                        Ok("b")
                    }),
                ]))
            },
            || {
                thread::sleep(Duration::from_millis(100));
                b.write_atomic(1);
            },
        )
        .unwrap();

        assert_eq!("b", x);
    }

    /// A panic aborts the attempt, publishes nothing and surfaces to the
    /// caller of `atomically` with its payload.
    #[test]
    fn panic_propagates() {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        let x = TVar::new(0);
        let xc = x.clone();

        let res = catch_unwind(AssertUnwindSafe(|| {
            atomically(|tx| -> StmResult<()> {
                xc.write(tx, 42)?;
                panic!("foo")
            })
        }));

        let err = res.unwrap_err();
        assert_eq!(Some(&"foo"), err.downcast_ref::<&str>());

        // The attempt died before its commit; nothing was published.
        assert_eq!(0, x.read_atomic());
    }

    #[test]
    fn or_simple() {
        let var = TVar::new(42);

        let x = atomically(|tx| tx.or(|_| retry(), |tx| var.read(tx)));

        assert_eq!(x, 42);
    }

    /// A variable should not be written,
    /// when another branch was taken.
    #[test]
    fn or_nocommit() {
        let var = TVar::new(42);

        let x = atomically(|tx| {
            tx.or(
                |tx| {
                    var.write(tx, 23)?;
                    retry()
                },
                |tx| var.read(tx),
            )
        });

        assert_eq!(x, 42);
    }

    #[test]
    fn or_nested_first() {
        let var = TVar::new(42);

        let x = atomically(|tx| {
            tx.or(
                |tx| tx.or(|_| retry(), |_| retry()),
                |tx| var.read(tx),
            )
        });

        assert_eq!(x, 42);
    }

    #[test]
    fn or_nested_second() {
        let var = TVar::new(42);

        let x = atomically(|tx| {
            tx.or(
                |_| retry(),
                |tx| tx.or(|tx| var.read(tx), |_| retry()),
            )
        });

        assert_eq!(x, 42);
    }

    #[test]
    fn unwrap_some() {
        let x = Some(42);
        let y = atomically(|_| unwrap_or_retry(x));
        assert_eq!(y, 42);
    }

    #[test]
    fn unwrap_none() {
        let x: Option<i32> = None;
        assert_eq!(unwrap_or_retry(x), retry());
    }

    #[test]
    fn guard_true() {
        let x = guard(true);
        assert_eq!(x, Ok(()));
    }

    #[test]
    fn guard_false() {
        let x = guard(false);
        assert_eq!(x, retry());
    }

    #[test]
    fn optionally_succeed() {
        let x = atomically(|tx| optionally(tx, |_| Ok(42)));
        assert_eq!(x, Some(42));
    }

    #[test]
    fn optionally_fail() {
        let x: Option<i32> = atomically(|tx| optionally(tx, |_| retry()));
        assert_eq!(x, None);
    }
}
