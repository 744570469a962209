// Copyright 2026 vstm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

pub mod control_block;
pub mod log_var;

use std::any::Any;
use std::cell::Cell;
use std::collections::btree_map::Entry::*;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use tracing::{debug, trace};

use self::control_block::ControlBlock;
use self::log_var::LogVar;
use self::log_var::LogVar::*;
use crate::clock;
use crate::result::StmError::*;
use crate::result::*;
use crate::tvar::{Snapshot, TVar, VarControlBlock};

thread_local!(static TRANSACTION_RUNNING: Cell<bool> = const { Cell::new(false) });

/// `TransactionGuard` checks against nested STM calls.
///
/// Use guard, so that it correctly marks the transaction as finished.
struct TransactionGuard;

impl TransactionGuard {
    pub fn new() -> TransactionGuard {
        TRANSACTION_RUNNING.with(|t| {
            assert!(!t.get(), "STM: Nested Transaction");
            t.set(true);
        });
        TransactionGuard
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        TRANSACTION_RUNNING.with(|t| {
            t.set(false);
        });
    }
}

/// `TransactionControl` lets a caller of `atomically_with_control` steer the
/// attempt loop from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionControl {
    /// Keep going: restart or block as the error demands.
    Retry,
    /// Give up and leave `atomically_with_control` with `None`.
    Abort,
}

/// Run a function atomically by using Software Transactional Memory.
/// It calls to `Transaction::with` internally, but is more explicit.
pub fn atomically<T, F>(f: F) -> T
where
    F: Fn(&mut Transaction) -> StmResult<T>,
{
    Transaction::with(f)
}

/// Run a function atomically, with the chance to abort,
/// by using Software Transactional Memory.
/// It calls to `Transaction::with_control` internally, but is more explicit.
pub fn atomically_with_control<T, F, C>(control: C, f: F) -> Option<T>
where
    F: Fn(&mut Transaction) -> StmResult<T>,
    C: FnMut(StmError) -> TransactionControl,
{
    Transaction::with_control(control, f)
}

/// Transaction tracks all the read and written variables.
///
/// It is used for checking vars, to ensure atomicity.
pub struct Transaction {
    /// Map of all vars that map the `VarControlBlock` of a var to a `LogVar`.
    /// The `VarControlBlock` is unique because it uses its address for comparing.
    ///
    /// The logs need to be accessed in a fixed order, to prevent dead-locks on locking.
    vars: BTreeMap<Arc<VarControlBlock>, LogVar>,
}

impl Transaction {
    /// Create a new log.
    ///
    /// Normally you don't need to call this directly.
    /// Use `atomically` instead.
    fn new() -> Transaction {
        Transaction {
            vars: BTreeMap::new(),
        }
    }

    /// Run a function with a transaction.
    ///
    /// It is equivalent to `atomically`.
    pub fn with<T, F>(f: F) -> T
    where
        F: Fn(&mut Transaction) -> StmResult<T>,
    {
        match Transaction::with_control(|_| TransactionControl::Retry, f) {
            Some(t) => t,
            None => unreachable!(),
        }
    }

    /// Run a function with a transaction.
    ///
    /// `with_control` takes another control function, that
    /// can steer the control flow and possibly terminate early.
    ///
    /// `control` can react to counters, timeouts or external inputs.
    ///
    /// It allows the user to fall back to another strategy, like a global lock
    /// in the case of too much contention.
    ///
    /// Please note, that the transaction may still infinitely wait for changes when `retry` is
    /// called and `control` does not abort.
    /// If you need a timeout, another thread should signal this through a `TVar`.
    pub fn with_control<T, F, C>(mut control: C, f: F) -> Option<T>
    where
        F: Fn(&mut Transaction) -> StmResult<T>,
        C: FnMut(StmError) -> TransactionControl,
    {
        let _guard = TransactionGuard::new();

        // Create a log guard for initializing and cleaning up
        // the log.
        let mut transaction = Transaction::new();

        // Loop until success.
        loop {
            // Run the computation.
            match f(&mut transaction) {
                // On success exit loop.
                Ok(t) => {
                    if transaction.commit() {
                        return Some(t);
                    }
                    trace!("commit failed validation, restarting");
                }

                Err(e) => {
                    // Check if the user wants to abort the transaction.
                    if let TransactionControl::Abort = control(e) {
                        return None;
                    }

                    // On retry wait for changes.
                    if let Retry = e {
                        transaction.wait_for_change();
                    }
                }
            }

            // Clear log before retrying computation.
            transaction.clear();
        }
    }

    /// Perform a downcast on a var.
    fn downcast<T: Any + Clone>(var: Arc<dyn Any>) -> T {
        match var.downcast_ref::<T>() {
            Some(s) => s.clone(),
            None => unreachable!("TVar has wrong type"),
        }
    }

    /// Read a variable and return the value.
    ///
    /// The returned value is not always consistent with the current value of the var,
    /// but may be an outdated or not yet committed value.
    ///
    /// The used code should be capable of handling inconsistent states
    /// without running into infinite loops.
    /// Just the commit of wrong values is prevented by STM.
    pub fn read<T: Send + Sync + Any + Clone + PartialEq>(&mut self, var: &TVar<T>) -> StmResult<T> {
        let ctrl = var.control_block().clone();
        // Check if the same var was accessed before.
        let value = match self.vars.entry(ctrl) {
            // If the variable has been accessed before, then load that value.
            Occupied(mut entry) => entry.get_mut().read(),

            // Else load the variable statically.
            Vacant(entry) => {
                // Take a snapshot of value and version as one unit.
                let snapshot = var.control_block().snapshot.read().clone();
                let value = snapshot.value.clone();

                entry.insert(Read(snapshot));
                value
            }
        };

        // For now always succeeds, but that may change later.
        Ok(Transaction::downcast(value))
    }

    /// Write a variable.
    ///
    /// The write is not immediately visible to other threads,
    /// but atomically committed at the end of the computation.
    pub fn write<T: Any + Send + Sync + Clone + PartialEq>(
        &mut self,
        var: &TVar<T>,
        value: T,
    ) -> StmResult<()> {
        // Box the value.
        let boxed = Arc::new(value);

        let ctrl = var.control_block().clone();
        // Update or create new entry.
        match self.vars.entry(ctrl) {
            Occupied(mut entry) => entry.get_mut().write(boxed),
            Vacant(entry) => {
                entry.insert(Write(boxed));
            }
        }

        // For now always succeeds, but that may change later.
        Ok(())
    }

    /// Combine two calculations. When one blocks with `retry`,
    /// run the other, but don't commit the changes in the first.
    ///
    /// If both block, `Transaction::or` still waits for `TVar`s in both functions.
    /// Use `Transaction::or` instead of handling errors directly with the `Result::or`.
    /// The latter does not handle all the blocking correctly.
    pub fn or<T, F1, F2>(&mut self, first: F1, second: F2) -> StmResult<T>
    where
        F1: Fn(&mut Transaction) -> StmResult<T>,
        F2: Fn(&mut Transaction) -> StmResult<T>,
    {
        // Create a backup of the log.
        let mut copy = Transaction {
            vars: self.vars.clone(),
        };

        // Run the first computation.
        let f = first(self);

        match f {
            // Run other on manual retry call.
            Err(Retry) => {
                // Swap, so that self is the current run.
                mem::swap(self, &mut copy);

                // Run other action.
                let s = second(self);

                // If the second alternative saw an inconsistency, then exit.
                match s {
                    Err(Failure) => Err(Failure),
                    s => {
                        self.combine(copy);
                        s
                    }
                }
            }

            // Return success and failure directly.
            x => x,
        }
    }

    /// Choose the first alternative that does not retry.
    ///
    /// `select` generalizes `or` to any number of alternatives. A retrying
    /// alternative's writes are discarded, but its reads stay in the log as
    /// obsolete entries, so that a fully blocked `select` waits on the union
    /// of all read sets.
    ///
    /// With no alternatives the whole read set is empty and the transaction
    /// blocks forever.
    pub fn select<T, F>(&mut self, alternatives: &[F]) -> StmResult<T>
    where
        F: Fn(&mut Transaction) -> StmResult<T>,
    {
        for alt in alternatives {
            // Create a backup of the log.
            let mut copy = Transaction {
                vars: self.vars.clone(),
            };

            match alt(self) {
                Err(Retry) => {
                    // Roll back to the backup, but keep the failed branch's
                    // reads for blocking.
                    mem::swap(self, &mut copy);
                    self.combine(copy);
                }

                // Success and failure leave the loop directly.
                x => return x,
            }
        }

        Err(Retry)
    }

    /// Combine two logs into a single log, to allow waiting for all reads.
    fn combine(&mut self, other: Transaction) {
        // Combine reads.
        for (var, value) in other.vars {
            // Only insert new values.
            if let Some(value) = value.obsolete() {
                self.vars.entry(var).or_insert(value);
            }
        }
    }

    /// Clear the log's data.
    ///
    /// This should be used before redoing a computation, but
    /// nowhere else.
    fn clear(&mut self) {
        self.vars.clear();
    }

    /// Wait for any variable to change,
    /// because the change may lead to a new calculation result.
    fn wait_for_change(&mut self) {
        // Create control block for waiting.
        let ctrl = Arc::new(ControlBlock::new());

        let vars = mem::take(&mut self.vars);
        let mut reads = Vec::with_capacity(vars.len());

        let blocking = vars
            .into_iter()
            .filter_map(|(var, entry)| entry.into_read_snapshot().map(|s| (var, s)))
            // Register the handle and check that no var has been
            // written since the observation.
            .all(|(var, observed)| {
                var.wait(&ctrl);
                let unchanged = {
                    // Take read lock and compare versions. Any commit moves
                    // the version, even one that republishes an equal value,
                    // so a sleeping thread can never miss a write.
                    let guard = var.snapshot.read();
                    guard.version == observed.version
                };
                reads.push(var);
                unchanged
            });

        // If no var has changed, then block.
        if blocking {
            trace!(reads = reads.len(), "retry: blocking on read set");
            // Probably wait until one var has changed.
            ctrl.wait();
            trace!("retry: woken up");
        }

        // Let others know that ctrl is dead.
        // It does not matter, if we set too many
        // to dead since it may slightly reduce performance
        // but not break the semantics.
        for var in &reads {
            var.set_dead();
        }
    }

    /// Write the log back to the variables.
    ///
    /// Return true for success and false, if a read var has changed.
    fn commit(&mut self) -> bool {
        // Use two phase locking for safely writing data back to the vars.

        // First phase: acquire locks in the fixed address order and validate.
        // Check for consistency of all the reads and perform
        // an early return if something is not consistent.

        // Vector of read locks.
        let mut read_vec = Vec::with_capacity(self.vars.len());

        // Vector of tuple (value, lock).
        let mut write_vec = Vec::with_capacity(self.vars.len());

        // Vector of written variables.
        let mut written = Vec::with_capacity(self.vars.len());

        for (var, entry) in &self.vars {
            // Lock the variable and read the value.

            match *entry {
                // We need to take a write lock.
                Write(ref w) | ReadObsoleteWrite(_, ref w) => {
                    // Take write lock.
                    let lock = var.snapshot.write();
                    // Add all data to the vector.
                    write_vec.push((w, lock));
                    written.push(var);
                }

                // We need to check for consistency and
                // take a write lock.
                ReadWrite(ref observed, ref w) => {
                    // Take write lock.
                    let lock = var.snapshot.write();

                    if !still_valid(var, observed, &lock) {
                        trace!("conflict on read-write var");
                        return false;
                    }
                    // Add all data to the vector.
                    write_vec.push((w, lock));
                    written.push(var);
                }
                // Nothing to do. ReadObsolete is only needed for blocking, not
                // for consistency checks.
                ReadObsolete(_) => {}
                // Take read lock and check for consistency.
                Read(ref observed) => {
                    // Take a read lock.
                    let lock = var.snapshot.read();

                    if !still_valid(var, observed, &lock) {
                        trace!("conflict on read var");
                        return false;
                    }

                    read_vec.push(lock);
                }
            }
        }

        // Second phase: write back and release.

        // Release the reads first.
        // This allows other threads to continue quickly.
        drop(read_vec);

        // All writes of one commit share a fresh clock tick as their new
        // version. Read-only commits don't touch the clock.
        if !write_vec.is_empty() {
            let version = clock::tick();
            debug!(version, writes = write_vec.len(), "publishing commit");

            for (value, mut lock) in write_vec {
                // Commit value.
                lock.value = value.clone();
                lock.version = version;
            }
        }

        for var in written {
            // Unblock all threads waiting for it.
            var.wake_all();
        }

        // Commit succeeded.
        true
    }
}

/// Check a logged observation against the live content of the var.
///
/// An unchanged version means an unchanged var, because value and version
/// move together. When the version has moved, the value comparison is
/// authoritative: a commit that republished an equal value must not force
/// readers to restart.
fn still_valid(var: &VarControlBlock, observed: &Snapshot, current: &Snapshot) -> bool {
    current.version == observed.version || var.value_eq(&current.value, &observed.value)
}
