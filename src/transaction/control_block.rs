// Copyright 2026 vstm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

/// A one-shot wakeup handle for a blocked transaction.
///
/// When `retry` was called, the transaction blocks on all read variables.
/// The vars hold a weak reference to this block and fire it on their next
/// write. Firing is idempotent; only the first signal matters.
pub struct ControlBlock {
    /// True while the owning transaction still has to sleep.
    ///
    /// It could be put in the mutex, but that may
    /// block a thread that is currently releasing
    /// multiple variables on writing that value.
    blocked: AtomicBool,

    /// A lock needed for the condition variable.
    lock: Mutex<()>,

    /// Condition variable that is used for pausing and
    /// waking the thread.
    wait_cvar: Condvar,
}

impl ControlBlock {
    /// Create a new `ControlBlock`.
    pub fn new() -> ControlBlock {
        ControlBlock {
            blocked: AtomicBool::new(true),
            lock: Mutex::new(()),
            wait_cvar: Condvar::new(),
        }
    }

    /// Inform the control block that a variable has changed.
    ///
    /// Called by writers from outside the blocked transaction. The notify
    /// happens while holding the handle's lock, so a sleeper that has seen
    /// `blocked == true` but not parked yet cannot miss its only wakeup.
    pub fn set_changed(&self) {
        self.blocked.store(false, Ordering::SeqCst);
        let _guard = self.lock.lock();
        self.wait_cvar.notify_one();
    }

    /// Block until one variable has changed.
    ///
    /// `wait` may immediately return.
    ///
    /// `wait` needs to be called by the blocked transaction itself.
    pub fn wait(&self) {
        let mut guard = self.lock.lock();
        while self.blocked.load(Ordering::SeqCst) {
            self.wait_cvar.wait(&mut guard);
        }
    }
}

// TESTS
