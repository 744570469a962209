// Copyright 2026 vstm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::atomic::{AtomicU64, Ordering};

/// The global commit clock.
///
/// Every commit that publishes at least one write reserves one tick and
/// stamps it as the new version of all the vars it writes. Read-only commits
/// and blocked attempts leave the clock alone.
///
/// Vars start at version 0 and the first tick is 1, so a fresh var is always
/// older than any commit.
static COMMIT_CLOCK: AtomicU64 = AtomicU64::new(0);

/// Reserve the next commit timestamp.
pub(crate) fn tick() -> u64 {
    COMMIT_CLOCK.fetch_add(1, Ordering::SeqCst) + 1
}

/// The timestamp of the latest writing commit.
#[cfg(test)]
pub(crate) fn now() -> u64 {
    COMMIT_CLOCK.load(Ordering::SeqCst)
}
