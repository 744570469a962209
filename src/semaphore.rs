use crate::{guard, StmResult, TVar, Transaction};

/// A counting semaphore built on a single `TVar`.
///
/// `acquire` blocks by retrying, so waiting costs no CPU: the transaction
/// sleeps until another thread commits a write to the token counter.
/// Because conflict detection compares counts by value, a release that is
/// immediately re-acquired by a third thread leaves concurrent attempts
/// that observed the same count untouched.
#[derive(Clone, Debug)]
pub struct Semaphore {
    tokens: TVar<u32>,
}

impl Semaphore {
    /// Create a semaphore with `n` free tokens.
    pub fn new(n: u32) -> Semaphore {
        Semaphore {
            tokens: TVar::new(n),
        }
    }

    /// Take one token, or retry until one is free.
    pub fn acquire(&self, tx: &mut Transaction) -> StmResult<()> {
        let n = self.tokens.read(tx)?;
        guard(n > 0)?;
        self.tokens.write(tx, n - 1)
    }

    /// Take one token if one is free, without blocking.
    ///
    /// Returns whether a token was taken.
    pub fn try_acquire(&self, tx: &mut Transaction) -> StmResult<bool> {
        let n = self.tokens.read(tx)?;
        if n > 0 {
            self.tokens.write(tx, n - 1)?;
        }
        Ok(n > 0)
    }

    /// Put one token back.
    pub fn release(&self, tx: &mut Transaction) -> StmResult<()> {
        self.tokens.modify(tx, |n| n + 1)
    }

    /// The number of free tokens, as seen by this transaction.
    pub fn available(&self, tx: &mut Transaction) -> StmResult<u32> {
        self.tokens.read(tx)
    }
}
