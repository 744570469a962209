use std::any::Any;
use std::collections::VecDeque;

use super::TQueueLike;
use crate::test_queue_mod;
use crate::{unwrap_or_retry, StmResult, TVar, Transaction};

/// Unbounded FIFO queue over a single ring buffer var.
///
/// Readers and writers all conflict on the one var, which keeps the
/// implementation small. The value-based validation still lets commits
/// that leave the buffer unchanged pass concurrent readers through.
#[derive(Clone)]
pub struct TQueue<T> {
    items: TVar<VecDeque<T>>,
}

impl<T> TQueue<T>
where
    T: Any + Sync + Send + Clone + PartialEq,
{
    /// Create an empty `TQueue`.
    pub fn new() -> TQueue<T> {
        TQueue {
            items: TVar::new(VecDeque::new()),
        }
    }
}

impl<T> Default for TQueue<T>
where
    T: Any + Sync + Send + Clone + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TQueueLike<T> for TQueue<T>
where
    T: Any + Sync + Send + Clone + PartialEq,
{
    fn write(&self, transaction: &mut Transaction, value: T) -> StmResult<()> {
        self.items.modify(transaction, |mut items| {
            items.push_back(value);
            items
        })
    }

    fn read(&self, transaction: &mut Transaction) -> StmResult<T> {
        let mut items = self.items.read(transaction)?;
        // An empty buffer blocks the reader until somebody pushes.
        let value = unwrap_or_retry(items.pop_front())?;
        self.items.write(transaction, items)?;
        Ok(value)
    }

    fn is_empty(&self, transaction: &mut Transaction) -> StmResult<bool> {
        Ok(self.items.read(transaction)?.is_empty())
    }
}

test_queue_mod!(|| { crate::queues::TQueue::<i32>::new() });
