use std::any::Any;

use super::{TQueue, TQueueLike};
use crate::test_queue_mod;
use crate::{Semaphore, StmResult, Transaction};

/// Bounded FIFO queue.
///
/// The bound is enforced by composing the unbounded queue with a
/// [`Semaphore`] holding one token per free slot: a writer takes a token
/// and retries when none is left, a reader hands its token back. Both
/// steps join the surrounding transaction, so the token count and the
/// buffer can never drift apart.
#[derive(Clone)]
pub struct TBQueue<T> {
    items: TQueue<T>,
    free_slots: Semaphore,
}

impl<T> TBQueue<T>
where
    T: Any + Sync + Send + Clone + PartialEq,
{
    /// Create an empty `TBQueue` that holds at most `capacity` elements.
    pub fn new(capacity: u32) -> TBQueue<T> {
        TBQueue {
            items: TQueue::new(),
            free_slots: Semaphore::new(capacity),
        }
    }
}

impl<T> TQueueLike<T> for TBQueue<T>
where
    T: Any + Sync + Send + Clone + PartialEq,
{
    fn write(&self, transaction: &mut Transaction, value: T) -> StmResult<()> {
        self.free_slots.acquire(transaction)?;
        self.items.write(transaction, value)
    }

    fn read(&self, transaction: &mut Transaction) -> StmResult<T> {
        let value = self.items.read(transaction)?;
        self.free_slots.release(transaction)?;
        Ok(value)
    }

    fn is_empty(&self, transaction: &mut Transaction) -> StmResult<bool> {
        self.items.is_empty(transaction)
    }
}

test_queue_mod!(|| { crate::queues::TBQueue::<i32>::new(1_000_000) });
