mod tbqueue;
mod tqueue;

pub use tbqueue::TBQueue;
pub use tqueue::TQueue;

use crate::{StmResult, Transaction};

/// Transactional queue-like structure.
///
/// This is a common interface between the various implementations.
pub trait TQueueLike<T>: Clone + Send {
    /// Pop the head of the queue, or retry until there is an element if it's empty.
    fn read(&self, transaction: &mut Transaction) -> StmResult<T>;
    /// Push to the end of the queue.
    fn write(&self, transaction: &mut Transaction, value: T) -> StmResult<()>;
    /// Check if the queue is empty.
    fn is_empty(&self, transaction: &mut Transaction) -> StmResult<bool>;
}


/// Reuse the same test definitions for each implementation of the `TQueueLike` trait
/// by calling this macro with a function to create a new instance of the queue.
///
/// For example:
/// ```text
/// test_queue_mod!(|| { crate::queues::TQueue::<i32>::new() });
/// ```
#[macro_export]
macro_rules! test_queue_mod {
    ($make:expr) => {
    };
}
