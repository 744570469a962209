use crate::result::*;
use crate::transaction::Transaction;

/// A boxed transactional procedure.
///
/// The n-ary combinators take lists of alternatives with distinct closure
/// types, so the closures have to live behind a common trait object type.
pub type TxFn<T> = Box<dyn Fn(&mut Transaction) -> StmResult<T> + Send>;

/// Build a procedure that runs the first alternative that does not retry.
///
/// Alternatives are tried in order. A retrying alternative has its writes
/// discarded, but its reads are kept, so a fully blocked `select` sleeps
/// until a var of *any* alternative changes.
///
/// `select(vec![])` retries unconditionally with an empty read set and
/// therefore blocks forever. A single alternative behaves exactly like the
/// function itself.
///
/// # Example
///
/// ```
/// # use vstm::*;
/// let var = TVar::new(42);
/// let var2 = var.clone();
///
/// let x = atomically(select(vec![
///     Box::new(|_: &mut Transaction| retry()),
///     Box::new(move |tx: &mut Transaction| var2.read(tx)),
/// ]));
///
/// assert_eq!(x, 42);
/// ```
pub fn select<T>(alternatives: Vec<TxFn<T>>) -> impl Fn(&mut Transaction) -> StmResult<T> + Send {
    move |tx| tx.select(&alternatives)
}

/// Build a procedure that runs all steps in order inside one attempt.
///
/// Either every step commits or none does: a step that retries or sees an
/// inconsistency aborts the composite, and the writes of the earlier steps
/// are discarded with the attempt.
///
/// # Example
///
/// ```
/// # use vstm::*;
/// let a = TVar::new(0);
/// let b = TVar::new(0);
/// let (a2, b2) = (a.clone(), b.clone());
///
/// atomically(compose(vec![
///     Box::new(move |tx: &mut Transaction| a2.write(tx, 1)),
///     Box::new(move |tx: &mut Transaction| b2.write(tx, 2)),
/// ]));
///
/// assert_eq!((a.read_atomic(), b.read_atomic()), (1, 2));
/// ```
pub fn compose(steps: Vec<TxFn<()>>) -> impl Fn(&mut Transaction) -> StmResult<()> + Send {
    move |tx| {
        for step in &steps {
            step(tx)?;
        }
        Ok(())
    }
}
