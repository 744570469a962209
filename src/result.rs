/// `StmError` describes the failure modes of a single transaction attempt.
///
/// Both variants are handled inside of `atomically`. User code only passes
/// them upwards with `?` and never inspects them.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum StmError {
    /// The computation saw an inconsistent state, because a variable it
    /// depends on was changed by another thread. The attempt restarts
    /// immediately.
    Failure,

    /// `retry` was called.
    ///
    /// The attempt blocks until at least one of the read variables has
    /// changed and then restarts.
    Retry,
}

/// Return type of all transactional computations.
pub type StmResult<T> = Result<T, StmError>;
