use crate::tvar::{ArcAny, Snapshot};

/// `LogVar` is used by `Transaction` to track which `Var` was either read or
/// written or both. Depending on the state, the commit has to publish, check
/// consistency or block on this var.
///
/// Entries that originate in a read carry the observed `Snapshot`, so that
/// validation can compare versions and values against the live var.
#[derive(Clone)]
pub enum LogVar {
    /// Var has been read.
    Read(Snapshot),

    /// Var has been written and no dependency on the original exists.
    ///
    /// There is no need to check for consistency.
    Write(ArcAny),

    /// ReadWrite(observation, written value).
    ///
    /// Var has been read first and then written.
    ///
    /// It needs to be checked for consistency.
    ReadWrite(Snapshot, ArcAny),

    /// Var has been read on a blocked path.
    ///
    /// Don't check for consistency, but block on the var,
    /// so that the thread wakes up when the abandoned path
    /// would become runnable again.
    ReadObsolete(Snapshot),

    /// ReadObsoleteWrite(observation, written value).
    ///
    /// Var has been read on a blocked path and then written to.
    ///
    /// Don't check for consistency, but block on the var.
    ReadObsoleteWrite(Snapshot, ArcAny),
    // Here would be WriteObsolete, but the write onlies can be discarded
    // immediately and don't need a representation in the log.
}

impl LogVar {
    /// Read a value and potentially upgrade the state.
    pub fn read(&mut self) -> ArcAny {
        use self::LogVar::*;

        let this;
        let val;
        match &*self {
            // Use the last read or written value.
            Read(ref s) => {
                return s.value.clone();
            }
            Write(ref v) | ReadWrite(_, ref v) => {
                return v.clone();
            }

            ReadObsoleteWrite(ref s, ref v) => {
                val = v.clone();
                this = ReadWrite(s.clone(), v.clone());
            }

            // Upgrade to a real Read.
            ReadObsolete(ref s) => {
                val = s.value.clone();
                this = Read(s.clone());
            }
        };
        *self = this;
        val
    }

    /// Write a value and potentially upgrade the state.
    pub fn write(&mut self, w: ArcAny) {
        use self::LogVar::*;

        let this = self.clone();

        *self = match this {
            Write(_) => Write(w),

            // Register write.
            ReadObsolete(s) | ReadObsoleteWrite(s, _) => ReadObsoleteWrite(s, w),

            // Register write.
            Read(s) | ReadWrite(s, _) => ReadWrite(s, w),
        };
    }

    /// Turn `self` into an obsolete version.
    ///
    /// Used when a `select`/`or` branch is abandoned: its reads must still
    /// be blocked on, but no longer checked or published.
    pub fn obsolete(self) -> Option<LogVar> {
        self.into_read_snapshot().map(LogVar::ReadObsolete)
    }

    /// Ignore all writes and get the observation a read-origin entry is
    /// based on.
    pub fn into_read_snapshot(self) -> Option<Snapshot> {
        use self::LogVar::*;
        match self {
            Read(s) | ReadWrite(s, _) | ReadObsolete(s) | ReadObsoleteWrite(s, _) => Some(s),
            Write(_) => None,
        }
    }
}
