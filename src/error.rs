//! Error kinds per spec.md §7. The teacher's dependency graph never pulls in
//! `thiserror`/`anyhow`, so this is a hand-rolled enum with manual `Display`/
//! `Error` impls, matching the teacher's no-framework style everywhere else.
//! Only the genuinely recoverable path (§7 "allocation-counter overflow")
//! is a `Result`; OOM and internal corruption abort the process (see
//! `oom_abort`/`corrupt_abort` below), mirroring the teacher's
//! `mutator::oom_abort`.

use std::fmt;

#[derive(Debug)]
pub enum GcError {
    /// §7: "Allocation-counter overflow from large size additions is
    /// detected and raises a memory exception before the host call."
    AllocationCounterOverflow { requested: usize },
}

impl fmt::Display for GcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcError::AllocationCounterOverflow { requested } => write!(
                f,
                "gc: allocation counter overflow requesting {requested} bytes"
            ),
        }
    }
}

impl std::error::Error for GcError {}

pub type GcResult<T> = Result<T, GcError>;

/// §7: out-of-memory during a host allocation. Not a `Result` — an embedder
/// cannot usefully unwind across this boundary, so we print and abort, the
/// same shape as the teacher's `mutator::oom_abort`.
#[cold]
#[inline(never)]
pub fn oom_abort(what: &str, size: usize) -> ! {
    eprintln!("gc: out of memory allocating {size} bytes ({what})");
    std::process::abort();
}

/// §7: "Internal corruption detected during marking ... aborts the process
/// after printing diagnostics; this is a fatal invariant failure."
#[cold]
#[inline(never)]
pub fn corrupt_abort(what: &str) -> ! {
    eprintln!("gc: fatal internal corruption: {what}");
    eprintln!("{:?}", backtrace::Backtrace::new());
    std::process::abort();
}
