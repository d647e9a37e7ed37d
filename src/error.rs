//! Crate-wide error type.
//!
//! `odb` does not use `std::process::exit` or panics for user-facing
//! failures (aside from allocation failure and a small number of
//! invariant violations that indicate a bug in the caller or in this
//! crate itself). Every fallible public operation returns
//! [`Result`], threaded with `?` the way the rest of the crate expects.

use std::{fmt, io, result};

/// Crate-wide `Result` alias.
pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Index or group construction was given an invalid combination of
    /// arguments: null/absent comparator, negative key length, or a
    /// `keygen` supplied without a matching `keylen` (or vice versa).
    InvalidConstruction(String),
    /// A `Handle`/record bearing one `Odb`'s ident was submitted to a
    /// different context's index or group. The operation is declined;
    /// no mutation took place.
    IntegrityMismatch,
    /// `remove_at`/`remove_addr` found nothing to remove.
    NotFound,
    /// The watchdog observed resident memory above its configured cap.
    MemoryLimitExceeded { rss: u64, limit: u64 },
    /// A workload was submitted to the scheduler with an invalid flag
    /// combination (`BACKGROUND | HIGH_PRIORITY`), or with a flag this
    /// scheduler does not support (`URGENT`).
    SchedulerInvalid(String),
    /// The scheduler's worker pool has no threads to run work on.
    SchedulerNotRunning,
    /// Underlying I/O failure, surfaced by the default file archiver.
    Io(io::Error),
    /// A numeric conversion (e.g. `usize` -> `u32`) would lose
    /// information.
    FailConversion(String),
    /// The operation is not meaningful for this datastore/index variant
    /// (e.g. `get_at` on a linked-list datastore, `reserve` on an
    /// indirect datastore).
    Unsupported(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidConstruction(msg) => {
                write!(f, "invalid construction: {}", msg)
            }
            Error::IntegrityMismatch => write!(f, "integrity mismatch: ident did not match"),
            Error::NotFound => write!(f, "not found"),
            Error::MemoryLimitExceeded { rss, limit } => {
                write!(f, "memory limit exceeded: rss={} limit={}", rss, limit)
            }
            Error::SchedulerInvalid(msg) => write!(f, "invalid workload: {}", msg),
            Error::SchedulerNotRunning => write!(f, "scheduler is not running"),
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::FailConversion(msg) => write!(f, "conversion failed: {}", msg),
            Error::Unsupported(msg) => write!(f, "unsupported operation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// Convert a value via `TryInto`, wrapping the failure as
/// [`Error::FailConversion`]. Mirrors the teacher's `convert_at!` macro.
macro_rules! convert_at {
    ($from:expr) => {
        std::convert::TryInto::try_into($from)
            .map_err(|_| crate::error::Error::FailConversion(stringify!($from).to_string()))
    };
}

pub(crate) use convert_at;
