#![forbid(unsafe_code)]

//! Error types.
//!
//! Emitting is deliberately hard to fail: sink-level write errors are
//! swallowed (a logging path must not itself log failures into the stream
//! it is failing to write), terminal-width and caller-resolution problems
//! degrade to fallbacks, and `fatal`/`bail` terminate the process rather
//! than return. The one condition surfaced through `Result` is writing to
//! a logger after it was closed.

use std::io;

/// Errors surfaced by emit operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The logger was closed; its sink may already be gone.
    #[error("write to closed logger")]
    WriteToClosedLogger,
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err {
            Error::WriteToClosedLogger => io::Error::new(io::ErrorKind::BrokenPipe, err),
        }
    }
}
