//! Error types for texweave operations.

use thiserror::Error;

use crate::origin::Origin;

/// Errors that can occur during conversion.
///
/// Everything here is fatal: the pipeline stops and no IR is produced.
/// Recoverable conditions (unresolved references, duplicate citation keys,
/// missing images, failed diagram renders) are reported as warnings through
/// [`crate::diag::Diagnostics`] instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{origin}: unmatched brace")]
    UnmatchedBrace { origin: Origin },

    #[error("{origin}: \\begin{{{begin}}} closed by \\end{{{end}}}")]
    MismatchedEnvironment {
        begin: String,
        end: String,
        origin: Origin,
    },

    #[error("{origin}: \\begin{{{name}}} is never closed")]
    UnmatchedEnvironment { name: String, origin: Origin },

    #[error("{origin}: \\end{{{name}}} without matching \\begin")]
    UnexpectedEnd { name: String, origin: Origin },

    #[error("{origin}: \\{command} is not valid at this depth")]
    UnexpectedSectioningAtDepth { command: String, origin: Origin },

    #[error("cyclic include: {cycle}")]
    CyclicInclude { cycle: String },

    #[error("{origin}: include nesting exceeds {max} levels")]
    IncludeTooDeep { max: usize, origin: Origin },

    #[error("{origin}: label '{key}' declared more than once (first at {first})")]
    DuplicateLabel {
        key: String,
        origin: Origin,
        first: Origin,
    },

    #[error("{origin}: document nesting exceeds {max} levels")]
    NestingTooDeep { max: usize, origin: Origin },

    #[error("root file not found: {0}")]
    RootNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
