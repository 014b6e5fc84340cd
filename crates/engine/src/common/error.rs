//! Error types for workload construction and execution.
//!
//! This module defines the error handling for the engine. It provides:
//! 1. **Emission Errors:** Recoverable failures raised by an encoder or the code stream.
//! 2. **Engine Errors:** The crate-wide error type returned by construction and the pool.
//! 3. **Result Alias:** `Result<T>` over [`Error`].
//!
//! Invariant violations (malformed operand shapes, symbols outside any segment,
//! a broken pointer chain) are not represented here; they panic.

use std::io;

use thiserror::Error as ThisError;

/// Recoverable failure while emitting an instruction sequence.
///
/// Nothing is written to the code buffer when an emission call returns one of these.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum EmitError {
    /// The target cannot encode the requested operation with these operands or flags.
    ///
    /// The associated value names the unsupported combination.
    #[error("unsupported on this target: {0}")]
    Unsupported(&'static str),

    /// The first line of the code buffer is exhausted.
    #[error("code buffer exhausted at line 0")]
    OutOfSpace,

    /// A single sequence is longer than a line can hold next to an inter-line branch.
    #[error("sequence of {len} bytes does not fit a {line}-byte line")]
    TooLong {
        /// Encoded length of the rejected sequence.
        len: usize,
        /// Line size of the stream.
        line: usize,
    },

    /// A branch displacement does not fit the target's encoding.
    #[error("branch displacement {0} out of range")]
    BranchRange(i64),
}

/// Crate-wide error type.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A characteristic or configuration value is out of range.
    #[error("invalid `{field}`: {reason}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A characteristic or configuration document could not be parsed.
    #[error("malformed document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Anonymous memory could not be mapped.
    #[error("failed to map {size} bytes: {source}")]
    Map {
        /// Requested mapping size in bytes.
        size: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Page protection could not be changed.
    #[error("failed to change protection of {size} bytes: {source}")]
    Protect {
        /// Size of the range whose protection was being changed.
        size: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The host cannot make freshly written code coherent with instruction fetch.
    #[error("instruction cache maintenance is not available on this host")]
    CacheSync,

    /// Code emission failed.
    #[error("code generation failed: {0}")]
    Emit(#[from] EmitError),

    /// The code stream accumulated unsupported-encoding errors.
    #[error("code generation reported {0} unsupported encodings")]
    Unsupported(u32),

    /// The executable image could not be serialized.
    #[error("image serialization failed: {0}")]
    Image(String),

    /// Writing the executable image failed.
    #[error("failed to write image: {0}")]
    Io(#[from] io::Error),

    /// The workload targets a foreign instruction set and cannot be executed here.
    #[error("workload for {0} cannot run on this host")]
    NotRunnable(&'static str),

    /// A worker thread could not be created.
    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        /// Index of the worker.
        index: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// CPU affinity could not be applied.
    #[error("failed to set affinity of worker {index}: errno {errno}")]
    Affinity {
        /// Index of the worker.
        index: usize,
        /// Raw error number.
        errno: i32,
    },
}

impl Error {
    /// Builds a [`Error::Validation`] for `field`.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

impl From<object::write::Error> for Error {
    fn from(err: object::write::Error) -> Self {
        Self::Image(err.to_string())
    }
}

/// Result type used throughout the engine.
pub type Result<T, E = Error> = std::result::Result<T, E>;
