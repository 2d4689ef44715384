//! Structured error types for the analysis engine.
//!
//! Using thiserror for automatic Display implementation and error chaining,
//! split by the subsystem that raises them: Format, Schema, Consistency,
//! Truncation, Usage, Internal.
//!
//! Consistency errors (stack underflow, tsc rewind) are deliberately *not*
//! part of any `Error` enum here: they downgrade to a warning and a clamp,
//! logged via `log::warn!` at the call site rather than propagated.

use thiserror::Error;

use super::types::{Cpu, EventId, Pid, Tsc};

/// Errors raised while decoding a trace stream's binary layout (C4).
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("sub-buffer header inconsistent with file geometry: buf_size={buf_size} but {remaining} bytes remain")]
    CorruptBlockHeader { buf_size: u32, remaining: u64 },

    #[error("trace header has unsupported architecture: arch_size={arch_size}")]
    UnsupportedArchitecture { arch_size: u32 },

    #[error("trace header magic mismatch: expected 0x{expected:08x}, found 0x{found:08x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("event id {0} is not present in the marker registry")]
    UnknownEventId(EventId),

    #[error("reconstructed tsc {new} is less than previous tsc {previous} on cpu {cpu}")]
    TimestampGoesBackwards { previous: Tsc, new: Tsc, cpu: Cpu },

    #[error("stream for cpu {cpu} ended mid-sub-buffer (writer died)")]
    TruncatedTrace { cpu: Cpu },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while registering or parsing marker/format declarations (C3).
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("marker id {0} used before its declaration")]
    MarkerUsedBeforeDeclared(EventId),

    #[error("conflicting format string declared for marker `{name}`: trace is self-inconsistent")]
    FormatStringConflict { name: String },

    #[error("malformed printf-style format string for marker `{name}`: {reason}")]
    MalformedFormat { name: String, reason: String },
}

/// Errors surfaced directly to the caller without touching engine state
/// (hook registration, filter parsing, seek requests).
#[derive(Error, Debug)]
pub enum UsageError {
    #[error("no hook chain registered at path `{0}`")]
    UnknownHookPath(String),

    #[error("filter parse error at position {pos}: {message}")]
    FilterParse { pos: usize, message: String },

    #[error("seek target is past the end of the traceset")]
    SeekPastEnd,

    #[error("process {0} not found")]
    ProcessNotFound(Pid),
}

/// Internal invariant violations (attribute-tree type clash and similar).
/// These should never occur for well-formed consumers; they indicate a bug
/// in the engine or a misuse that wasn't caught by `UsageError`.
#[derive(Error, Debug)]
pub enum InternalError {
    #[error("attribute at `{path}` already holds a {existing} value, cannot store a {requested} value")]
    AttributeTypeClash { path: String, existing: &'static str, requested: &'static str },
}

/// Errors raised writing a stats/event dump to disk (ambient concern, not
/// part of the engine proper: the CLI binary's `--export` flag is the only
/// caller).
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Top-level error type returned by the engine's public entry points.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Internal(#[from] InternalError),
}
