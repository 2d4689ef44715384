//! Domain model for the analysis engine.
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via the newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

pub use errors::{DecodeError, EngineError, InternalError, SchemaError, UsageError};
pub use types::{Cpu, EventId, Pid, StreamIndex, Tsc, TraceIndex};
