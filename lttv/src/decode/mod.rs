//! Trace decoder (C4): turns a per-CPU tracefile's raw bytes into a
//! sequence of [`event::DecodedEvent`]s, reconstructing absolute
//! timestamps and resolving marker payload layouts along the way.

pub mod event;
pub mod fixtures;
pub mod header;
pub mod reader;
pub mod stream;

pub use event::{decode_event, DecodedEvent, EventKind};
pub use header::{read_block_header, read_trace_header};
pub use reader::ByteReader;
pub use stream::{OpenedStream, StreamDecoder};
