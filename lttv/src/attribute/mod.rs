//! Typed, named, hierarchical key/value store (C1).
//!
//! Used both as the statistics sink ([`crate::stats`]) and as the
//! hook-registration rendezvous ([`crate::hooks`]): consumers register hook
//! chains at well-known attribute paths before the driver's `begin()` call.

pub mod interner;
pub mod tree;
pub mod value;

pub use interner::{Interner, Key};
pub use tree::{AttributeTree, Branch, Node, NodeRef};
pub use value::{AttributeValue, ValueKind};
