//! Merged traceset iterator (C5): a k-way merge of every stream in a
//! traceset by reconstructed tsc, with forward seeking and position
//! save/restore.

pub mod merge;
pub mod position;

pub use merge::{MergedEvent, MergedIterator};
pub use position::Position;
