//! Priority-ordered hook chains and the sparse per-event-id table that holds
//! them (C2), grounded on the original `hook.c`.

pub mod chain;
pub mod table;

pub use chain::{call_check_merge, call_merge, Hook, HookChain};
pub use table::HookTable;
