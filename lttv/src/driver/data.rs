//! Owned per-event and per-traceset call-data snapshots (C9), handed to
//! hook chains by value rather than by borrow.
//!
//! [`crate::hooks::HookChain`]/[`crate::hooks::HookTable`] (C2) fix one
//! concrete call-data type for their entire lifetime, stored as
//! `Box<dyn FnMut(&mut D) -> bool>`. The driver's own state (the state
//! tracker, the marker registries) outlives any single dispatch call, so a
//! call-data type that *borrowed* from it would need a lifetime shorter
//! than the driver's own but not expressible on a value stored inside it.
//! Building a fresh owned snapshot immediately before each hook-chain call
//! sidesteps this instead of fighting it with unsafe code.

use std::collections::HashMap;

use crate::domain::types::{Cpu, Pid, Tsc, TraceIndex};
use crate::filter::Literal;
use crate::state::{ExecutionMode, ProcessStatus, ProcessType, Submode};

/// Snapshot handed to the general `hooks/event` chain and to
/// `hooks/event/by_id/<id>` chains.
#[derive(Debug, Clone)]
pub struct EventData {
    pub trace_index: TraceIndex,
    pub cpu: Cpu,
    pub tsc: Tsc,
    pub pid: Pid,
    pub process_name: String,
    pub process_type: ProcessType,
    pub mode: ExecutionMode,
    pub submode: Submode,
    pub status: ProcessStatus,
    pub event_name: String,
    pub fields: HashMap<String, Literal>,
}

/// Snapshot handed to `hooks/traceset/{before,after}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracesetData {
    pub trace_count: usize,
}

/// Snapshot handed to `hooks/trace/{before,after}`. Tracefile-level hooks
/// (`hooks/tracefile/...`) are folded into this one: streams are walked as
/// one global merge rather than per-tracefile, so there is no separate
/// tracefile-open/close moment to hook.
#[derive(Debug, Clone, Copy)]
pub struct TraceData {
    pub trace_index: TraceIndex,
}
