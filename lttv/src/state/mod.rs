//! Process and execution-mode state tracker (C6), grounded on `state.h`/
//! `state.c`: maintains one row per live process (plus one per-CPU idle
//! row), each with a nested execution-mode stack, driven by schedule-change,
//! fork/exit/exec, and mode-entry/exit events.

pub mod process;
pub mod table;
pub mod types;

pub use process::{ExecutionState, ProcessState};
pub use table::{ProcessTable, StateTracker, SAVE_INTERVAL};
pub use types::{ExecutionMode, ProcessKey, ProcessStatus, ProcessType, Submode};
