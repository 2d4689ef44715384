//! Per-process execution state (C6), grounded on `state.h`'s
//! `LttvExecutionState { t, n, entry, change, cum_cpu_time, s }` and
//! `LttvProcessState`.

use std::collections::HashMap;

use crate::domain::types::{Cpu, Pid, Tsc};

use super::types::{ExecutionMode, ProcessStatus, ProcessType, Submode};

/// One frame of a process's execution-mode stack: `t`/`n` name which mode
/// and submode are active, `entry`/`change` bound when it was entered and
/// last updated, `cum_cpu_time` accumulates time spent in it, `s` is the
/// scheduling status in effect while this frame is active.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionState {
    pub mode: ExecutionMode,
    pub submode: Submode,
    pub entry: Tsc,
    pub change: Tsc,
    pub cum_cpu_time: Tsc,
    pub status: ProcessStatus,
}

impl ExecutionState {
    #[must_use]
    fn new(mode: ExecutionMode, submode: Submode, tsc: Tsc, status: ProcessStatus) -> Self {
        ExecutionState { mode, submode, entry: tsc, change: tsc, cum_cpu_time: Tsc::ZERO, status }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessState {
    pub pid: Pid,
    pub ppid: Pid,
    pub creation_time: Tsc,
    pub insertion_time: Tsc,
    pub name: String,
    pub brand: String,
    pub cpu: Cpu,
    pub process_type: ProcessType,
    pub current_function: Option<String>,
    /// Execution-mode stack; index 0 is the base frame created at process
    /// creation/insertion and is never popped.
    stack: Vec<ExecutionState>,
    /// CPU time accumulated per (mode, submode) across every frame ever
    /// popped, since a popped `ExecutionState` itself is discarded by
    /// `pop_mode`'s caller. This is what the stats aggregator (C8) reads to
    /// roll up per-mode CPU time; the live stack only reflects still-open
    /// frames.
    mode_totals: HashMap<(ExecutionMode, Submode), Tsc>,
}

impl ProcessState {
    #[must_use]
    pub fn new(
        pid: Pid,
        ppid: Pid,
        cpu: Cpu,
        creation_time: Tsc,
        name: impl Into<String>,
        process_type: ProcessType,
        initial_status: ProcessStatus,
    ) -> Self {
        ProcessState {
            pid,
            ppid,
            creation_time,
            insertion_time: creation_time,
            name: name.into(),
            brand: String::new(),
            cpu,
            process_type,
            current_function: None,
            stack: vec![ExecutionState::new(ExecutionMode::Unknown, Submode::None, creation_time, initial_status)],
            mode_totals: HashMap::new(),
        }
    }

    #[must_use]
    pub fn current(&self) -> &ExecutionState {
        self.stack.last().expect("execution stack is never empty")
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn set_status(&mut self, status: ProcessStatus) {
        self.stack.last_mut().expect("non-empty stack").status = status;
    }

    /// Enter a new nested mode (irq/trap/softirq/syscall), pushing a fresh
    /// frame. `tsc` becomes its `entry`/`change`. The frame being paused
    /// (the previous top of stack) first folds its own elapsed time since
    /// its last `change` into its `cum_cpu_time`, the same way a pop does,
    /// so a frame that is paused and resumed repeatedly before ever being
    /// popped (or never popped at all, like the base frame) still accounts
    /// for every stretch it spent running.
    pub fn push_mode(&mut self, mode: ExecutionMode, submode: Submode, tsc: Tsc, status: ProcessStatus) {
        if let Some(parent) = self.stack.last_mut() {
            parent.cum_cpu_time.0 += tsc.0.saturating_sub(parent.change.0);
            parent.change = tsc;
        }
        self.stack.push(ExecutionState::new(mode, submode, tsc, status));
    }

    /// Leave the current nested mode, folding its elapsed time into its own
    /// `cum_cpu_time` and returning it. A pop that would empty the stack is
    /// a consistency violation (original: unbalanced entry/exit events);
    /// this downgrades to a logged warning and is a no-op, never an `Err`.
    pub fn pop_mode(&mut self, tsc: Tsc) -> Option<ExecutionState> {
        if self.stack.len() <= 1 {
            log::warn!("pid {}: execution-mode stack underflow at tsc {tsc}", self.pid);
            return None;
        }
        let mut popped = self.stack.pop().expect("len > 1 checked above");
        popped.cum_cpu_time = Tsc(popped.cum_cpu_time.0 + tsc.0.saturating_sub(popped.change.0));
        popped.change = tsc;
        if let Some(parent) = self.stack.last_mut() {
            parent.change = tsc;
        }
        let total = self.mode_totals.entry((popped.mode, popped.submode.clone())).or_insert(Tsc::ZERO);
        total.0 += popped.cum_cpu_time.0;
        Some(popped)
    }

    #[must_use]
    pub fn stack_frames(&self) -> &[ExecutionState] {
        &self.stack
    }

    /// CPU time accumulated per (mode, submode) across every frame popped
    /// so far. Read by the stats aggregator (C8); does not include time
    /// still accruing in a currently-open frame. Prefer
    /// [`Self::mode_totals_as_of`] when the caller needs an accurate
    /// snapshot at a given tsc, since a process's top frame (and, for a
    /// process still running at the very end of the trace, its base frame)
    /// is never popped and so never lands here on its own.
    #[must_use]
    pub fn mode_totals(&self) -> &HashMap<(ExecutionMode, Submode), Tsc> {
        &self.mode_totals
    }

    /// [`Self::mode_totals`], plus every frame still on the stack at `now`
    /// (the base frame, and any nested mode never left before the trace
    /// ended). None of these have been popped, so `pop_mode` never folded
    /// them into `mode_totals`; each one's own `cum_cpu_time` already holds
    /// every stretch it spent running before being paused by a child
    /// push (see [`Self::push_mode`]), so only the current top of stack
    /// needs its still-open final stretch (`now` minus its `change`) added
    /// on top before folding in.
    #[must_use]
    pub fn mode_totals_as_of(&self, now: Tsc) -> HashMap<(ExecutionMode, Submode), Tsc> {
        let mut totals = self.mode_totals.clone();
        let top_index = self.stack.len().saturating_sub(1);
        for (i, frame) in self.stack.iter().enumerate() {
            let still_running = if i == top_index { now.0.saturating_sub(frame.change.0) } else { 0 };
            let contribution = frame.cum_cpu_time.0 + still_running;
            if contribution > 0 {
                let entry = totals.entry((frame.mode, frame.submode.clone())).or_insert(Tsc::ZERO);
                entry.0 += contribution;
            }
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> ProcessState {
        ProcessState::new(Pid(10), Pid(1), Cpu(0), Tsc(0), "init", ProcessType::UserThread, ProcessStatus::Run)
    }

    #[test]
    fn push_then_pop_restores_depth_and_accumulates_time() {
        let mut p = fresh();
        assert_eq!(p.depth(), 1);
        p.push_mode(ExecutionMode::Syscall, Submode::Named("read".into()), Tsc(10), ProcessStatus::Wait);
        assert_eq!(p.depth(), 2);
        assert_eq!(p.current().mode, ExecutionMode::Syscall);

        let popped = p.pop_mode(Tsc(25)).unwrap();
        assert_eq!(popped.cum_cpu_time, Tsc(15));
        assert_eq!(p.depth(), 1);
        assert_eq!(
            p.mode_totals().get(&(ExecutionMode::Syscall, Submode::Named("read".into()))),
            Some(&Tsc(15))
        );
    }

    #[test]
    fn pop_at_base_frame_is_a_noop_not_a_panic() {
        let mut p = fresh();
        assert!(p.pop_mode(Tsc(5)).is_none());
        assert_eq!(p.depth(), 1);
    }

    #[test]
    fn mode_totals_as_of_folds_in_the_still_open_base_frame() {
        let p = fresh();
        // never left the base frame; all of its time is still "open"
        let totals = p.mode_totals_as_of(Tsc(30));
        assert_eq!(totals.get(&(ExecutionMode::Unknown, Submode::None)), Some(&Tsc(30)));
    }

    #[test]
    fn mode_totals_as_of_accounts_for_every_frame_left_open_at_trace_end() {
        let mut p = fresh();
        // base runs [0, 10), then a syscall is entered and never left
        p.push_mode(ExecutionMode::Syscall, Submode::Named("read".into()), Tsc(10), ProcessStatus::Wait);
        let totals = p.mode_totals_as_of(Tsc(40));
        assert_eq!(totals.get(&(ExecutionMode::Unknown, Submode::None)), Some(&Tsc(10)));
        assert_eq!(totals.get(&(ExecutionMode::Syscall, Submode::Named("read".into()))), Some(&Tsc(30)));
    }

    #[test]
    fn mode_totals_as_of_combines_popped_and_still_open_time_for_the_same_mode() {
        let mut p = fresh();
        // base pauses twice for the same (mode, submode); one instance is
        // popped mid-trace, the other is still open when the trace ends
        p.push_mode(ExecutionMode::Syscall, Submode::Named("read".into()), Tsc(5), ProcessStatus::Wait);
        p.pop_mode(Tsc(15)); // first read: 10 ticks, folded into mode_totals
        p.push_mode(ExecutionMode::Syscall, Submode::Named("read".into()), Tsc(20), ProcessStatus::Wait);
        // second read: still open at trace end

        let totals = p.mode_totals_as_of(Tsc(35));
        assert_eq!(totals.get(&(ExecutionMode::Syscall, Submode::Named("read".into()))), Some(&Tsc(25)));
    }

    #[test]
    fn set_status_applies_to_current_frame_only() {
        let mut p = fresh();
        p.push_mode(ExecutionMode::Irq, Submode::None, Tsc(1), ProcessStatus::Run);
        p.set_status(ProcessStatus::Wait);
        assert_eq!(p.current().status, ProcessStatus::Wait);
        p.pop_mode(Tsc(2));
        assert_eq!(p.current().status, ProcessStatus::Run);
    }
}
