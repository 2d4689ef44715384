//! Process table and state tracker (C6), grounded on `state.h`/`state.c`:
//! the hook handlers that turn schedule-change, fork/exit, and mode-entry
//! events into a live picture of every process's execution state.

use std::collections::HashMap;

use crate::domain::types::{Cpu, Pid, Tsc};

use super::process::ProcessState;
use super::types::{ExecutionMode, ProcessKey, ProcessStatus, ProcessType, Submode};

/// Events between automatic state checkpoints (original `state.c`'s
/// `SAVE_INTERVAL`), bounding how far backward a seek has to replay before
/// reaching a checkpoint instead of tracing from the very start.
pub const SAVE_INTERVAL: u64 = 50_000;

#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    rows: HashMap<ProcessKey, ProcessState>,
}

impl ProcessTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: ProcessState, key: ProcessKey) {
        self.rows.insert(key, state);
    }

    #[must_use]
    pub fn get(&self, key: ProcessKey) -> Option<&ProcessState> {
        self.rows.get(&key)
    }

    pub fn get_mut(&mut self, key: ProcessKey) -> Option<&mut ProcessState> {
        self.rows.get_mut(&key)
    }

    pub fn remove(&mut self, key: ProcessKey) -> Option<ProcessState> {
        self.rows.remove(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProcessKey, &ProcessState)> {
        self.rows.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A process-table snapshot taken every [`StateTracker::set_save_interval`]
/// events, tagged with the event index and tsc it was taken at so a seek can
/// find the most recent one at or before its target.
#[derive(Debug, Clone)]
struct Checkpoint {
    event_index: u64,
    tsc: Tsc,
    table: ProcessTable,
    current_pid: HashMap<Cpu, Pid>,
}

/// Live process state plus the currently-scheduled pid per CPU, with
/// periodic checkpoints for cheap backward seeking.
pub struct StateTracker {
    table: ProcessTable,
    current_pid: HashMap<Cpu, Pid>,
    events_seen: u64,
    checkpoints: Vec<Checkpoint>,
    save_interval: u64,
}

impl StateTracker {
    /// Build a tracker with one idle process eagerly created per CPU,
    /// rather than waiting for the first schedule-change event to reveal it.
    #[must_use]
    pub fn new(cpu_count: u32) -> Self {
        let mut table = ProcessTable::new();
        let mut current_pid = HashMap::new();
        for cpu_id in 0..cpu_count {
            let cpu = Cpu(cpu_id);
            table.insert(
                ProcessState::new(Pid::IDLE, Pid::IDLE, cpu, Tsc::ZERO, "swapper", ProcessType::KernelThread, ProcessStatus::Run),
                ProcessKey::Idle(cpu),
            );
            current_pid.insert(cpu, Pid::IDLE);
        }
        StateTracker { table, current_pid, events_seen: 0, checkpoints: Vec::new(), save_interval: SAVE_INTERVAL }
    }

    #[must_use]
    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    #[must_use]
    pub fn current_pid(&self, cpu: Cpu) -> Option<Pid> {
        self.current_pid.get(&cpu).copied()
    }

    fn current_key(&self, cpu: Cpu) -> ProcessKey {
        let pid = self.current_pid.get(&cpu).copied().unwrap_or(Pid::IDLE);
        ProcessKey::for_pid(pid, cpu)
    }

    /// Call once per event processed, to drive automatic checkpointing.
    pub fn record_event(&mut self, tsc: Tsc) {
        self.events_seen += 1;
        if self.events_seen % self.save_interval == 0 {
            self.checkpoints.push(Checkpoint {
                event_index: self.events_seen,
                tsc,
                table: self.table.clone(),
                current_pid: self.current_pid.clone(),
            });
        }
    }

    /// Override the default checkpoint interval (CLI `--save-interval`),
    /// effective from the next `record_event` call.
    pub fn set_save_interval(&mut self, interval: u64) {
        self.save_interval = interval;
    }

    #[must_use]
    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    /// The most recent checkpoint at or before `event_index`, if any.
    #[must_use]
    pub fn nearest_checkpoint(&self, event_index: u64) -> Option<&ProcessTable> {
        self.checkpoints.iter().rev().find(|c| c.event_index <= event_index).map(|c| &c.table)
    }

    /// The most recent checkpoint at or before `target`, if any, as
    /// `(event_index, tsc)` plus the table and per-CPU schedule it captured.
    /// Used by a seek to find where to restore from before replaying
    /// forward to its actual target.
    #[must_use]
    pub fn checkpoint_before(&self, target: Tsc) -> Option<(u64, Tsc, &ProcessTable, &HashMap<Cpu, Pid>)> {
        self.checkpoints
            .iter()
            .rev()
            .find(|c| c.tsc <= target)
            .map(|c| (c.event_index, c.tsc, &c.table, &c.current_pid))
    }

    /// Replace the live table, per-CPU schedule, and event counter wholesale,
    /// used to rewind onto a saved checkpoint before replaying forward.
    pub fn restore(&mut self, table: ProcessTable, current_pid: HashMap<Cpu, Pid>, events_seen: u64) {
        self.table = table;
        self.current_pid = current_pid;
        self.events_seen = events_seen;
    }

    pub fn fork(&mut self, parent: Pid, child: Pid, cpu: Cpu, tsc: Tsc, child_name: impl Into<String>) {
        let process_type = self
            .table
            .get(ProcessKey::for_pid(parent, cpu))
            .map_or(ProcessType::UserThread, |p| p.process_type);
        self.table.insert(
            ProcessState::new(child, parent, cpu, tsc, child_name, process_type, ProcessStatus::WaitForkedProcess),
            ProcessKey::Pid(child),
        );
    }

    /// Mark `pid` as exited but not yet reaped.
    pub fn exit(&mut self, pid: Pid, cpu: Cpu, tsc: Tsc) {
        if let Some(process) = self.table.get_mut(ProcessKey::for_pid(pid, cpu)) {
            process.set_status(ProcessStatus::Exit);
            let _ = tsc;
        } else {
            log::warn!("exit for unknown pid {pid} on {cpu}");
        }
    }

    /// Reap a process (original: `process_free`): mark it `dead` and retain
    /// the row, so a hook or filter that looks it up afterward (e.g. late
    /// stats for a since-exited process) still finds it.
    pub fn reap(&mut self, pid: Pid) {
        if let Some(process) = self.table.get_mut(ProcessKey::Pid(pid)) {
            process.set_status(ProcessStatus::Dead);
        } else {
            log::warn!("reap for unknown pid {pid}");
        }
    }

    /// `execve`: same pid, new executable image. Resets the mode stack back
    /// to its base frame, since everything above it belonged to the old image.
    pub fn exec(&mut self, pid: Pid, cpu: Cpu, tsc: Tsc, new_name: impl Into<String>) {
        if let Some(process) = self.table.get_mut(ProcessKey::for_pid(pid, cpu)) {
            process.name = new_name.into();
            process.current_function = None;
            while process.depth() > 1 {
                process.pop_mode(tsc);
            }
        } else {
            log::warn!("exec for unknown pid {pid} on {cpu}");
        }
    }

    /// Schedule-change: `prev` stops running on `cpu`, `next` starts.
    pub fn schedchange(&mut self, prev: Pid, next: Pid, cpu: Cpu, tsc: Tsc) {
        if let Some(process) = self.table.get_mut(ProcessKey::for_pid(prev, cpu)) {
            if process.current().status == ProcessStatus::Run {
                process.set_status(ProcessStatus::Wait);
            }
        }
        let next_key = ProcessKey::for_pid(next, cpu);
        if self.table.get(next_key).is_none() {
            log::warn!("schedchange to unknown pid {next} on {cpu}, creating a placeholder row");
            self.table.insert(
                ProcessState::new(next, Pid::IDLE, cpu, tsc, "", ProcessType::UserThread, ProcessStatus::Unnamed),
                next_key,
            );
        }
        if let Some(process) = self.table.get_mut(next_key) {
            process.cpu = cpu;
            process.set_status(ProcessStatus::Run);
        }
        self.current_pid.insert(cpu, next);
    }

    pub fn enter_mode(&mut self, cpu: Cpu, tsc: Tsc, mode: ExecutionMode, submode: Submode, status: ProcessStatus) {
        let key = self.current_key(cpu);
        if let Some(process) = self.table.get_mut(key) {
            process.push_mode(mode, submode, tsc, status);
        }
    }

    pub fn leave_mode(&mut self, cpu: Cpu, tsc: Tsc) {
        let key = self.current_key(cpu);
        if let Some(process) = self.table.get_mut(key) {
            process.pop_mode(tsc);
        }
    }

    /// Override a row's process type, used by the kernel-thread creation
    /// event (same bookkeeping as `fork`, but the child is a kernel thread
    /// rather than inheriting the parent's type).
    pub fn set_process_type(&mut self, pid: Pid, cpu: Cpu, process_type: ProcessType) {
        if let Some(process) = self.table.get_mut(ProcessKey::for_pid(pid, cpu)) {
            process.process_type = process_type;
        }
    }

    pub fn thread_brand(&mut self, pid: Pid, cpu: Cpu, brand: impl Into<String>) {
        if let Some(process) = self.table.get_mut(ProcessKey::for_pid(pid, cpu)) {
            process.brand = brand.into();
        }
    }

    pub fn function_entry(&mut self, pid: Pid, cpu: Cpu, function: impl Into<String>) {
        if let Some(process) = self.table.get_mut(ProcessKey::for_pid(pid, cpu)) {
            process.current_function = Some(function.into());
        }
    }

    pub fn function_exit(&mut self, pid: Pid, cpu: Cpu) {
        if let Some(process) = self.table.get_mut(ProcessKey::for_pid(pid, cpu)) {
            process.current_function = None;
        }
    }

    /// Seed a process row directly from a statedump replay, short-circuiting
    /// the normal "assume `WaitForkedProcess` until proven otherwise"
    /// default for processes that were already running before tracing
    /// started.
    pub fn statedump_enumerate(
        &mut self,
        pid: Pid,
        ppid: Pid,
        cpu: Cpu,
        tsc: Tsc,
        name: impl Into<String>,
        process_type: ProcessType,
        status: ProcessStatus,
    ) {
        self.table.insert(ProcessState::new(pid, ppid, cpu, tsc, name, process_type, status), ProcessKey::for_pid(pid, cpu));
        if status == ProcessStatus::Run {
            self.current_pid.insert(cpu, pid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tracker_eagerly_creates_idle_per_cpu() {
        let tracker = StateTracker::new(2);
        assert!(tracker.table().get(ProcessKey::Idle(Cpu(0))).is_some());
        assert!(tracker.table().get(ProcessKey::Idle(Cpu(1))).is_some());
        assert_eq!(tracker.current_pid(Cpu(0)), Some(Pid::IDLE));
    }

    #[test]
    fn fork_creates_child_row_inheriting_process_type() {
        let mut tracker = StateTracker::new(1);
        tracker.schedchange(Pid::IDLE, Pid(100), Cpu(0), Tsc(0));
        tracker.fork(Pid(100), Pid(200), Cpu(0), Tsc(10), "child");
        let child = tracker.table().get(ProcessKey::Pid(Pid(200))).unwrap();
        assert_eq!(child.ppid, Pid(100));
        assert_eq!(child.name, "child");
        assert_eq!(child.current().status, ProcessStatus::WaitForkedProcess);
    }

    #[test]
    fn schedchange_updates_statuses_and_current_pid() {
        let mut tracker = StateTracker::new(1);
        tracker.fork(Pid::IDLE, Pid(100), Cpu(0), Tsc(0), "a");
        tracker.table.get_mut(ProcessKey::Pid(Pid(100))).unwrap().set_status(ProcessStatus::Run);
        tracker.schedchange(Pid::IDLE, Pid(100), Cpu(0), Tsc(5));
        assert_eq!(tracker.current_pid(Cpu(0)), Some(Pid(100)));
        assert_eq!(tracker.table().get(ProcessKey::Pid(Pid(100))).unwrap().current().status, ProcessStatus::Run);
        assert_eq!(tracker.table().get(ProcessKey::Idle(Cpu(0))).unwrap().current().status, ProcessStatus::Wait);
    }

    #[test]
    fn exec_resets_mode_stack_to_base() {
        let mut tracker = StateTracker::new(1);
        tracker.fork(Pid::IDLE, Pid(100), Cpu(0), Tsc(0), "old");
        tracker.current_pid.insert(Cpu(0), Pid(100));
        tracker.enter_mode(Cpu(0), Tsc(1), ExecutionMode::Syscall, Submode::None, ProcessStatus::Wait);
        tracker.exec(Pid(100), Cpu(0), Tsc(5), "new");
        let process = tracker.table().get(ProcessKey::Pid(Pid(100))).unwrap();
        assert_eq!(process.name, "new");
        assert_eq!(process.depth(), 1);
    }

    #[test]
    fn exit_then_reap_marks_dead_and_retains_row() {
        let mut tracker = StateTracker::new(1);
        tracker.fork(Pid::IDLE, Pid(100), Cpu(0), Tsc(0), "a");
        tracker.exit(Pid(100), Cpu(0), Tsc(10));
        assert_eq!(tracker.table().get(ProcessKey::Pid(Pid(100))).unwrap().current().status, ProcessStatus::Exit);
        tracker.reap(Pid(100));
        assert_eq!(tracker.table().get(ProcessKey::Pid(Pid(100))).unwrap().current().status, ProcessStatus::Dead);
    }

    #[test]
    fn checkpoints_are_recorded_every_save_interval() {
        let mut tracker = StateTracker::new(1);
        for i in 0..SAVE_INTERVAL {
            tracker.record_event(Tsc(i));
        }
        assert!(tracker.nearest_checkpoint(SAVE_INTERVAL).is_some());
        assert!(tracker.nearest_checkpoint(SAVE_INTERVAL - 1).is_none());
    }

    #[test]
    fn checkpoint_before_finds_the_latest_checkpoint_at_or_before_target() {
        let mut tracker = StateTracker::new(1);
        tracker.fork(Pid::IDLE, Pid(100), Cpu(0), Tsc(0), "a");
        for i in 0..SAVE_INTERVAL {
            tracker.record_event(Tsc(i));
        }
        for i in SAVE_INTERVAL..SAVE_INTERVAL * 2 {
            tracker.record_event(Tsc(i));
        }

        let (event_index, tsc, table, _current_pid) = tracker.checkpoint_before(Tsc(SAVE_INTERVAL)).unwrap();
        assert_eq!(event_index, SAVE_INTERVAL);
        assert_eq!(tsc, Tsc(SAVE_INTERVAL - 1));
        // captured after the fork, so pid 100 is already present in this checkpoint
        assert!(table.get(ProcessKey::Pid(Pid(100))).is_some());

        assert!(tracker.checkpoint_before(Tsc(0)).is_none());
    }
}
