//! Process-trace driver (C9): the fixed `begin`/`middle`/`end` loop that
//! pulls merged events off C5, runs them through C6/C7/C8, and fires the
//! consumer's own hooks, grounded on the original `hook.c` driver loop and
//! `traceset.c`'s before/after hook install points.

pub mod cancellation;
pub mod data;
pub mod dispatch;

use std::collections::HashMap;

use crate::decode::EventKind;
use crate::domain::errors::{DecodeError, EngineError};
use crate::domain::types::{Cpu, Pid, Tsc, TraceIndex};
use crate::filter::{evaluate, FilterContext, FilterExpr};
use crate::hooks::{call_merge, Hook, HookChain, HookTable};
use crate::iterator::{MergedEvent, MergedIterator, Position};
use crate::marker::MarkerRegistry;
use crate::state::{ProcessKey, StateTracker};
use crate::stats::StatsAggregator;

pub use cancellation::CancellationToken;
pub use data::{EventData, TraceData, TracesetData};
use dispatch::{apply_state_event, decode_fields};

/// Why `middle` returned fewer events than asked for (one of four stop
/// conditions), useful to a caller deciding whether to keep looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    StreamExhausted,
    ReachedEndTime,
    ReachedBatchLimit,
    ReachedEndPosition,
    Cancelled,
}

/// Drives one traceset's merged event stream through state tracking,
/// filtering, stats, and consumer hooks.
///
/// Hook call data is built fresh per dispatch rather than borrowed from the
/// driver's own state; see [`data`]'s module doc for why.
pub struct Driver<'a> {
    iterator: MergedIterator<'a>,
    registries: Vec<MarkerRegistry>,
    tracker: StateTracker,
    stats: StatsAggregator,
    filter: Option<FilterExpr>,
    cancellation: CancellationToken,
    trace_count: usize,
    current_time: Tsc,

    event_hooks: HookChain<EventData>,
    event_hooks_by_id: HookTable<EventData>,
    traceset_before: HookChain<TracesetData>,
    traceset_after: HookChain<TracesetData>,
    trace_before: HookChain<TraceData>,
    trace_after: HookChain<TraceData>,
}

impl<'a> Driver<'a> {
    #[must_use]
    pub fn new(iterator: MergedIterator<'a>, registries: Vec<MarkerRegistry>, cpu_count: u32) -> Self {
        let trace_count = registries.len();
        Driver {
            iterator,
            registries,
            tracker: StateTracker::new(cpu_count),
            stats: StatsAggregator::new(),
            filter: None,
            cancellation: CancellationToken::new(),
            trace_count,
            current_time: Tsc::ZERO,
            event_hooks: HookChain::new(),
            event_hooks_by_id: HookTable::new(),
            traceset_before: HookChain::new(),
            traceset_after: HookChain::new(),
            trace_before: HookChain::new(),
            trace_after: HookChain::new(),
        }
    }

    #[must_use]
    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut StateTracker {
        &mut self.tracker
    }

    #[must_use]
    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut StatsAggregator {
        &mut self.stats
    }

    #[must_use]
    pub fn current_time(&self) -> Tsc {
        self.current_time
    }

    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn set_filter(&mut self, filter: Option<FilterExpr>) {
        self.filter = filter;
    }

    /// Register a hook on every user event (C2), regardless of id.
    pub fn on_event(&mut self, token: u64, prio: i32, hook: Hook<EventData>) {
        self.event_hooks.add(token, prio, hook);
    }

    /// Register a hook on user events of one specific marker id only.
    pub fn on_event_by_id(&mut self, id: u16, token: u64, prio: i32, hook: Hook<EventData>) {
        self.event_hooks_by_id.chain_mut(id).add(token, prio, hook);
    }

    pub fn on_traceset_before(&mut self, token: u64, prio: i32, hook: Hook<TracesetData>) {
        self.traceset_before.add(token, prio, hook);
    }

    pub fn on_traceset_after(&mut self, token: u64, prio: i32, hook: Hook<TracesetData>) {
        self.traceset_after.add(token, prio, hook);
    }

    /// Trace-level hooks. Tracefile-level hooks are folded in here; see
    /// [`data`]'s module doc for why there is no separate tracefile moment.
    pub fn on_trace_before(&mut self, token: u64, prio: i32, hook: Hook<TraceData>) {
        self.trace_before.add(token, prio, hook);
    }

    pub fn on_trace_after(&mut self, token: u64, prio: i32, hook: Hook<TraceData>) {
        self.trace_after.add(token, prio, hook);
    }

    /// Fire before-traceset then before-trace hooks, in that order.
    pub fn begin(&mut self) {
        let mut traceset_data = TracesetData { trace_count: self.trace_count };
        self.traceset_before.call(&mut traceset_data);
        for i in 0..self.trace_count {
            let mut trace_data = TraceData { trace_index: TraceIndex(i) };
            self.trace_before.call(&mut trace_data);
        }
    }

    /// Fire after-trace then after-traceset hooks, in that order.
    pub fn end(&mut self) {
        for i in 0..self.trace_count {
            let mut trace_data = TraceData { trace_index: TraceIndex(i) };
            self.trace_after.call(&mut trace_data);
        }
        let mut traceset_data = TracesetData { trace_count: self.trace_count };
        self.traceset_after.call(&mut traceset_data);
    }

    /// Pull accumulated CPU time into the stats tree, then roll counts up
    /// the hierarchy (the end-of-traceset summation pass). Call once after
    /// the last `middle()` batch.
    pub fn finalize_stats(&mut self) -> Result<(), EngineError> {
        self.stats.record_cpu_times(&self.tracker, self.current_time)?;
        self.stats.summarize();
        Ok(())
    }

    /// Seek the whole pipeline to `target`, possibly backward in time:
    /// restores the process-table checkpoint nearest at or before `target`
    /// (if one exists), jumps every stream directly to that checkpoint's tsc
    /// via binary search, then replays the events in between through the
    /// state tracker only until the merged position reaches `target`.
    /// Consumer hooks and stats are not re-fired during the replay, only the
    /// state transitions that later hook calls depend on. If `target` falls
    /// before the first checkpoint, the tracker's current state is left as
    /// is and only the streams are repositioned: replaying from the true
    /// start of the trace is left to the caller re-opening it fresh.
    pub fn seek_time(&mut self, target: Tsc) -> Result<(), EngineError> {
        if let Some((event_index, checkpoint_tsc, table, current_pid)) = self.tracker.checkpoint_before(target) {
            let table = table.clone();
            let current_pid = current_pid.clone();
            self.tracker.restore(table, current_pid, event_index);
            self.iterator.jump_to_tsc(&self.registries, checkpoint_tsc)?;
        }
        loop {
            let Some(min_tsc) = self.iterator.peek_min_tsc() else { break };
            if min_tsc >= target {
                break;
            }
            let Some(merged) = self.iterator.next(&self.registries)? else { break };
            self.current_time = merged.event.tsc;
            self.replay_state_only(merged)?;
        }
        Ok(())
    }

    /// Apply one event's state-tracker transition without touching stats or
    /// firing any consumer hook, used to fast-forward the tracker from a
    /// restored checkpoint up to a seek's actual target.
    fn replay_state_only(&mut self, merged: MergedEvent) -> Result<(), EngineError> {
        let MergedEvent { trace_index, event, .. } = merged;
        let cpu = event.cpu;
        let tsc = event.tsc;
        self.tracker.record_event(tsc);

        let (id, payload) = match event.kind {
            EventKind::MarkerIdDeclare { id, name } => {
                self.registries[trace_index.0].declare_id(id, &name)?;
                return Ok(());
            }
            EventKind::MarkerFormatDeclare { id, format } => {
                self.registries[trace_index.0].declare_format(id, &format)?;
                return Ok(());
            }
            EventKind::User { id, payload } => (id, payload),
            EventKind::Heartbeat | EventKind::FacilityLoad { .. } => return Ok(()),
        };

        let info = self.registries[trace_index.0].get(id).ok_or(DecodeError::UnknownEventId(id))?;
        let event_name = info.name.clone();
        let fields = match &info.format {
            Some(format) => decode_fields(format, &payload)?,
            None => HashMap::new(),
        };
        apply_state_event(&mut self.tracker, cpu, tsc, &event_name, &fields);
        Ok(())
    }

    /// Run up to `max_events` events, stopping early at `end_time`,
    /// `end_position`, stream exhaustion, or cancellation. Returns the
    /// count actually processed and why it stopped.
    pub fn middle(
        &mut self,
        end_time: Tsc,
        max_events: usize,
        end_position: Option<&Position<'a>>,
    ) -> Result<(usize, StopReason), EngineError> {
        let mut processed = 0;
        while processed < max_events {
            if self.cancellation.is_cancelled() {
                return Ok((processed, StopReason::Cancelled));
            }
            if let Some(end_pos) = end_position {
                match (self.iterator.peek_min_tsc(), end_pos.min_tsc()) {
                    (_, None) => return Ok((processed, StopReason::ReachedEndPosition)),
                    (Some(current), Some(target)) if current >= target => {
                        return Ok((processed, StopReason::ReachedEndPosition));
                    }
                    _ => {}
                }
            }
            let Some(min_tsc) = self.iterator.peek_min_tsc() else {
                return Ok((processed, StopReason::StreamExhausted));
            };
            if min_tsc >= end_time {
                return Ok((processed, StopReason::ReachedEndTime));
            }
            let Some(merged) = self.iterator.next(&self.registries)? else {
                return Ok((processed, StopReason::StreamExhausted));
            };
            self.current_time = merged.event.tsc;
            self.dispatch(merged)?;
            processed += 1;
        }
        Ok((processed, StopReason::ReachedBatchLimit))
    }

    fn dispatch(&mut self, merged: MergedEvent) -> Result<(), EngineError> {
        let MergedEvent { trace_index, event, .. } = merged;
        let cpu = event.cpu;
        let tsc = event.tsc;
        self.tracker.record_event(tsc);

        let (id, payload) = match event.kind {
            EventKind::Heartbeat | EventKind::FacilityLoad { .. } => return Ok(()),
            EventKind::MarkerIdDeclare { id, name } => {
                self.registries[trace_index.0].declare_id(id, &name)?;
                return Ok(());
            }
            EventKind::MarkerFormatDeclare { id, format } => {
                self.registries[trace_index.0].declare_format(id, &format)?;
                return Ok(());
            }
            EventKind::User { id, payload } => (id, payload),
        };

        let (event_name, fields) = {
            let info = self.registries[trace_index.0].get(id).ok_or(DecodeError::UnknownEventId(id))?;
            let event_name = info.name.clone();
            let fields = match &info.format {
                Some(format) => decode_fields(format, &payload)?,
                None => HashMap::new(),
            };
            (event_name, fields)
        };

        apply_state_event(&mut self.tracker, cpu, tsc, &event_name, &fields);

        let current_pid = self.tracker.current_pid(cpu).unwrap_or(Pid::IDLE);
        let key = ProcessKey::for_pid(current_pid, cpu);

        let event_data = {
            let Some(process) = self.tracker.table().get(key) else { return Ok(()) };

            let passes = match &self.filter {
                Some(expr) => {
                    let ctx =
                        FilterContext { process, cpu, tsc, event_name: &event_name, marker_fields: &fields };
                    evaluate(expr, &ctx)
                }
                None => true,
            };
            if !passes {
                return Ok(());
            }

            EventData {
                trace_index,
                cpu,
                tsc,
                pid: process.pid,
                process_name: process.name.clone(),
                process_type: process.process_type,
                mode: process.current().mode,
                submode: process.current().submode.clone(),
                status: process.current().status,
                event_name: event_name.clone(),
                fields: fields.clone(),
            }
        };

        if let Some(process) = self.tracker.table().get(key) {
            self.stats.record_event(process, cpu, &event_name)?;
        }

        let mut data = event_data;
        match self.event_hooks_by_id.chain_mut_existing(id.0) {
            Some(by_id) => {
                call_merge(by_id, &mut self.event_hooks, &mut data);
            }
            None => {
                self.event_hooks.call(&mut data);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::fixtures::{build_first_subbuffer, default_trace_header};
    use crate::decode::StreamDecoder;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn schedchange_stream(pairs: &[(Pid, Pid)]) -> Vec<u8> {
        let declare_id = Vec::new();
        let _ = declare_id;
        let mut events: Vec<(u16, u32, Vec<u8>)> = Vec::new();
        events.push((2, 0, {
            let mut p = Vec::new();
            p.extend_from_slice(&9u16.to_le_bytes());
            p.extend_from_slice(b"schedchange\0");
            p
        }));
        events.push((3, 0, {
            let mut p = Vec::new();
            p.extend_from_slice(&9u16.to_le_bytes());
            p.extend_from_slice(b"out:uint32,in:uint32\0");
            p
        }));
        for (i, (out, r#in)) in pairs.iter().enumerate() {
            let mut payload = Vec::new();
            payload.extend_from_slice(&out.0.to_le_bytes());
            payload.extend_from_slice(&r#in.0.to_le_bytes());
            events.push((9, if i == 0 { 5 } else { 10 }, payload));
        }

        let refs: Vec<(u16, u32, &[u8])> = events.iter().map(|(id, delta, p)| (*id, *delta, p.as_slice())).collect();
        build_first_subbuffer(&default_trace_header(), 0, 10_000, 1_000_000, 8192, &refs)
    }

    #[test]
    fn middle_processes_schedchange_and_drives_state() {
        let data = schedchange_stream(&[(Pid::IDLE, Pid(100)), (Pid(100), Pid(200))]);
        let opened = StreamDecoder::open(&data, Cpu(0)).unwrap();
        let registries = vec![MarkerRegistry::new()];
        let iter = MergedIterator::begin(vec![(TraceIndex(0), opened.decoder)], &registries).unwrap();

        let mut driver = Driver::new(iter, registries, 1);
        driver.begin();
        let (processed, reason) = driver.middle(Tsc::MAX, 100, None).unwrap();
        assert_eq!(reason, StopReason::StreamExhausted);
        assert!(processed >= 2);
        assert_eq!(driver.tracker().current_pid(Cpu(0)), Some(Pid(200)));
        driver.end();
    }

    #[test]
    fn middle_honors_max_events_batch_limit() {
        let data = schedchange_stream(&[(Pid::IDLE, Pid(100)), (Pid(100), Pid(200))]);
        let opened = StreamDecoder::open(&data, Cpu(0)).unwrap();
        let registries = vec![MarkerRegistry::new()];
        let iter = MergedIterator::begin(vec![(TraceIndex(0), opened.decoder)], &registries).unwrap();

        let mut driver = Driver::new(iter, registries, 1);
        driver.begin();
        let (processed, reason) = driver.middle(Tsc::MAX, 1, None).unwrap();
        assert_eq!(processed, 1);
        assert_eq!(reason, StopReason::ReachedBatchLimit);
    }

    #[test]
    fn event_hook_observes_schedchange_pids() {
        let data = schedchange_stream(&[(Pid::IDLE, Pid(100))]);
        let opened = StreamDecoder::open(&data, Cpu(0)).unwrap();
        let registries = vec![MarkerRegistry::new()];
        let iter = MergedIterator::begin(vec![(TraceIndex(0), opened.decoder)], &registries).unwrap();

        let mut driver = Driver::new(iter, registries, 1);
        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        driver.on_event(1, 0, Box::new(move |data: &mut EventData| {
            seen_clone.borrow_mut().push(data.event_name.clone());
            false
        }));

        driver.begin();
        driver.middle(Tsc::MAX, 100, None).unwrap();
        driver.end();

        assert!(seen.borrow().iter().any(|name| name == "schedchange"));
    }

    #[test]
    fn cancellation_stops_middle_early() {
        let data = schedchange_stream(&[(Pid::IDLE, Pid(100)), (Pid(100), Pid(200))]);
        let opened = StreamDecoder::open(&data, Cpu(0)).unwrap();
        let registries = vec![MarkerRegistry::new()];
        let iter = MergedIterator::begin(vec![(TraceIndex(0), opened.decoder)], &registries).unwrap();

        let mut driver = Driver::new(iter, registries, 1);
        driver.cancellation().cancel();
        let (processed, reason) = driver.middle(Tsc::MAX, 100, None).unwrap();
        assert_eq!(processed, 0);
        assert_eq!(reason, StopReason::Cancelled);
    }
}
