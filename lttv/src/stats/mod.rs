//! Statistics aggregator (C8), grounded on the shape described by `stats.h`'s
//! `lttv_stats_sum_traceset`: a tree under each trace
//! keyed `processes/<pid-starttime>/cpu/<cpu>/mode_types/<mode>/
//! submodes/<submode>/event_types/<event-name> : count`, with a summation
//! pass rolling counts up the hierarchy and CPU time pulled from the state
//! tracker's execution-mode frames.

use std::rc::Rc;

use crate::attribute::{AttributeTree, AttributeValue, Interner, Key, Node, NodeRef, ValueKind};
use crate::domain::errors::InternalError;
use crate::domain::types::{Cpu, Tsc};
use crate::state::{ProcessKey, ProcessState, StateTracker};

/// Named leaf holding a branch's rolled-up event count, written by
/// [`StatsAggregator::summarize`] and skipped when recursing into that same
/// branch (it is output, not input).
const TOTAL_EVENTS: &str = "total_events";
const CPU_TIME: &str = "cpu_time";

pub struct StatsAggregator {
    tree: AttributeTree,
    interner: Interner,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    #[must_use]
    pub fn new() -> Self {
        StatsAggregator { tree: AttributeTree::new(), interner: Interner::new() }
    }

    #[must_use]
    pub fn tree(&self) -> &AttributeTree {
        &self.tree
    }

    #[must_use]
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    fn process_path(process: &ProcessState) -> String {
        format!("processes/{}-{}", process.pid.0, process.creation_time.0)
    }

    fn event_type_path(process: &ProcessState, cpu: Cpu, event_name: &str) -> String {
        format!(
            "{}/cpu/{}/mode_types/{}/submodes/{}/event_types/{}",
            Self::process_path(process),
            cpu.0,
            process.current().mode.as_str(),
            process.current().submode.as_str(),
            event_name,
        )
    }

    /// Increment the per-(process, cpu, mode, submode, event-name) counter.
    /// Called from the event hook for every event the driver dispatches.
    pub fn record_event(
        &mut self,
        process: &ProcessState,
        cpu: Cpu,
        event_name: &str,
    ) -> Result<(), InternalError> {
        let path = Self::event_type_path(process, cpu, event_name);
        let node = self.tree.find_or_create(&mut self.interner, &path, ValueKind::ULong)?;
        let mut node = node.borrow_mut();
        if let Node::Leaf(AttributeValue::ULong(count)) = &mut *node {
            *count += 1;
        }
        Ok(())
    }

    /// Pull accumulated CPU time out of every process's per-mode totals,
    /// via `ProcessState::mode_totals_as_of(now)` so that a process still
    /// mid-mode (including one that never left its base frame at all) at
    /// `now` still contributes its still-open stretch, and fold it into the
    /// tree, keyed the same way as event counts. Call once per
    /// checkpoint/summation pass, with the tsc of the last event processed.
    pub fn record_cpu_times(&mut self, tracker: &StateTracker, now: Tsc) -> Result<(), InternalError> {
        for (key, process) in tracker.table().iter() {
            let cpu = match key {
                ProcessKey::Pid(_) => process.cpu,
                ProcessKey::Idle(cpu) => *cpu,
            };
            for ((mode, submode), elapsed) in process.mode_totals_as_of(now) {
                let path = format!(
                    "{}/cpu/{}/mode_types/{}/submodes/{}/{CPU_TIME}",
                    Self::process_path(process),
                    cpu.0,
                    mode.as_str(),
                    submode.as_str(),
                );
                let node = self.tree.find_or_create(&mut self.interner, &path, ValueKind::Time)?;
                let mut node = node.borrow_mut();
                if let Node::Leaf(AttributeValue::Time(total)) = &mut *node {
                    total.0 += elapsed.0;
                }
            }
        }
        Ok(())
    }

    /// Roll event counts up the tree: submodes -> mode_types -> cpu ->
    /// process -> traceset root, writing a `total_events` leaf at every
    /// branch level. Call once at end-of-traceset.
    pub fn summarize(&mut self) {
        let total_key = self.interner.intern(TOTAL_EVENTS);
        rollup(self.tree.root(), total_key);
    }
}

/// Sum every `ULong` leaf reachable under `node` (skipping `total_key`
/// itself, since it is written by this same pass and would double-count on
/// a repeated call), writing the sum into a sibling `total_key` leaf at
/// every branch level it visits.
fn rollup(node: &NodeRef, total_key: Key) -> u64 {
    let is_branch = node.borrow().as_branch().is_some();
    if !is_branch {
        return match &*node.borrow() {
            Node::Leaf(AttributeValue::ULong(v)) => *v,
            _ => 0,
        };
    }

    let children: Vec<NodeRef> = node
        .borrow()
        .as_branch()
        .expect("checked above")
        .iter_named()
        .filter(|(key, _)| *key != total_key)
        .map(|(_, child)| Rc::clone(child))
        .collect();
    let sum: u64 = children.iter().map(|child| rollup(child, total_key)).sum();

    {
        let mut node_mut = node.borrow_mut();
        let branch = node_mut.as_branch_mut().expect("checked above");
        if branch.find_named(total_key).is_none() {
            branch.insert_named(total_key, Node::Leaf(AttributeValue::ULong(0)));
        }
    }
    let total_node =
        node.borrow().as_branch().expect("checked above").find_named(total_key).expect("just inserted").clone();
    if let Node::Leaf(AttributeValue::ULong(v)) = &mut *total_node.borrow_mut() {
        *v = sum;
    }
    sum
}
