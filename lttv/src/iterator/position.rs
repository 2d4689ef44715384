//! Position save/restore and time-seeking over a [`MergedIterator`].
//!
//! A decoder's cursor state is plain data (see [`StreamDecoder`]'s
//! `Clone`/`Copy` derive), so a position token is just a snapshot of every
//! stream's decoder plus whatever event it had peeked — restoring is a
//! cheap copy back, no re-parsing required. [`MergedIterator::seek_time`]
//! itself only ever moves forward (it repositions every stream via binary
//! search and then fine-scans to the first event at or after `target`); a
//! true backward jump in time is the state subsystem's job (restore a
//! checkpoint, then replay forward from there), not this module's.

use crate::decode::{DecodedEvent, EventKind, StreamDecoder};
use crate::domain::errors::{EngineError, UsageError};
use crate::domain::types::{StreamIndex, Tsc, TraceIndex};
use crate::marker::MarkerRegistry;

use super::merge::MergedIterator;

#[derive(Clone)]
struct SlotSnapshot<'a> {
    trace_index: TraceIndex,
    decoder: StreamDecoder<'a>,
    peeked: Option<DecodedEvent>,
}

/// An opaque, restorable snapshot of a [`MergedIterator`]'s progress.
#[derive(Clone)]
pub struct Position<'a> {
    slots: Vec<SlotSnapshot<'a>>,
}

impl<'a> Position<'a> {
    /// The smallest pending tsc across every saved slot, or `None` if every
    /// slot had already reached end-of-stream. Lets the driver compare its
    /// live iterator's progress against a saved `end_position` boundary
    /// without restoring it first.
    #[must_use]
    pub fn min_tsc(&self) -> Option<Tsc> {
        self.slots.iter().filter_map(|s| s.peeked.as_ref().map(|e| e.tsc)).min()
    }
}

impl<'a> MergedIterator<'a> {
    /// Snapshot every stream's current decoder cursor and peeked event.
    #[must_use]
    pub fn save_position(&self) -> Position<'a> {
        Position {
            slots: (0..self.stream_count())
                .map(|i| SlotSnapshot {
                    trace_index: self.slot_trace_index(StreamIndex(i)),
                    decoder: self.slot_decoder(StreamIndex(i)),
                    peeked: self.slot_peeked(StreamIndex(i)),
                })
                .collect(),
        }
    }

    /// Restore a previously saved position, replacing all in-flight state.
    /// Peeked events are restored verbatim; nothing is re-decoded.
    pub fn restore_position(&mut self, position: &Position<'a>) {
        self.reset_with(position.slots.iter().map(|s| (s.trace_index, s.decoder, s.peeked.clone())));
    }

    /// Reposition every stream so its next pending event has `tsc >= target`:
    /// a binary search (via [`Self::jump_to_tsc`]) over each stream's
    /// sub-buffers lands close, then a short linear scan forward drops any
    /// remaining events strictly before `target`. Skipped
    /// `marker_id_declare`/`marker_format_declare` events are still applied
    /// to `registries`, so a user event just past `target` still decodes
    /// correctly. A format/schema error hit during the fine scan aborts the
    /// seek, consistent with [`Self::next`]'s own propagation.
    pub fn seek_time(&mut self, registries: &mut [MarkerRegistry], target: Tsc) -> Result<(), EngineError> {
        self.jump_to_tsc(registries, target)?;
        loop {
            let Some(min_tsc) = self.peek_min_tsc() else { return Ok(()) };
            if min_tsc >= target {
                return Ok(());
            }
            let skipped = match self.next(registries)? {
                Some(event) => event,
                None => return Err(UsageError::SeekPastEnd.into()),
            };
            match skipped.event.kind {
                EventKind::MarkerIdDeclare { id, name } => {
                    let _ = registries[skipped.trace_index.0].declare_id(id, &name);
                }
                EventKind::MarkerFormatDeclare { id, format } => {
                    let _ = registries[skipped.trace_index.0].declare_format(id, &format);
                }
                _ => {}
            }
        }
    }
}
