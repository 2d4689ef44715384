//! Merged traceset iterator (C5): a k-way merge of every stream across
//! every trace in a traceset, ordered by reconstructed tsc.
//!
//! Refilling the slot a just-returned event came from is deferred to the
//! *next* call to [`MergedIterator::next`], rather than done immediately
//! after popping: the event a caller just received may be a
//! `marker_id_declare`/`marker_format_declare` that the caller (the C9
//! driver) is expected to fold into that trace's [`MarkerRegistry`] before
//! any later event from the same stream is decoded. Refilling eagerly would
//! race that update.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::decode::{DecodedEvent, StreamDecoder};
use crate::domain::errors::DecodeError;
use crate::domain::types::{Cpu, StreamIndex, Tsc, TraceIndex};
use crate::marker::MarkerRegistry;

#[derive(Clone)]
struct Slot<'a> {
    trace_index: TraceIndex,
    cpu: Cpu,
    decoder: StreamDecoder<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapKey {
    tsc: Tsc,
    trace_index: TraceIndex,
    stream_index: StreamIndex,
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.tsc, self.trace_index, self.stream_index).cmp(&(
            other.tsc,
            other.trace_index,
            other.stream_index,
        ))
    }
}

/// One event as handed back by the merged iterator, tagged with which trace
/// and stream it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedEvent {
    pub trace_index: TraceIndex,
    pub stream_index: StreamIndex,
    pub event: DecodedEvent,
}

/// A min-heap over every open stream's next event, ordered by tsc.
pub struct MergedIterator<'a> {
    slots: Vec<Slot<'a>>,
    peeked: Vec<Option<DecodedEvent>>,
    heap: BinaryHeap<Reverse<HeapKey>>,
    pending_refill: Option<StreamIndex>,
}

impl<'a> MergedIterator<'a> {
    /// Open the merge over `streams` (one entry per tracefile, in an order
    /// that assigns each a stable [`StreamIndex`]), priming the heap with
    /// every stream's first event.
    pub fn begin(
        streams: Vec<(TraceIndex, StreamDecoder<'a>)>,
        registries: &[MarkerRegistry],
    ) -> Result<Self, DecodeError> {
        let mut iter = MergedIterator {
            slots: Vec::with_capacity(streams.len()),
            peeked: Vec::with_capacity(streams.len()),
            heap: BinaryHeap::new(),
            pending_refill: None,
        };
        for (trace_index, decoder) in streams {
            let cpu = decoder.cpu();
            iter.slots.push(Slot { trace_index, cpu, decoder });
            iter.peeked.push(None);
        }
        for idx in 0..iter.slots.len() {
            iter.refill(StreamIndex(idx), registries)?;
        }
        Ok(iter)
    }

    /// Refill one stream's peeked slot. A [`DecodeError::TruncatedTrace`]
    /// (writer died mid-sub-buffer) only ever affects the one stream it came
    /// from, so it is logged and swallowed here, dropping that stream from
    /// future consideration while the rest of the merge continues. Every
    /// other variant (`BadMagic`, `CorruptBlockHeader`,
    /// `UnsupportedArchitecture`, `UnknownEventId`, ...) means the trace
    /// itself is malformed and must abort the whole analysis, so it
    /// propagates instead.
    fn refill(&mut self, idx: StreamIndex, registries: &[MarkerRegistry]) -> Result<(), DecodeError> {
        let slot = &mut self.slots[idx.0];
        let registry = &registries[slot.trace_index.0];
        match slot.decoder.next_event(registry) {
            Ok(Some(event)) => {
                let key = HeapKey { tsc: event.tsc, trace_index: slot.trace_index, stream_index: idx };
                self.peeked[idx.0] = Some(event);
                self.heap.push(Reverse(key));
                Ok(())
            }
            Ok(None) => {
                self.peeked[idx.0] = None;
                Ok(())
            }
            Err(DecodeError::TruncatedTrace { cpu }) => {
                log::warn!("stream cpu {cpu} ended early: writer died mid-sub-buffer; dropping stream from the merge");
                self.peeked[idx.0] = None;
                Ok(())
            }
            Err(err) => {
                self.peeked[idx.0] = None;
                Err(err)
            }
        }
    }

    /// Pop the globally-earliest pending event. Returns `Ok(None)` once
    /// every stream is exhausted or dropped. A format/schema error from
    /// refilling the slot the previous event came from aborts the merge
    /// entirely; see [`Self::refill`].
    pub fn next(&mut self, registries: &[MarkerRegistry]) -> Result<Option<MergedEvent>, DecodeError> {
        if let Some(idx) = self.pending_refill.take() {
            self.refill(idx, registries)?;
        }
        let Some(Reverse(key)) = self.heap.pop() else { return Ok(None) };
        let event = self.peeked[key.stream_index.0].take().expect("heap key without a peeked event");
        self.pending_refill = Some(key.stream_index);
        Ok(Some(MergedEvent { trace_index: key.trace_index, stream_index: key.stream_index, event }))
    }

    /// Jump every stream directly to the sub-buffer covering `target` via
    /// binary search (see [`StreamDecoder::seek_to_tsc`]), then rebuild the
    /// heap from scratch. Unlike [`Self::next`], this fires no per-event
    /// logic at all: the caller is responsible for replaying anything
    /// between the old position and `target` through the state tracker if
    /// that matters, which is why this is a coarse positioning primitive
    /// rather than a full seek on its own.
    pub fn jump_to_tsc(&mut self, registries: &[MarkerRegistry], target: Tsc) -> Result<(), DecodeError> {
        self.heap.clear();
        self.pending_refill = None;
        for slot in &mut self.slots {
            slot.decoder.seek_to_tsc(target)?;
        }
        for idx in 0..self.slots.len() {
            self.refill(StreamIndex(idx), registries)?;
        }
        Ok(())
    }

    /// True once every stream has been exhausted or dropped.
    #[must_use]
    pub fn at_end(&self) -> bool {
        self.heap.is_empty() && self.pending_refill.is_none()
    }

    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.slots.len()
    }

    /// The smallest pending tsc across all streams, without popping it.
    #[must_use]
    pub(crate) fn peek_min_tsc(&self) -> Option<Tsc> {
        self.heap.peek().map(|Reverse(key)| key.tsc)
    }

    pub(crate) fn slot_trace_index(&self, idx: StreamIndex) -> TraceIndex {
        self.slots[idx.0].trace_index
    }

    pub(crate) fn slot_decoder(&self, idx: StreamIndex) -> StreamDecoder<'a> {
        self.slots[idx.0].decoder
    }

    pub(crate) fn slot_peeked(&self, idx: StreamIndex) -> Option<DecodedEvent> {
        self.peeked[idx.0].clone()
    }

    /// Rebuild `self` entirely from a prior snapshot's `(trace, decoder,
    /// peeked)` triples, used by [`super::position::Position`] restore.
    pub(crate) fn reset_with(
        &mut self,
        items: impl Iterator<Item = (TraceIndex, StreamDecoder<'a>, Option<DecodedEvent>)>,
    ) {
        self.slots.clear();
        self.peeked.clear();
        self.heap.clear();
        self.pending_refill = None;
        for (idx, (trace_index, decoder, peeked)) in items.enumerate() {
            let cpu = decoder.cpu();
            if let Some(event) = &peeked {
                let key = HeapKey { tsc: event.tsc, trace_index, stream_index: StreamIndex(idx) };
                self.heap.push(Reverse(key));
            }
            self.slots.push(Slot { trace_index, cpu, decoder });
            self.peeked.push(peeked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::fixtures::{build_first_subbuffer, default_trace_header};
    use crate::decode::StreamDecoder;
    use crate::domain::types::EventId;

    fn single_event_stream(begin_tsc: u64, delta: u32) -> Vec<u8> {
        build_first_subbuffer(
            &default_trace_header(),
            begin_tsc,
            begin_tsc + 1000,
            1_000_000,
            4096,
            &[(lttv_wire::EVENT_ID_HEARTBEAT, delta, &[])],
        )
    }

    #[test]
    fn unknown_event_id_aborts_the_merge_instead_of_dropping_the_stream() {
        let data = build_first_subbuffer(
            &default_trace_header(),
            0,
            1_000,
            1_000_000,
            4096,
            &[(lttv_wire::EVENT_ID_HEARTBEAT, 5, &[]), (99, 5, &[])],
        );
        let s0 = StreamDecoder::open(&data, Cpu(0)).unwrap().decoder;
        let registries = vec![MarkerRegistry::new()];
        let mut iter = MergedIterator::begin(vec![(TraceIndex(0), s0)], &registries).unwrap();

        let first = iter.next(&registries).unwrap().unwrap();
        assert_eq!(first.event.tsc, Tsc(5));
        let err = iter.next(&registries).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEventId(id) if id == EventId(99)));
    }

    #[test]
    fn jump_to_tsc_repositions_every_stream_without_linear_replay() {
        let d0 = single_event_stream(0, 50);
        let d1 = single_event_stream(0, 10);
        let s0 = StreamDecoder::open(&d0, Cpu(0)).unwrap().decoder;
        let s1 = StreamDecoder::open(&d1, Cpu(1)).unwrap().decoder;

        let registries = vec![MarkerRegistry::new()];
        let mut iter =
            MergedIterator::begin(vec![(TraceIndex(0), s0), (TraceIndex(0), s1)], &registries).unwrap();

        iter.jump_to_tsc(&registries, Tsc(20)).unwrap();
        // both single-subbuffer streams have only one sub-buffer each, so a
        // jump lands back at its sole event regardless of target
        let first = iter.next(&registries).unwrap().unwrap();
        assert_eq!(first.event.tsc, Tsc(10));
        let second = iter.next(&registries).unwrap().unwrap();
        assert_eq!(second.event.tsc, Tsc(50));
    }

    #[test]
    fn merges_in_tsc_order_across_streams() {
        let d0 = single_event_stream(0, 50);
        let d1 = single_event_stream(0, 10);
        let s0 = StreamDecoder::open(&d0, Cpu(0)).unwrap().decoder;
        let s1 = StreamDecoder::open(&d1, Cpu(1)).unwrap().decoder;

        let registries = vec![MarkerRegistry::new()];
        let mut iter =
            MergedIterator::begin(vec![(TraceIndex(0), s0), (TraceIndex(0), s1)], &registries).unwrap();

        let first = iter.next(&registries).unwrap().unwrap();
        assert_eq!(first.event.tsc, Tsc(10));
        let second = iter.next(&registries).unwrap().unwrap();
        assert_eq!(second.event.tsc, Tsc(50));
        assert!(iter.next(&registries).unwrap().is_none());
        assert!(iter.at_end());
    }

    #[test]
    fn deferred_refill_sees_registry_updates_from_caller() {
        // A marker_id_declare event followed immediately (same stream) by a
        // user event using that id must decode successfully: the driver is
        // expected to register the id between the two `next()` calls.
        let header = default_trace_header();
        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_le_bytes()); // marker_id_declare
        body.extend_from_slice(&0u32.to_le_bytes()); // tsc delta
        body.extend_from_slice(&9u16.to_le_bytes()); // declared id
        body.extend_from_slice(b"m\0");
        body.extend_from_slice(&9u16.to_le_bytes()); // user event id=9
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&42u8.to_le_bytes());

        // Built by hand rather than through `build_first_subbuffer`, whose
        // helper only accepts (id, delta, payload) triples and can't express
        // a declare event and a user event sharing one just-declared id.
        let mut data = Vec::new();
        let block_header_len = lttv_wire::BlockHeader::ENCODED_SIZE;
        let mut full_body = crate::decode::fixtures::encode_trace_header(&header);
        full_body.extend_from_slice(&body);
        let buf_size = (block_header_len + full_body.len() + 16) as u32;
        let lost_size = buf_size - block_header_len as u32 - full_body.len() as u32;
        let block = lttv_wire::BlockHeader {
            begin_cycle_count: 0,
            begin_freq_khz: 1_000_000,
            end_cycle_count: 100,
            end_freq_khz: 1_000_000,
            lost_size,
            buf_size,
        };
        data.extend_from_slice(&crate::decode::fixtures::encode_block_header(&block));
        data.extend_from_slice(&full_body);
        data.resize(buf_size as usize, 0);

        let opened = StreamDecoder::open(&data, Cpu(0)).unwrap();
        let mut registries = vec![MarkerRegistry::new()];
        let mut iter = MergedIterator::begin(vec![(TraceIndex(0), opened.decoder)], &registries).unwrap();

        let declare = iter.next(&registries).unwrap().unwrap();
        match &declare.event.kind {
            crate::decode::EventKind::MarkerIdDeclare { id, name } => {
                registries[0].declare_id(*id, name).unwrap();
                registries[0].declare_format(*id, "v:uint8").unwrap();
            }
            other => panic!("expected MarkerIdDeclare, got {other:?}"),
        }

        let user = iter.next(&registries).unwrap().unwrap();
        match user.event.kind {
            crate::decode::EventKind::User { id, payload } => {
                assert_eq!(id, crate::domain::types::EventId(9));
                assert_eq!(payload, vec![42]);
            }
            other => panic!("expected User event, got {other:?}"),
        }
    }
}
