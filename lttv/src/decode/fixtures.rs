//! Synthetic trace encoders, used by this crate's own tests and by the
//! integration tests under `tests/` to build in-memory traces without
//! needing real trace files on disk.

use lttv_wire::{BlockHeader, EventHeader, TraceHeader};

pub fn encode_block_header(h: &BlockHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(BlockHeader::ENCODED_SIZE);
    out.extend_from_slice(&h.begin_cycle_count.to_le_bytes());
    out.extend_from_slice(&h.begin_freq_khz.to_le_bytes());
    out.extend_from_slice(&h.end_cycle_count.to_le_bytes());
    out.extend_from_slice(&h.end_freq_khz.to_le_bytes());
    out.extend_from_slice(&h.lost_size.to_le_bytes());
    out.extend_from_slice(&h.buf_size.to_le_bytes());
    out
}

pub fn encode_trace_header(h: &TraceHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(TraceHeader::ENCODED_SIZE);
    out.extend_from_slice(&h.magic.to_le_bytes());
    out.extend_from_slice(&h.arch_type.to_le_bytes());
    out.extend_from_slice(&h.arch_variant.to_le_bytes());
    out.extend_from_slice(&h.float_word_order.to_le_bytes());
    out.extend_from_slice(&h.arch_size.to_le_bytes());
    out.extend_from_slice(&h.major.to_le_bytes());
    out.extend_from_slice(&h.minor.to_le_bytes());
    out.push(h.flight_recorder);
    out.push(h.has_heartbeat);
    out.push(h.has_alignment);
    out.push(h._reserved);
    out.extend_from_slice(&h.freq_scale.to_le_bytes());
    out.extend_from_slice(&h.start_freq.to_le_bytes());
    out.extend_from_slice(&h.start_tsc.to_le_bytes());
    out.extend_from_slice(&h.start_monotonic.to_le_bytes());
    out.extend_from_slice(&h.start_time_sec.to_le_bytes());
    out.extend_from_slice(&h.start_time_usec.to_le_bytes());
    out
}

pub fn encode_event_header(h: &EventHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(EventHeader::ENCODED_SIZE);
    out.extend_from_slice(&h.event_id.to_le_bytes());
    out.extend_from_slice(&h.tsc_delta.to_le_bytes());
    out
}

/// One event to embed in a synthetic sub-buffer: `(event_id, tsc_delta, payload)`.
pub type RawEvent<'a> = (u16, u32, &'a [u8]);

/// Build one sub-buffer containing the trace header (only valid for the
/// first sub-buffer of a stream) followed by `events`, padded out to
/// `buf_size` total bytes. Returns the encoded bytes.
#[must_use]
pub fn build_first_subbuffer(
    trace_header: &TraceHeader,
    begin_cycle_count: u64,
    end_cycle_count: u64,
    freq_khz: u64,
    buf_size: u32,
    events: &[RawEvent<'_>],
) -> Vec<u8> {
    let mut body = encode_trace_header(trace_header);
    for &(id, delta, payload) in events {
        body.extend_from_slice(&encode_event_header(&EventHeader { event_id: id, tsc_delta: delta }));
        body.extend_from_slice(payload);
    }
    let header_len = BlockHeader::ENCODED_SIZE as u32;
    let lost_size = buf_size
        .checked_sub(header_len + u32::try_from(body.len()).expect("body fits u32"))
        .expect("buf_size too small for header + body");
    let block = BlockHeader { begin_cycle_count, begin_freq_khz: freq_khz, end_cycle_count, end_freq_khz: freq_khz, lost_size, buf_size };
    let mut out = encode_block_header(&block);
    out.extend_from_slice(&body);
    out.resize(buf_size as usize, 0);
    out
}

/// Build a non-first sub-buffer: block header followed by `events`, padded
/// to `buf_size`.
#[must_use]
pub fn build_subbuffer(
    begin_cycle_count: u64,
    end_cycle_count: u64,
    freq_khz: u64,
    buf_size: u32,
    events: &[RawEvent<'_>],
) -> Vec<u8> {
    let mut body = Vec::new();
    for &(id, delta, payload) in events {
        body.extend_from_slice(&encode_event_header(&EventHeader { event_id: id, tsc_delta: delta }));
        body.extend_from_slice(payload);
    }
    let header_len = BlockHeader::ENCODED_SIZE as u32;
    let lost_size = buf_size
        .checked_sub(header_len + u32::try_from(body.len()).expect("body fits u32"))
        .expect("buf_size too small for header + body");
    let block = BlockHeader { begin_cycle_count, begin_freq_khz: freq_khz, end_cycle_count, end_freq_khz: freq_khz, lost_size, buf_size };
    let mut out = encode_block_header(&block);
    out.extend_from_slice(&body);
    out.resize(buf_size as usize, 0);
    out
}

#[must_use]
pub fn default_trace_header() -> TraceHeader {
    TraceHeader {
        magic: lttv_wire::TRACE_MAGIC,
        arch_type: 0,
        arch_variant: 0,
        float_word_order: 0,
        arch_size: 8,
        major: 0,
        minor: 1,
        flight_recorder: 0,
        has_heartbeat: 1,
        has_alignment: 1,
        _reserved: 0,
        freq_scale: 1,
        start_freq: 1_000_000,
        start_tsc: 0,
        start_monotonic: 0,
        start_time_sec: 0,
        start_time_usec: 0,
    }
}
