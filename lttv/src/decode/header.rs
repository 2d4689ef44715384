//! Block- and trace-header parsing (C4), matching the layout declared in
//! `lttv-wire`.

use lttv_wire::{ArchSize, BlockHeader, TraceHeader, TRACE_MAGIC};

use super::reader::ByteReader;
use crate::domain::errors::DecodeError;

pub fn read_block_header(r: &mut ByteReader<'_>) -> Result<BlockHeader, DecodeError> {
    Ok(BlockHeader {
        begin_cycle_count: r.read_u64()?,
        begin_freq_khz: r.read_u64()?,
        end_cycle_count: r.read_u64()?,
        end_freq_khz: r.read_u64()?,
        lost_size: r.read_u32()?,
        buf_size: r.read_u32()?,
    })
}

pub fn read_trace_header(r: &mut ByteReader<'_>) -> Result<TraceHeader, DecodeError> {
    let header = TraceHeader {
        magic: r.read_u32()?,
        arch_type: r.read_u32()?,
        arch_variant: r.read_u32()?,
        float_word_order: r.read_u32()?,
        arch_size: r.read_u32()?,
        major: r.read_u16()?,
        minor: r.read_u16()?,
        flight_recorder: r.read_u8()?,
        has_heartbeat: r.read_u8()?,
        has_alignment: r.read_u8()?,
        _reserved: r.read_u8()?,
        freq_scale: r.read_u32()?,
        start_freq: r.read_u64()?,
        start_tsc: r.read_u64()?,
        start_monotonic: r.read_u64()?,
        start_time_sec: r.read_u64()?,
        start_time_usec: r.read_u64()?,
    };
    if !header.is_valid_magic() {
        return Err(DecodeError::BadMagic { expected: TRACE_MAGIC, found: header.magic });
    }
    if ArchSize::from_trace_value(header.arch_size).is_none() {
        return Err(DecodeError::UnsupportedArchitecture { arch_size: header.arch_size });
    }
    Ok(header)
}
