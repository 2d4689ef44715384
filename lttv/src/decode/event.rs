//! Per-event decoding (C4): tsc reconstruction and payload extraction.
//!
//! The wire event header carries only a 32-bit delta from the previous
//! event's tsc, not an absolute timestamp or a payload length. Absolute tsc
//! is reconstructed by accumulating deltas from the enclosing sub-buffer's
//! `begin_cycle_count`; periodic heartbeat events (§6.1) bound how far this
//! can drift without ever needing to reconcile a wrapped 32-bit counter.
//! Payload length for a non-control event is derived from its declared
//! marker format (fixed-size fields sum their sizes; a trailing `string`
//! field runs to the next NUL), since the wire format has no explicit
//! per-event length.

use lttv_wire::{EVENT_ID_FACILITY_LOAD, EVENT_ID_HEARTBEAT, EVENT_ID_MARKER_FORMAT_DECLARE, EVENT_ID_MARKER_ID_DECLARE};

use super::reader::ByteReader;
use crate::domain::errors::DecodeError;
use crate::domain::types::{Cpu, EventId, Tsc};
use crate::marker::{resolve_offsets, MarkerRegistry};

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Heartbeat,
    FacilityLoad { name: String, checksum: u32 },
    MarkerIdDeclare { id: EventId, name: String },
    MarkerFormatDeclare { id: EventId, format: String },
    User { id: EventId, payload: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub cpu: Cpu,
    pub tsc: Tsc,
    pub kind: EventKind,
}

/// Decode one event starting at `reader`'s current position. Returns the
/// decoded event and the tsc to carry forward as `last_tsc` for the next
/// call.
///
/// `end_tsc` is the enclosing sub-buffer's declared `end_cycle_count`; it
/// bounds the reconstructed tsc so a delta that overshoots the block's own
/// claimed end (rollover) is clamped rather than trusted outright. A
/// reconstructed tsc that falls *behind* `last_tsc` is a rewind: both are
/// consistency violations, logged and clamped rather than failing the
/// decode, per [`DecodeError::TimestampGoesBackwards`]'s recovery policy.
pub fn decode_event(
    reader: &mut ByteReader<'_>,
    cpu: Cpu,
    last_tsc: Tsc,
    end_tsc: Tsc,
    markers: &MarkerRegistry,
) -> Result<(DecodedEvent, Tsc), DecodeError> {
    let event_id = reader.read_u16()?;
    let tsc_delta = reader.read_u32()?;
    let reconstructed = Tsc(last_tsc.0.wrapping_add(u64::from(tsc_delta)));
    let tsc = if reconstructed.0 < last_tsc.0 {
        let err = DecodeError::TimestampGoesBackwards { previous: last_tsc, new: reconstructed, cpu };
        log::warn!("{err}; re-seating to previous value");
        last_tsc
    } else if end_tsc.0 != 0 && reconstructed.0 > end_tsc.0 {
        log::warn!(
            "reconstructed tsc {} on cpu {cpu} overshoots sub-buffer end_tsc {}; rollover detected, clamping",
            reconstructed.0, end_tsc.0
        );
        end_tsc
    } else {
        reconstructed
    };

    let kind = match event_id {
        EVENT_ID_HEARTBEAT => EventKind::Heartbeat,
        EVENT_ID_FACILITY_LOAD => {
            let name = reader.read_cstr()?;
            let checksum = reader.read_u32()?;
            EventKind::FacilityLoad { name, checksum }
        }
        EVENT_ID_MARKER_ID_DECLARE => {
            let id = EventId(reader.read_u16()?);
            let name = reader.read_cstr()?;
            EventKind::MarkerIdDeclare { id, name }
        }
        EVENT_ID_MARKER_FORMAT_DECLARE => {
            let id = EventId(reader.read_u16()?);
            let format = reader.read_cstr()?;
            EventKind::MarkerFormatDeclare { id, format }
        }
        raw => {
            let id = EventId(raw);
            let info = markers.get(id).ok_or(DecodeError::UnknownEventId(id))?;
            let format = info.format.as_ref().ok_or(DecodeError::UnknownEventId(id))?;
            let start = reader.position();
            let candidate_len = reader.remaining();
            let candidate = reader.read_bytes(candidate_len)?;
            let resolved =
                resolve_offsets(&format.fields, candidate).map_err(|_| DecodeError::UnknownEventId(id))?;
            let total_len = resolved.last().map_or(0, |f| f.offset + f.len);
            reader.seek(start + total_len);
            EventKind::User { id, payload: candidate[..total_len].to_vec() }
        }
    };
    Ok((DecodedEvent { cpu, tsc, kind }, tsc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_heartbeat_and_advances_tsc() {
        let mut markers = MarkerRegistry::new();
        markers.declare_id(EventId(10), "unused").unwrap();
        let data = [0u8, 0, 5, 0, 0, 0]; // event_id=0 (heartbeat), delta=5
        let mut r = ByteReader::new(&data);
        let (event, new_tsc) = decode_event(&mut r, Cpu(0), Tsc(100), Tsc::ZERO, &markers).unwrap();
        assert_eq!(event.kind, EventKind::Heartbeat);
        assert_eq!(new_tsc, Tsc(105));
    }

    #[test]
    fn decodes_marker_id_declare() {
        let markers = MarkerRegistry::new();
        let mut data = vec![2u8, 0, 0, 0, 0, 0]; // event_id=2, delta=0
        data.extend_from_slice(&7u16.to_le_bytes());
        data.extend_from_slice(b"my_marker\0");
        let mut r = ByteReader::new(&data);
        let (event, _) = decode_event(&mut r, Cpu(0), Tsc::ZERO, Tsc::ZERO, &markers).unwrap();
        assert_eq!(
            event.kind,
            EventKind::MarkerIdDeclare { id: EventId(7), name: "my_marker".into() }
        );
    }

    #[test]
    fn decodes_user_event_with_fixed_and_string_fields() {
        let mut markers = MarkerRegistry::new();
        markers.declare_id(EventId(10), "m").unwrap();
        markers.declare_format(EventId(10), "pid:uint32,comm:string").unwrap();

        let mut data = vec![10u8, 0, 1, 0, 0, 0]; // event_id=10, delta=1
        data.extend_from_slice(&42u32.to_le_bytes());
        data.extend_from_slice(b"bash\0");
        data.extend_from_slice(b"trailing garbage from the next event header");
        let mut r = ByteReader::new(&data);
        let (event, _) = decode_event(&mut r, Cpu(1), Tsc::ZERO, Tsc::ZERO, &markers).unwrap();
        match event.kind {
            EventKind::User { id, payload } => {
                assert_eq!(id, EventId(10));
                assert_eq!(payload.len(), 9); // 4 bytes pid + "bash\0"
                assert_eq!(&payload[4..], b"bash\0");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
        // reader should have stopped right after the payload, not consumed the trailing bytes
        assert_eq!(r.position(), 6 + 9);
    }

    #[test]
    fn unknown_event_id_errors() {
        let markers = MarkerRegistry::new();
        let data = [99u8, 0, 0, 0, 0, 0];
        let mut r = ByteReader::new(&data);
        let err = decode_event(&mut r, Cpu(0), Tsc::ZERO, Tsc::ZERO, &markers).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEventId(id) if id == EventId(99)));
    }

    #[test]
    fn declared_id_without_format_errors() {
        let mut markers = MarkerRegistry::new();
        markers.declare_id(EventId(10), "m").unwrap();
        let data = [10u8, 0, 0, 0, 0, 0];
        let mut r = ByteReader::new(&data);
        assert!(decode_event(&mut r, Cpu(0), Tsc::ZERO, Tsc::ZERO, &markers).is_err());
    }

    #[test]
    fn tsc_overshooting_block_end_clamps_to_end_tsc() {
        let markers = MarkerRegistry::new();
        let data = [0u8, 0, 10, 0, 0, 0]; // heartbeat, delta=10
        let mut r = ByteReader::new(&data);
        let (event, new_tsc) = decode_event(&mut r, Cpu(0), Tsc(100), Tsc(105), &markers).unwrap();
        assert_eq!(new_tsc, Tsc(105));
        assert_eq!(event.tsc, Tsc(105));
    }

    #[test]
    fn tsc_rewind_clamps_to_previous_instead_of_erroring() {
        // delta=1 against a last_tsc one below u64::MAX wraps the 64-bit
        // accumulator itself, landing far behind last_tsc: the rewind path.
        let markers = MarkerRegistry::new();
        let data = [0u8, 0, 1, 0, 0, 0]; // heartbeat, delta=1
        let mut r = ByteReader::new(&data);
        let (event, new_tsc) = decode_event(&mut r, Cpu(0), Tsc(u64::MAX), Tsc::ZERO, &markers).unwrap();
        assert_eq!(new_tsc, Tsc(u64::MAX));
        assert_eq!(event.tsc, Tsc(u64::MAX));
    }
}
