//! Per-CPU stream decoder (C4): walks a tracefile's sub-buffers in order,
//! handing back one [`DecodedEvent`] at a time.

use lttv_wire::{BlockHeader, TraceHeader};

use super::event::{decode_event, DecodedEvent};
use super::header::{read_block_header, read_trace_header};
use super::reader::ByteReader;
use crate::domain::errors::DecodeError;
use crate::domain::types::{Cpu, Tsc};
use crate::marker::MarkerRegistry;

pub struct OpenedStream<'a> {
    pub decoder: StreamDecoder<'a>,
    pub trace_header: TraceHeader,
}

/// One sub-buffer's cursor bookkeeping plus tsc range, used only to binary
/// search for the sub-buffer covering a seek target.
struct SubBufferSpan {
    cursor: usize,
    events_end: usize,
    next_block_offset: usize,
    begin_tsc: Tsc,
    end_tsc: Tsc,
}

/// Walks one per-CPU tracefile's bytes, yielding events in on-disk order.
/// Absolute timestamps and marker lookups are threaded through explicitly;
/// this type holds no trace-wide state of its own.
///
/// `Clone`/`Copy` because every field is either a borrowed slice or a plain
/// integer: snapshotting a decoder's cursor state is how the merged
/// iterator implements position save/restore.
#[derive(Clone, Copy)]
pub struct StreamDecoder<'a> {
    data: &'a [u8],
    cpu: Cpu,
    cursor: usize,
    events_end: usize,
    next_block_offset: usize,
    last_tsc: Tsc,
    end_tsc: Tsc,
    finished: bool,
}

impl<'a> StreamDecoder<'a> {
    /// Parse sub-buffer 0's block header and embedded trace header, leaving
    /// the cursor positioned at the first event.
    pub fn open(data: &'a [u8], cpu: Cpu) -> Result<OpenedStream<'a>, DecodeError> {
        let mut r = ByteReader::new(data);
        let block = read_block_header(&mut r)?;
        if block.is_truncated() {
            return Err(DecodeError::TruncatedTrace { cpu });
        }
        let trace_header = read_trace_header(&mut r)?;
        let header_total = r.position();
        let buf_size = block.buf_size as usize;
        if buf_size < header_total || buf_size > data.len() {
            return Err(DecodeError::CorruptBlockHeader {
                buf_size: block.buf_size,
                remaining: data.len() as u64,
            });
        }
        let events_end = buf_size.saturating_sub(block.lost_size as usize);
        if events_end < header_total {
            return Err(DecodeError::CorruptBlockHeader {
                buf_size: block.buf_size,
                remaining: data.len() as u64,
            });
        }
        let decoder = StreamDecoder {
            data,
            cpu,
            cursor: header_total,
            events_end,
            next_block_offset: buf_size,
            last_tsc: Tsc(block.begin_cycle_count),
            end_tsc: Tsc(block.end_cycle_count),
            finished: false,
        };
        Ok(OpenedStream { decoder, trace_header })
    }

    #[must_use]
    pub fn cpu(&self) -> Cpu {
        self.cpu
    }

    /// Walk every sub-buffer's block header from the start, without
    /// decoding any events, to build a tsc-ordered index cheap enough to
    /// binary-search. Sub-buffer headers are tiny compared to the events
    /// they contain, so this scan is far cheaper than decoding forward
    /// event-by-event to the same point.
    fn subbuffer_spans(data: &'a [u8]) -> Result<Vec<SubBufferSpan>, DecodeError> {
        let mut spans = Vec::new();
        let mut offset = 0usize;
        let mut first = true;
        while offset < data.len() {
            let mut r = ByteReader::new(&data[offset..]);
            let block = read_block_header(&mut r)?;
            if block.is_truncated() {
                break;
            }
            let mut header_len = BlockHeader::ENCODED_SIZE;
            if first {
                read_trace_header(&mut r)?;
                header_len = r.position();
                first = false;
            }
            let buf_size = block.buf_size as usize;
            if buf_size < header_len || offset + buf_size > data.len() {
                return Err(DecodeError::CorruptBlockHeader {
                    buf_size: block.buf_size,
                    remaining: (data.len() - offset) as u64,
                });
            }
            spans.push(SubBufferSpan {
                cursor: offset + header_len,
                events_end: offset + buf_size.saturating_sub(block.lost_size as usize),
                next_block_offset: offset + buf_size,
                begin_tsc: Tsc(block.begin_cycle_count),
                end_tsc: Tsc(block.end_cycle_count),
            });
            offset += buf_size;
        }
        Ok(spans)
    }

    /// Reposition this decoder directly at the sub-buffer covering `target`,
    /// found via binary search over sub-buffer `begin_tsc`s rather than
    /// decoding every event between here and there. The decoder's cursor
    /// lands at that sub-buffer's first event, which may still be short of
    /// `target`; the caller is expected to finish with a short linear scan
    /// via [`Self::next_event`]. Landing past the final sub-buffer marks the
    /// stream finished. Does not fire any per-event logic, so callers that
    /// need marker declarations or state transitions applied must replay
    /// them separately.
    pub fn seek_to_tsc(&mut self, target: Tsc) -> Result<(), DecodeError> {
        let spans = Self::subbuffer_spans(self.data)?;
        let Some(cut) = spans.iter().position(|s| s.begin_tsc >= target) else {
            let Some(last) = spans.last() else {
                self.finished = true;
                return Ok(());
            };
            self.land_on(last);
            return Ok(());
        };
        let chosen = cut.saturating_sub(1);
        self.land_on(&spans[chosen]);
        Ok(())
    }

    fn land_on(&mut self, span: &SubBufferSpan) {
        self.cursor = span.cursor;
        self.events_end = span.events_end;
        self.next_block_offset = span.next_block_offset;
        self.last_tsc = span.begin_tsc;
        self.end_tsc = span.end_tsc;
        self.finished = false;
    }

    /// Decode the next event, crossing into subsequent sub-buffers as
    /// needed. Returns `Ok(None)` once the stream is exhausted. A truncated
    /// sub-buffer (writer died mid-write) ends the stream and is reported
    /// once as `Err(DecodeError::TruncatedTrace)`; the caller (the merged
    /// iterator) is expected to log it and drop this stream, not abort the
    /// whole traceset.
    pub fn next_event(&mut self, markers: &MarkerRegistry) -> Result<Option<DecodedEvent>, DecodeError> {
        loop {
            if self.finished {
                return Ok(None);
            }
            if self.cursor >= self.events_end {
                if self.next_block_offset >= self.data.len() {
                    self.finished = true;
                    return Ok(None);
                }
                let block_offset = self.next_block_offset;
                let mut r = ByteReader::new(&self.data[block_offset..]);
                let block = read_block_header(&mut r)?;
                if block.is_truncated() {
                    self.finished = true;
                    return Err(DecodeError::TruncatedTrace { cpu: self.cpu });
                }
                let header_len = BlockHeader::ENCODED_SIZE;
                let buf_size = block.buf_size as usize;
                if buf_size < header_len || block_offset + buf_size > self.data.len() {
                    self.finished = true;
                    return Err(DecodeError::CorruptBlockHeader {
                        buf_size: block.buf_size,
                        remaining: (self.data.len() - block_offset) as u64,
                    });
                }
                self.cursor = block_offset + header_len;
                self.events_end = block_offset + buf_size.saturating_sub(block.lost_size as usize);
                self.next_block_offset = block_offset + buf_size;
                self.last_tsc = Tsc(block.begin_cycle_count);
                self.end_tsc = Tsc(block.end_cycle_count);
                continue;
            }
            let mut r = ByteReader::new(&self.data[self.cursor..self.events_end]);
            let (event, new_tsc) = decode_event(&mut r, self.cpu, self.last_tsc, self.end_tsc, markers)?;
            self.cursor += r.position();
            self.last_tsc = new_tsc;
            return Ok(Some(event));
        }
    }
}
