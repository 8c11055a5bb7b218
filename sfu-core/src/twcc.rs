//! Receive-side transport-wide congestion control feedback (spec.md §4.8):
//! arrival-time bookkeeping keyed by the transport-sequence-number header
//! extension, packed into a `TransportLayerCc` on a fixed cadence. The wire
//! format itself is exact
//! (`sfu_rtcp::transport_feedbacks::transport_layer_cc`, grounded on
//! `rtc-interceptor::twcc::recorder`); this module only decides which
//! packets to report and how to pack them. Where the teacher's
//! `Recorder` runs a bit-packing optimizer to minimize the chunk count,
//! this uses a greedy run-length packer instead — simpler and sufficient
//! since chunk compactness isn't a correctness property, documented as a
//! simplification in DESIGN.md.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use sfu_rtcp::transport_feedbacks::transport_layer_cc::{
    PacketStatusChunk, RecvDelta, RunLengthChunk, StatusChunkTypeTcc, SymbolTypeTcc,
    TransportLayerCc,
};
use sfu_shared::seq::SequenceUnwrapper;

/// Fixed feedback cadence (spec.md §4.8); a tick that finds nothing pending
/// is a no-op rather than emitting an empty feedback packet.
pub const TICK_INTERVAL: Duration = Duration::from_millis(25);

/// The largest delta (in 250us units) a single-byte "small delta" symbol
/// can represent.
const SMALL_DELTA_MAX_US: i64 = 63 * 250;

pub struct ReceiveSideTwcc {
    media_ssrc: u32,
    unwrapper: SequenceUnwrapper,
    highest_ext: Option<i64>,
    pending: BTreeMap<i64, Option<Instant>>,
    epoch: Option<Instant>,
    fb_pkt_count: u8,
    next_tick_at: Instant,
}

impl ReceiveSideTwcc {
    pub fn new(media_ssrc: u32, now: Instant) -> Self {
        Self {
            media_ssrc,
            unwrapper: SequenceUnwrapper::new(),
            highest_ext: None,
            pending: BTreeMap::new(),
            epoch: None,
            fb_pkt_count: 0,
            next_tick_at: now + TICK_INTERVAL,
        }
    }

    /// Records one packet's transport-sequence-number and arrival time,
    /// backfilling any sequence gap it reveals as not-yet-received.
    pub fn record_arrival(&mut self, transport_seq: u16, now: Instant) {
        if self.epoch.is_none() {
            self.epoch = Some(now);
        }
        let ext = self.unwrapper.unwrap(transport_seq);
        match self.highest_ext {
            Some(highest) if ext > highest => {
                let mut missing = highest + 1;
                while missing < ext {
                    self.pending.entry(missing).or_insert(None);
                    missing += 1;
                }
                self.highest_ext = Some(ext);
            }
            Some(_) => {}
            None => self.highest_ext = Some(ext),
        }
        self.pending.insert(ext, Some(now));
    }

    /// Returns a feedback packet if the cadence has elapsed and at least
    /// one arrival (or gap) is pending; otherwise a no-op.
    pub fn tick(&mut self, now: Instant, sender_ssrc: u32) -> Option<TransportLayerCc> {
        if now < self.next_tick_at {
            return None;
        }
        self.next_tick_at = now + TICK_INTERVAL;
        if self.pending.is_empty() {
            return None;
        }

        let epoch = self.epoch.unwrap_or(now);
        let entries: Vec<(i64, Option<Instant>)> = std::mem::take(&mut self.pending).into_iter().collect();
        let base_sequence_number = (entries[0].0 & 0xFFFF) as u16;
        let packet_status_count = entries.len() as u16;
        // Reference time is in 64ms units (draft §3.1), truncated to the
        // wire's 24-bit field on marshal.
        let reference_time = (now.duration_since(epoch).as_millis() as u32 / 64) & 0x00FF_FFFF;

        let mut last_arrival: Option<Instant> = None;
        let mut symbols = Vec::with_capacity(entries.len());
        let mut recv_deltas = Vec::new();
        for (_, arrived_at) in &entries {
            match arrived_at {
                None => symbols.push(SymbolTypeTcc::PacketNotReceived),
                Some(t) => {
                    let raw_us = match last_arrival {
                        Some(prev) => t.duration_since(prev).as_micros() as i64,
                        None => t.duration_since(epoch).as_micros() as i64,
                    };
                    let quantized = (raw_us / 250) * 250;
                    let symbol = if (0..=SMALL_DELTA_MAX_US).contains(&quantized) {
                        SymbolTypeTcc::PacketReceivedSmallDelta
                    } else {
                        SymbolTypeTcc::PacketReceivedLargeDelta
                    };
                    symbols.push(symbol);
                    recv_deltas.push(RecvDelta { type_tcc_packet: symbol, delta: quantized });
                    last_arrival = Some(*t);
                }
            }
        }

        self.fb_pkt_count = self.fb_pkt_count.wrapping_add(1);

        Some(TransportLayerCc {
            sender_ssrc,
            media_ssrc: self.media_ssrc,
            base_sequence_number,
            packet_status_count,
            reference_time,
            fb_pkt_count: self.fb_pkt_count,
            packet_chunks: pack_run_length(&symbols),
            recv_deltas,
        })
    }
}

/// Groups consecutive identical-status symbols into run-length chunks
/// (draft §3.1.3), capped at the 13-bit run-length field width.
fn pack_run_length(symbols: &[SymbolTypeTcc]) -> Vec<PacketStatusChunk> {
    const MAX_RUN: u16 = 0x1FFF;
    let mut chunks = Vec::new();
    let mut i = 0;
    while i < symbols.len() {
        let symbol = symbols[i];
        let mut run = 0u16;
        while i < symbols.len() && symbols[i] == symbol && run < MAX_RUN {
            run += 1;
            i += 1;
        }
        chunks.push(PacketStatusChunk::RunLengthChunk(RunLengthChunk {
            type_tcc: StatusChunkTypeTcc::RunLengthChunk,
            packet_status_symbol: symbol,
            run_length: run,
        }));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_before_cadence_elapses_is_a_no_op() {
        let now = Instant::now();
        let mut twcc = ReceiveSideTwcc::new(7, now);
        twcc.record_arrival(0, now);
        assert!(twcc.tick(now, 1).is_none());
    }

    #[test]
    fn tick_with_nothing_pending_is_a_no_op() {
        let now = Instant::now();
        let mut twcc = ReceiveSideTwcc::new(7, now);
        assert!(twcc.tick(now + TICK_INTERVAL, 1).is_none());
    }

    #[test]
    fn gap_is_reported_as_not_received() {
        let now = Instant::now();
        let mut twcc = ReceiveSideTwcc::new(7, now);
        twcc.record_arrival(0, now);
        twcc.record_arrival(2, now + Duration::from_millis(5)); // 1 never arrives
        let fb = twcc.tick(now + TICK_INTERVAL, 1).unwrap();
        assert_eq!(fb.packet_status_count, 3);
        assert_eq!(fb.base_sequence_number, 0);
        assert_eq!(
            fb.packet_chunks,
            vec![
                PacketStatusChunk::RunLengthChunk(RunLengthChunk {
                    type_tcc: StatusChunkTypeTcc::RunLengthChunk,
                    packet_status_symbol: SymbolTypeTcc::PacketReceivedSmallDelta,
                    run_length: 1,
                }),
                PacketStatusChunk::RunLengthChunk(RunLengthChunk {
                    type_tcc: StatusChunkTypeTcc::RunLengthChunk,
                    packet_status_symbol: SymbolTypeTcc::PacketNotReceived,
                    run_length: 1,
                }),
                PacketStatusChunk::RunLengthChunk(RunLengthChunk {
                    type_tcc: StatusChunkTypeTcc::RunLengthChunk,
                    packet_status_symbol: SymbolTypeTcc::PacketReceivedSmallDelta,
                    run_length: 1,
                }),
            ]
        );
    }

    #[test]
    fn pending_resets_after_a_successful_tick() {
        let now = Instant::now();
        let mut twcc = ReceiveSideTwcc::new(7, now);
        twcc.record_arrival(0, now);
        let fb = twcc.tick(now + TICK_INTERVAL, 1);
        assert!(fb.is_some());
        assert!(twcc.tick(now + 2 * TICK_INTERVAL, 1).is_none());
    }
}
