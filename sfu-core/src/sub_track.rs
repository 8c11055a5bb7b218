//! Outbound per-subscriber track state: sequence-number continuity across
//! simulcast layer switches, a send-packet recorder for NACK-driven
//! retransmission, and periodic SR generation (spec.md §4.7). Grounded on
//! `rtc-interceptor::report::sender_stream::SenderStream` for the RTP
//! timestamp extrapolation used when building a sender report, and on
//! `rtc-interceptor::nack::send_buffer::SendBuffer` for the shape of a
//! packet recorder keyed by outbound sequence number (here bounded by a
//! time window and a hard count cap instead of a power-of-two ring, since
//! the recorder must also expire stale packets a NACK can no longer
//! usefully repair).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::Rng;
use sfu_rtcp::sender_report::SenderReport;
use sfu_rtp::packet::Packet;
use sfu_rtp::rtx;
use sfu_shared::time::SystemInstant;

/// Retention policy for the send-packet recorder (spec.md §4.7 open
/// question, decided in DESIGN.md): whichever is smaller of a 2s window
/// and a 600-packet cap.
const RECORDER_WINDOW: Duration = Duration::from_secs(2);
const RECORDER_CAP: usize = 600;

/// Sender-report cadence bounds: at most one every 5s, at least one every
/// 100ms, narrowed below that by the adaptive bitrate-based formula.
const SR_INTERVAL_MAX: Duration = Duration::from_secs(5);
const SR_INTERVAL_MIN: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct SubscribeTrackConfig {
    pub ssrc: u32,
    pub rtx_ssrc: Option<u32>,
    pub rtx_payload_type: Option<u8>,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub audio: bool,
}

struct Recorded {
    seq: u16,
    packet: Packet,
    sent_at: Instant,
}

struct Counters {
    packets: u32,
    octets: u32,
}

pub struct SubscribeTrack {
    pub config: SubscribeTrackConfig,
    epoch: SystemInstant,

    seq_offset: u16,
    max_sent: Option<u16>,
    rtx_seq: u16,

    recorder: VecDeque<Recorded>,

    last_rtp_time_rtp: u32,
    last_rtp_time_instant: Option<Instant>,
    counters: Counters,

    recent_sends: VecDeque<(Instant, usize)>,

    next_sr_at: Instant,
    last_rr_lsr: u32,
    last_rtt: Option<Duration>,
}

impl SubscribeTrack {
    pub fn new(config: SubscribeTrackConfig, now: Instant) -> Self {
        Self {
            config,
            epoch: SystemInstant::now(),
            seq_offset: 0,
            max_sent: None,
            rtx_seq: 0,
            recorder: VecDeque::new(),
            last_rtp_time_rtp: 0,
            last_rtp_time_instant: None,
            counters: Counters { packets: 0, octets: 0 },
            recent_sends: VecDeque::new(),
            next_sr_at: now + SR_INTERVAL_MIN,
            last_rr_lsr: 0,
            last_rtt: None,
        }
    }

    /// Rewrites one inbound packet's sequence number and SSRC for this
    /// subscriber's stream, records it for retransmission, and returns the
    /// outbound packet ready to protect and send.
    pub fn prepare_send(&mut self, inner: &Packet, now: Instant) -> Packet {
        let outbound_seq = inner.header.sequence_number.wrapping_add(self.seq_offset);
        match self.max_sent {
            Some(current) if !sfu_shared::seq::is_ahead_or_eq(outbound_seq, current) => {}
            _ => self.max_sent = Some(outbound_seq),
        }

        let mut header = inner.header.clone();
        header.sequence_number = outbound_seq;
        header.ssrc = self.config.ssrc;
        header.payload_type = self.config.payload_type;
        let packet = Packet::new(header, inner.payload.clone());

        self.counters.packets = self.counters.packets.wrapping_add(1);
        self.counters.octets = self.counters.octets.wrapping_add(packet.payload.len() as u32);
        self.last_rtp_time_rtp = packet.header.timestamp;
        self.last_rtp_time_instant = Some(now);

        self.recent_sends.push_back((now, packet.payload.len()));
        self.evict_recent_sends(now);

        self.recorder.push_back(Recorded { seq: outbound_seq, packet: packet.clone(), sent_at: now });
        self.evict_recorder(now);

        packet
    }

    /// Establishes (or re-establishes after a layer switch) the mapping
    /// from this subscriber's outbound sequence space to the first inner
    /// sequence number of the stream now feeding it, so numbering stays
    /// continuous across the switch.
    pub fn resync(&mut self, first_inner_seq: u16) {
        let next_outbound = self.max_sent.map(|s| s.wrapping_add(1)).unwrap_or(0);
        self.seq_offset = next_outbound.wrapping_sub(first_inner_seq);
    }

    fn evict_recorder(&mut self, now: Instant) {
        while self.recorder.len() > RECORDER_CAP {
            self.recorder.pop_front();
        }
        while let Some(front) = self.recorder.front() {
            if now.duration_since(front.sent_at) > RECORDER_WINDOW {
                self.recorder.pop_front();
            } else {
                break;
            }
        }
    }

    fn evict_recent_sends(&mut self, now: Instant) {
        while let Some((t, _)) = self.recent_sends.front() {
            if now.duration_since(*t) > Duration::from_secs(1) {
                self.recent_sends.pop_front();
            } else {
                break;
            }
        }
    }

    fn send_bitrate_kbps(&self) -> f64 {
        let bytes: usize = self.recent_sends.iter().map(|(_, n)| n).sum();
        (bytes as f64 * 8.0) / 1000.0
    }

    /// For each requested sequence number, either the original packet (if
    /// still within the retention window) wrapped as an RTX payload, or a
    /// bare resend when no RTX SSRC/payload type was negotiated.
    pub fn resend_for_nack(&mut self, missing: &[u16]) -> Vec<Packet> {
        let mut out = Vec::with_capacity(missing.len());
        for &seq in missing {
            let Some(found) = self.recorder.iter().find(|r| r.seq == seq) else {
                continue;
            };
            match (self.config.rtx_ssrc, self.config.rtx_payload_type) {
                (Some(rtx_ssrc), Some(rtx_pt)) => {
                    self.rtx_seq = self.rtx_seq.wrapping_add(1);
                    out.push(rtx::wrap(&found.packet, rtx_ssrc, rtx_pt, self.rtx_seq));
                }
                _ => out.push(found.packet.clone()),
            }
        }
        out
    }

    /// Whether the adaptive SR timer (spec.md §4.7: `min(report_interval,
    /// 360000 / send_bitrate_kbps)`, clamped and jittered by ±50%) has
    /// elapsed, and if so reschedules it and returns the report to send.
    pub fn maybe_generate_sender_report<R: Rng>(&mut self, now: Instant, rng: &mut R) -> Option<SenderReport> {
        if now < self.next_sr_at {
            return None;
        }

        let kbps = self.send_bitrate_kbps().max(1.0);
        let adaptive_ms = (360_000.0 / kbps).min(SR_INTERVAL_MAX.as_millis() as f64);
        let base = Duration::from_millis(adaptive_ms as u64).clamp(SR_INTERVAL_MIN, SR_INTERVAL_MAX);
        let jitter = rng.random_range(0.5..1.5);
        self.next_sr_at = now + Duration::from_millis((base.as_millis() as f64 * jitter) as u64);

        let rtp_time = match self.last_rtp_time_instant {
            Some(last) => {
                let elapsed = now.duration_since(last).as_secs_f64();
                self.last_rtp_time_rtp.wrapping_add((elapsed * self.config.clock_rate as f64) as u32)
            }
            None => self.last_rtp_time_rtp,
        };

        Some(SenderReport {
            ssrc: self.config.ssrc,
            ntp_time: self.epoch.ntp(now),
            rtp_time,
            packet_count: self.counters.packets,
            octet_count: self.counters.octets,
            reports: Vec::new(),
        })
    }

    /// Derives round-trip time from a receiver report's `last_sender_report`
    /// (LSR, compact NTP) and `delay` (DLSR) fields, per RFC 3550 §6.4.1.
    pub fn on_receiver_report(&mut self, last_sender_report: u32, delay_since_last_sr: u32, now: Instant) {
        if last_sender_report == 0 {
            return;
        }
        self.last_rr_lsr = last_sender_report;
        let arrival_compact = sfu_shared::time::ntp_short(self.epoch.ntp(now));
        let rtt_compact = arrival_compact.wrapping_sub(last_sender_report).wrapping_sub(delay_since_last_sr);
        self.last_rtt = Some(Duration::from_secs_f64(rtt_compact as f64 / 65536.0));
    }

    pub fn last_rtt(&self) -> Option<Duration> {
        self.last_rtt
    }
}
