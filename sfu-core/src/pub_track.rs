//! Per-SSRC receive state: RFC 3550 jitter/loss bookkeeping, NACK
//! generation, keyframe demand latching and SR correlation (spec.md §4.6).
//! Grounded on `rtc-interceptor::report::receiver_stream::ReceiverStream`
//! for the jitter/loss math and `rtc-interceptor::nack::generator` for the
//! pending-NACK bookkeeping shape (a per-entry retry count, forgotten past
//! a ceiling), adapted from that interceptor's per-connection state into
//! one instance per `PublishTrack`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sfu_rtcp::payload_feedbacks::full_intra_request::{FirEntry, FullIntraRequest};
use sfu_rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use sfu_rtcp::reception_report::ReceptionReport;
use sfu_rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use sfu_rtp::extension::ExtensionMap;

/// How long a gap is tolerated before the missing sequence is scheduled for
/// a NACK; conservative default chosen per spec.md §9's "pick conservative
/// defaults" instruction for unspecified retention/retry parameters.
const NACK_GRACE: Duration = Duration::from_millis(20);
const NACK_RETRY_INTERVAL: Duration = Duration::from_millis(100);
/// spec.md §9 open question decision: 10 retries, then forgotten.
const NACK_MAX_RETRIES: u8 = 10;

#[derive(Debug, Clone)]
pub struct PublishTrackConfig {
    pub ssrc: u32,
    pub payload_type: u8,
    pub rtx_ssrc: Option<u32>,
    pub rtx_payload_type: Option<u8>,
    pub codec_name: String,
    pub clock_rate: u32,
    pub nack_enabled: bool,
    pub audio: bool,
    /// Simulcast layer id; larger is higher quality (spec.md §9 open
    /// question, decided in DESIGN.md).
    pub rid: Option<u32>,
    /// Negotiated extension-id registry, built once from this track's SDP
    /// extmap lines (spec.md §4.2's header-extension registry).
    pub extensions: ExtensionMap,
}

struct PendingNack {
    scheduled_at: Instant,
    retries: u8,
}

/// One sequence number scheduled (or rescheduled) for retransmission
/// request.
pub struct NackTracker {
    pending: HashMap<i64, PendingNack>,
}

impl NackTracker {
    fn new() -> Self {
        Self { pending: HashMap::new() }
    }

    fn mark_missing(&mut self, s_ext: i64, now: Instant) {
        self.pending.entry(s_ext).or_insert(PendingNack {
            scheduled_at: now + NACK_GRACE,
            retries: 0,
        });
    }

    fn mark_received(&mut self, s_ext: i64) {
        self.pending.remove(&s_ext);
    }

    /// Drains entries whose grace/retry window has elapsed into a sorted
    /// list of sequence numbers ready for a NACK; entries past the retry
    /// ceiling are forgotten rather than requested forever.
    fn due(&mut self, now: Instant) -> Vec<u16> {
        let mut due = Vec::new();
        self.pending.retain(|s_ext, entry| {
            if entry.scheduled_at > now {
                return true;
            }
            if entry.retries >= NACK_MAX_RETRIES {
                return false;
            }
            due.push((*s_ext & 0xFFFF) as u16);
            entry.retries += 1;
            entry.scheduled_at = now + NACK_RETRY_INTERVAL;
            true
        });
        due.sort_unstable();
        due
    }
}

pub struct PublishTrack {
    pub config: PublishTrackConfig,

    started: bool,
    highest_seq: u16,
    cycles: u32,
    base_seq: u16,
    received: u32,
    expected_prior: u32,
    received_prior: u32,

    last_rtp_time_rtp: u32,
    last_rtp_time_instant: Option<Instant>,
    jitter: f64,

    last_sr_ntp: u32,
    last_sr_arrival: Option<Instant>,

    nack: NackTracker,
    fir_seq: u8,
    keyframe_requested: bool,
}

impl PublishTrack {
    pub fn new(config: PublishTrackConfig) -> Self {
        Self {
            config,
            started: false,
            highest_seq: 0,
            cycles: 0,
            base_seq: 0,
            received: 0,
            expected_prior: 0,
            received_prior: 0,
            last_rtp_time_rtp: 0,
            last_rtp_time_instant: None,
            jitter: 0.0,
            last_sr_ntp: 0,
            last_sr_arrival: None,
            nack: NackTracker::new(),
            fir_seq: 0,
            keyframe_requested: false,
        }
    }

    /// The 48-bit extended sequence number packets are keyed by: `cycles`
    /// tracks how many times the 16-bit field has wrapped.
    fn extended(&self, seq: u16) -> i64 {
        ((self.cycles as i64) << 16) | seq as i64
    }

    /// Folds one arriving RTP packet into the receive statistics, updates
    /// jitter, and schedules NACKs for any gap this packet revealed.
    pub fn on_rtp_arrival(&mut self, seq: u16, rtp_timestamp: u32, now: Instant) {
        self.received += 1;

        if !self.started {
            self.started = true;
            self.base_seq = seq;
            self.highest_seq = seq;
            self.last_rtp_time_rtp = rtp_timestamp;
            self.last_rtp_time_instant = Some(now);
            return;
        }

        let diff = seq.wrapping_sub(self.highest_seq);
        if diff != 0 && diff < (1 << 15) {
            if seq < self.highest_seq {
                self.cycles = self.cycles.wrapping_add(1);
            }
            if self.config.nack_enabled {
                let mut missing = self.highest_seq.wrapping_add(1);
                while missing != seq {
                    self.nack.mark_missing(self.extended(missing), now);
                    missing = missing.wrapping_add(1);
                }
            }
            self.highest_seq = seq;
        } else if diff != 0 {
            // Late arrival, behind highest_seq: may be filling a gap.
            self.nack.mark_received(self.extended(seq));
        }

        if let Some(last_instant) = self.last_rtp_time_instant {
            let d = now.duration_since(last_instant).as_secs_f64() * self.config.clock_rate as f64
                - (rtp_timestamp as f64 - self.last_rtp_time_rtp as f64);
            self.jitter += (d.abs() - self.jitter) / 16.0;
        }
        self.last_rtp_time_rtp = rtp_timestamp;
        self.last_rtp_time_instant = Some(now);
    }

    pub fn on_sender_report(&mut self, ntp_time: u64, now: Instant) {
        self.last_sr_ntp = sfu_shared::time::ntp_short(ntp_time);
        self.last_sr_arrival = Some(now);
    }

    pub fn request_keyframe(&mut self) {
        self.keyframe_requested = true;
    }

    /// RTCP-tick output: the receiver report block, due NACKs, and a
    /// keyframe demand if one is latched (spec.md §4.6).
    pub fn tick(&mut self, now: Instant, sender_ssrc: u32) -> TrackTickOutput {
        let expected = (self.cycles as u32).wrapping_mul(1 << 16) | self.highest_seq as u32;
        let expected_interval = expected.wrapping_sub(self.expected_prior);
        let received_interval = self.received.wrapping_sub(self.received_prior);
        let lost_interval = expected_interval.saturating_sub(received_interval);
        self.expected_prior = expected;
        self.received_prior = self.received;

        let fraction_lost = if expected_interval > 0 {
            ((lost_interval as u64 * 256) / expected_interval as u64) as u8
        } else {
            0
        };
        // RFC 3550 Appendix A.3: expected = extended_max - base_seq + 1.
        let total_expected = expected.wrapping_sub(self.base_seq as u32).wrapping_add(1);
        let total_lost = total_expected.saturating_sub(self.received).min(0x00FF_FFFF);

        let delay = match self.last_sr_arrival {
            Some(t) => (now.duration_since(t).as_secs_f64() * 65536.0) as u32,
            None => 0,
        };

        let report = ReceptionReport {
            ssrc: self.config.ssrc,
            fraction_lost,
            total_lost,
            last_sequence_number: ((self.cycles) << 16) | self.highest_seq as u32,
            jitter: self.jitter as u32,
            last_sender_report: self.last_sr_ntp,
            delay,
        };

        let nack = if self.config.nack_enabled {
            let due = self.nack.due(now);
            if due.is_empty() {
                None
            } else {
                Some(TransportLayerNack::from_missing_sequence_numbers(sender_ssrc, self.config.ssrc, &due))
            }
        } else {
            None
        };

        let keyframe_request = if self.keyframe_requested {
            self.keyframe_requested = false;
            self.fir_seq = self.fir_seq.wrapping_add(1);
            Some((
                PictureLossIndication { sender_ssrc, media_ssrc: self.config.ssrc },
                FullIntraRequest {
                    sender_ssrc,
                    media_ssrc: self.config.ssrc,
                    fir: vec![FirEntry { ssrc: self.config.ssrc, seq_number: self.fir_seq }],
                },
            ))
        } else {
            None
        };

        TrackTickOutput { report, nack, keyframe_request }
    }
}

pub struct TrackTickOutput {
    pub report: ReceptionReport,
    pub nack: Option<TransportLayerNack>,
    pub keyframe_request: Option<(PictureLossIndication, FullIntraRequest)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> PublishTrack {
        PublishTrack::new(PublishTrackConfig {
            ssrc: 1,
            payload_type: 96,
            rtx_ssrc: None,
            rtx_payload_type: None,
            codec_name: "VP8".into(),
            clock_rate: 90000,
            nack_enabled: true,
            audio: false,
            rid: None,
            extensions: ExtensionMap::default(),
        })
    }

    #[test]
    fn gap_schedules_a_nack_that_becomes_due_after_grace() {
        let mut t = track();
        let now = Instant::now();
        t.on_rtp_arrival(1, 0, now);
        t.on_rtp_arrival(3, 3000, now); // 2 is missing
        let due = t.nack.due(now);
        assert!(due.is_empty(), "not due before grace elapses");
        let later = now + NACK_GRACE + Duration::from_millis(1);
        assert_eq!(t.nack.due(later), vec![2]);
    }

    #[test]
    fn late_arrival_cancels_the_pending_nack() {
        let mut t = track();
        let now = Instant::now();
        t.on_rtp_arrival(1, 0, now);
        t.on_rtp_arrival(3, 3000, now);
        t.on_rtp_arrival(2, 1500, now);
        let later = now + NACK_GRACE + Duration::from_millis(1);
        assert!(t.nack.due(later).is_empty());
    }

    #[test]
    fn cumulative_lost_includes_the_base_packet_per_rfc3550() {
        let mut t = track();
        let now = Instant::now();
        // base_seq=1, highest_seq=10 (10 packets expected), only 8 arrive.
        for seq in [1u16, 2, 4, 5, 6, 8, 9, 10] {
            t.on_rtp_arrival(seq, seq as u32 * 3000, now);
        }
        let out = t.tick(now, 9);
        assert_eq!(out.report.total_lost, 2);
    }

    #[test]
    fn keyframe_request_is_latched_until_the_next_tick() {
        let mut t = track();
        t.request_keyframe();
        let out = t.tick(Instant::now(), 9);
        assert!(out.keyframe_request.is_some());
        let out2 = t.tick(Instant::now(), 9);
        assert!(out2.keyframe_request.is_none());
    }
}
