//! Wall-clock/NTP conversions used by RTCP sender reports and DLSR/RTT math.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch
/// (1970-01-01).
const NTP_EPOCH_OFFSET_SECS: u64 = 0x83AA_7E80;

/// A monotonic instant paired with its corresponding wall-clock offset,
/// letting timer-driven code (NACK retransmit scheduling, SR interval
/// pacing) compute NTP timestamps without repeatedly calling
/// `SystemTime::now()`, which is not monotonic.
#[derive(Debug, Clone, Copy)]
pub struct SystemInstant {
    instant: Instant,
    duration_since_unix_epoch: Duration,
}

impl SystemInstant {
    pub fn now() -> Self {
        let instant = Instant::now();
        let duration_since_unix_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            instant,
            duration_since_unix_epoch,
        }
    }

    pub fn instant(&self) -> Instant {
        self.instant
    }

    /// Wall-clock duration corresponding to `at`, computed by offsetting
    /// from the instant this value was captured.
    pub fn duration_since_unix_epoch(&self, at: Instant) -> Duration {
        if at >= self.instant {
            self.duration_since_unix_epoch + (at - self.instant)
        } else {
            self.duration_since_unix_epoch
                .saturating_sub(self.instant - at)
        }
    }

    /// 64-bit NTP timestamp (32.32 fixed point) for the given instant.
    pub fn ntp(&self, at: Instant) -> u64 {
        unix2ntp(self.duration_since_unix_epoch(at))
    }
}

/// Converts a duration since the Unix epoch into a 64-bit NTP timestamp.
pub fn unix2ntp(d: Duration) -> u64 {
    let secs = d.as_secs().wrapping_add(NTP_EPOCH_OFFSET_SECS);
    let frac = ((d.subsec_nanos() as u64) << 32) / 1_000_000_000;
    (secs << 32) | frac
}

/// Converts a 64-bit NTP timestamp back into a duration since the Unix
/// epoch. Inverse of [`unix2ntp`].
pub fn ntp2unix(ntp: u64) -> Duration {
    let secs = (ntp >> 32).wrapping_sub(NTP_EPOCH_OFFSET_SECS);
    let frac = ntp & 0xFFFF_FFFF;
    let nanos = (frac * 1_000_000_000) >> 32;
    Duration::new(secs, nanos as u32)
}

/// The middle 32 bits of a 64-bit NTP timestamp, as used in SR `LSR` fields
/// and the RR `last_sender_report` field.
pub fn ntp_short(ntp: u64) -> u32 {
    ((ntp >> 16) & 0xFFFF_FFFF) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntp_round_trip_is_close_to_exact() {
        let d = Duration::new(1_700_000_000, 500_000_000);
        let ntp = unix2ntp(d);
        let back = ntp2unix(ntp);
        let diff = if back > d { back - d } else { d - back };
        assert!(diff < Duration::from_micros(1));
    }

    #[test]
    fn system_instant_ntp_advances_with_elapsed_time() {
        let s = SystemInstant::now();
        let later = s.instant() + Duration::from_secs(5);
        let ntp_now = s.ntp(s.instant());
        let ntp_later = s.ntp(later);
        assert!(ntp_later > ntp_now);
        // five seconds in the integer half of the 32.32 fixed-point value
        assert_eq!((ntp_later >> 32) - (ntp_now >> 32), 5);
    }
}
