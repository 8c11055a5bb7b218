//! Modulo-2^16 sequence-number arithmetic shared by RTP, NACK bookkeeping,
//! and the jitter buffer.
//!
//! RTP sequence numbers wrap at 65536 with no signal that a wrap happened;
//! every comparison has to treat the space as circular. This mirrors the
//! wraparound handling exercised in the NACK receive-log tests (`pion_compat`
//! case) rather than reinventing the half-circle tiebreak.

/// Half the sequence space; the conventional tiebreak point for "ahead of"
/// vs "behind" when the two sequence numbers are exactly opposite each
/// other on the circle.
pub const HALF_RANGE: u16 = 1 << 15;

/// `true` if `a` is strictly ahead of `b` on the circular sequence space,
/// i.e. `b` was sent before `a` given reasonable reordering bounds.
pub fn is_ahead(a: u16, b: u16) -> bool {
    let diff = a.wrapping_sub(b);
    diff != 0 && diff < HALF_RANGE
}

/// `true` if `a` is ahead of or equal to `b`.
pub fn is_ahead_or_eq(a: u16, b: u16) -> bool {
    a == b || is_ahead(a, b)
}

/// Signed circular distance `a - b`, in `[-32768, 32767]`.
pub fn distance(a: u16, b: u16) -> i32 {
    let diff = a.wrapping_sub(b) as i32;
    if diff >= HALF_RANGE as i32 {
        diff - (1 << 16)
    } else {
        diff
    }
}

/// Unwraps a stream of `u16` RTP sequence numbers into a monotonically
/// comparable `i64`, tracking how many times the counter has wrapped.
///
/// Used anywhere a sequence number needs to key an ordered collection (the
/// TWCC arrival-time map, the jitter buffer reorder window) without the
/// 16-bit wrap corrupting ordering.
#[derive(Debug, Clone)]
pub struct SequenceUnwrapper {
    last_seq: Option<u16>,
    last_unwrapped: i64,
}

impl Default for SequenceUnwrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceUnwrapper {
    pub fn new() -> Self {
        Self {
            last_seq: None,
            last_unwrapped: 0,
        }
    }

    /// Folds the next raw sequence number into the running unwrapped count.
    /// Must be called in arrival order, not transmission order.
    pub fn unwrap(&mut self, seq: u16) -> i64 {
        let unwrapped = match self.last_seq {
            None => seq as i64,
            Some(last) => self.last_unwrapped + distance(seq, last) as i64,
        };
        self.last_seq = Some(seq);
        self.last_unwrapped = unwrapped;
        unwrapped
    }

    /// Unwraps without mutating state, relative to the last folded value.
    pub fn peek(&self, seq: u16) -> i64 {
        match self.last_seq {
            None => seq as i64,
            Some(last) => self.last_unwrapped + distance(seq, last) as i64,
        }
    }
}

/// Extracts the 16 sequence numbers named by a NACK `PacketId`/`BLP` pair:
/// the packet id itself, plus one for every set bit in the bitmask, where
/// bit `i` (0-indexed) names `packet_id.wrapping_add(i + 1)`.
///
/// Mirrors the decoding done against `TransportLayerNack::nacks` in the NACK
/// responder: bit `i` set means the packet `i+1` after `packet_id` was lost
/// too.
pub fn nack_pair_seq_numbers(packet_id: u16, lost_packets_bitmask: u16) -> Vec<u16> {
    let mut out = Vec::with_capacity(17);
    out.push(packet_id);
    for i in 0..16u16 {
        if lost_packets_bitmask & (1 << i) != 0 {
            out.push(packet_id.wrapping_add(i + 1));
        }
    }
    out
}

/// Packs a sorted-ascending (in arrival order, not necessarily numeric)
/// slice of missing sequence numbers into `(packet_id, bitmask)` NACK pairs,
/// the inverse of [`nack_pair_seq_numbers`]. Consecutive runs within 17 of
/// each other fold into a single pair.
pub fn pack_nack_pairs(missing: &[u16]) -> Vec<(u16, u16)> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i < missing.len() {
        let packet_id = missing[i];
        let mut mask: u16 = 0;
        let mut j = i + 1;
        while j < missing.len() {
            let gap = missing[j].wrapping_sub(packet_id);
            if gap == 0 || gap > 16 {
                break;
            }
            mask |= 1 << (gap - 1);
            j += 1;
        }
        pairs.push((packet_id, mask));
        i = j;
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ahead_handles_wraparound() {
        assert!(is_ahead(1, 0));
        assert!(is_ahead(0, 65535));
        assert!(!is_ahead(0, 1));
        assert!(!is_ahead(5, 5));
    }

    #[test]
    fn distance_is_signed_and_wraps() {
        assert_eq!(distance(1, 0), 1);
        assert_eq!(distance(0, 1), -1);
        assert_eq!(distance(0, 65535), 1);
        assert_eq!(distance(65535, 0), -1);
    }

    #[test]
    fn unwrapper_tracks_wraps_across_cycles() {
        let mut u = SequenceUnwrapper::new();
        assert_eq!(u.unwrap(65534), 65534);
        assert_eq!(u.unwrap(65535), 65535);
        assert_eq!(u.unwrap(0), 65536);
        assert_eq!(u.unwrap(1), 65537);
    }

    #[test]
    fn unwrapper_handles_minor_reorder() {
        let mut u = SequenceUnwrapper::new();
        assert_eq!(u.unwrap(10), 10);
        assert_eq!(u.unwrap(12), 12);
        assert_eq!(u.unwrap(11), 11);
    }

    #[test]
    fn nack_pair_round_trips() {
        let missing = vec![100u16, 101, 103, 120];
        let pairs = pack_nack_pairs(&missing);
        assert_eq!(pairs, vec![(100, 0b0000_0000_0000_0101), (120, 0)]);

        let mut round_tripped: Vec<u16> = pairs
            .iter()
            .flat_map(|(id, mask)| nack_pair_seq_numbers(*id, *mask))
            .collect();
        round_tripped.sort_unstable();
        assert_eq!(round_tripped, missing);
    }

    #[test]
    fn nack_pair_seq_numbers_wraps_packet_id() {
        let seqs = nack_pair_seq_numbers(65535, 0b1);
        assert_eq!(seqs, vec![65535, 0]);
    }
}
