//! Receiver-side decoding of both wire formats.
//!
//! Used by host tooling and by the tests to check what actually goes
//! out on the wire. The serial decoder reproduces the recorder's
//! behaviour exactly, including its blind spot: a float containing
//! 0x0A splits into two malformed frames and is dropped.

use crate::batch::{Sample, BATCH_CAPACITY, BATCH_PAYLOAD_SIZE};
use crate::dispatch::SERIAL_DELIMITER;

/// Gain of the instrumentation amplifier in front of the ADC.
pub const EXG_INAMP_GAIN: f32 = 50.0;

/// Newline-delimited serial frame decoder.
///
/// Bytes are buffered until `\n`; a frame of exactly four bytes yields a
/// sample, anything else is counted as discarded. The buffer is cleared
/// at every delimiter.
#[derive(Clone, Debug, Default)]
pub struct SerialFrameDecoder {
    frame: [u8; 4],
    len: usize,
    discarded: u32,
}

impl SerialFrameDecoder {
    pub const fn new() -> Self {
        Self {
            frame: [0; 4],
            len: 0,
            discarded: 0,
        }
    }

    /// Feed one byte; returns a sample when a well-formed frame ends.
    pub fn push(&mut self, byte: u8) -> Option<Sample> {
        if byte == SERIAL_DELIMITER {
            let len = core::mem::take(&mut self.len);
            if len == 4 {
                return Some(f32::from_le_bytes(self.frame));
            }
            self.discarded = self.discarded.wrapping_add(1);
            return None;
        }
        if self.len < self.frame.len() {
            self.frame[self.len] = byte;
        }
        self.len = self.len.saturating_add(1);
        None
    }

    /// Frames dropped for having the wrong length.
    pub fn discarded(&self) -> u32 {
        self.discarded
    }
}

/// Decode a 20-byte notification payload.
pub fn decode_payload(payload: &[u8]) -> Option<[Sample; BATCH_CAPACITY]> {
    if payload.len() != BATCH_PAYLOAD_SIZE {
        return None;
    }
    let mut out = [0.0; BATCH_CAPACITY];
    for (sample, chunk) in out.iter_mut().zip(payload.chunks_exact(4)) {
        *sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Some(out)
}

/// Input-referred microvolts for a reading taken behind `inamp_gain`.
pub fn to_microvolts(volts: Sample, inamp_gain: f32) -> f32 {
    volts / inamp_gain * 1.0e6
}

/// Timestamps for the five samples of a notification received at `now`.
///
/// The samples are spread evenly over the interval since the previous
/// notification; the last one is stamped `now`. Without a previous
/// notification the interval is assumed to be five sample periods.
/// A previous stamp later than `now` is clamped to `now`, so the result
/// is always non-decreasing. All values share one unit (e.g.
/// microseconds).
pub fn interpolate_timestamps(
    previous: Option<u64>,
    now: u64,
    sample_period: u64,
) -> [u64; BATCH_CAPACITY] {
    let n = BATCH_CAPACITY as u64;
    let previous = previous
        .unwrap_or_else(|| now.saturating_sub(sample_period.saturating_mul(n)))
        .min(now);
    let span = now - previous;
    let mut out = [now; BATCH_CAPACITY];
    for (i, ts) in out.iter_mut().enumerate().take(BATCH_CAPACITY - 1) {
        // Widened: span * 4 overflows u64 for spans above u64::MAX / 4.
        let step = span as u128 * (i as u128 + 1) / n as u128;
        *ts = previous + step as u64;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::serial_record;

    fn feed(decoder: &mut SerialFrameDecoder, bytes: &[u8]) -> Vec<f32> {
        bytes.iter().filter_map(|&b| decoder.push(b)).collect()
    }

    #[test]
    fn decodes_consecutive_records() {
        let mut decoder = SerialFrameDecoder::new();
        let mut stream = Vec::new();
        for v in [0.25f32, -1.5, 0.75] {
            stream.extend_from_slice(&serial_record(v));
        }
        assert_eq!(feed(&mut decoder, &stream), vec![0.25, -1.5, 0.75]);
        assert_eq!(decoder.discarded(), 0);
    }

    #[test]
    fn resynchronises_after_partial_record() {
        let mut decoder = SerialFrameDecoder::new();
        // Joined mid-record: two stray bytes then a full record.
        let mut stream = vec![0x12, 0x34, b'\n'];
        stream.extend_from_slice(&serial_record(2.0));
        assert_eq!(feed(&mut decoder, &stream), vec![2.0]);
        assert_eq!(decoder.discarded(), 1);
    }

    #[test]
    fn newline_inside_float_loses_the_sample() {
        let mut decoder = SerialFrameDecoder::new();
        let tricky = f32::from_bits(0x3F80_0A00);
        let mut stream = serial_record(tricky).to_vec();
        stream.extend_from_slice(&serial_record(1.0));
        // The 0x0A byte cuts the first record short; the next record
        // still decodes because the real delimiter resets the buffer.
        assert_eq!(feed(&mut decoder, &stream), vec![1.0]);
        assert_eq!(decoder.discarded(), 2);
    }

    #[test]
    fn overlong_frame_is_discarded() {
        let mut decoder = SerialFrameDecoder::new();
        assert!(feed(&mut decoder, &[1, 2, 3, 4, 5, 6, b'\n']).is_empty());
        assert_eq!(decoder.discarded(), 1);
    }

    #[test]
    fn payload_wrong_length_rejected() {
        assert!(decode_payload(&[0u8; 19]).is_none());
        assert!(decode_payload(&[0u8; 21]).is_none());
        assert_eq!(decode_payload(&[0u8; 20]), Some([0.0; 5]));
    }

    #[test]
    fn microvolt_conversion() {
        assert!((to_microvolts(0.5, EXG_INAMP_GAIN) - 10_000.0).abs() < 0.01);
        assert!((to_microvolts(-0.005, EXG_INAMP_GAIN) + 100.0).abs() < 0.001);
        assert_eq!(to_microvolts(0.0, EXG_INAMP_GAIN), 0.0);
    }

    #[test]
    fn timestamps_spread_between_notifications() {
        let ts = interpolate_timestamps(Some(1_000), 1_500, 3_906);
        assert_eq!(ts, [1_100, 1_200, 1_300, 1_400, 1_500]);
    }

    #[test]
    fn huge_sample_period_saturates_at_zero() {
        let ts = interpolate_timestamps(None, 10, u64::MAX / 2);
        assert_eq!(ts, [2, 4, 6, 8, 10]);
    }

    #[test]
    fn huge_span_does_not_overflow() {
        let ts = interpolate_timestamps(Some(0), u64::MAX, 1);
        assert_eq!(ts[4], u64::MAX);
        assert!(ts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ts[0], u64::MAX / 5);
    }

    #[test]
    fn clock_going_backwards_stays_monotonic() {
        let ts = interpolate_timestamps(Some(2_000), 1_500, 100);
        assert_eq!(ts, [1_500; 5]);
    }

    #[test]
    fn first_notification_assumes_five_periods() {
        let ts = interpolate_timestamps(None, 100_000, 4_000);
        assert_eq!(ts, [84_000, 88_000, 92_000, 96_000, 100_000]);
    }
}
