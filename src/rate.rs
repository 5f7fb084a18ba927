//! Sample-rate self test.
//!
//! Runs the acquire → dispatch cycle flat out for a fixed window and
//! reports how many samples made it through. Diagnostic only; the
//! report is written onto the serial stream as plain text.

use core::fmt::Write;

use heapless::String;

use crate::acquisition::Pipeline;
use crate::adc::VoltageSource;
use crate::dispatch::{PacketSink, SerialSink};
use crate::error::Error;

/// Result of one measurement window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RateReport {
    /// Samples acquired and dispatched.
    pub samples: u32,
    /// Steps that ended in an acquisition fault.
    pub faults: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl RateReport {
    pub fn samples_per_second(&self) -> f64 {
        if self.window_ms == 0 {
            return 0.0;
        }
        self.samples as f64 * 1_000.0 / self.window_ms as f64
    }

    /// `Achieved sample rate: 256.00 samples per second\r\n`
    pub fn line(&self) -> String<64> {
        let mut s = String::new();
        let _ = write!(
            &mut s,
            "Achieved sample rate: {:.2} samples per second\r\n",
            self.samples_per_second()
        );
        s
    }
}

/// Step `pipeline` until `window_ms` has elapsed on `now_ms`, then write
/// the report line to the serial sink.
///
/// `now_ms` is a monotonic millisecond clock (`embassy_time::Instant` on
/// the board).
pub async fn measure_sample_rate<A, S, P>(
    pipeline: &mut Pipeline<A, S, P>,
    window_ms: u64,
    mut now_ms: impl FnMut() -> u64,
) -> Result<RateReport, Error>
where
    A: VoltageSource,
    S: SerialSink,
    P: PacketSink,
{
    let start = now_ms();
    let end = start.saturating_add(window_ms);
    let mut report = RateReport {
        samples: 0,
        faults: 0,
        window_ms,
    };

    while now_ms() < end {
        match pipeline.step().await {
            Ok(_) => report.samples += 1,
            Err(_) => report.faults += 1,
        }
    }

    let line = report.line();
    pipeline
        .dispatcher
        .serial_mut()
        .write_all(line.as_bytes())
        .await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_over_five_seconds() {
        let report = RateReport {
            samples: 1280,
            faults: 0,
            window_ms: 5_000,
        };
        assert_eq!(report.samples_per_second(), 256.0);
        assert_eq!(
            report.line().as_str(),
            "Achieved sample rate: 256.00 samples per second\r\n"
        );
    }

    #[test]
    fn fractional_rate_is_rounded_to_two_places() {
        let report = RateReport {
            samples: 47,
            faults: 0,
            window_ms: 5_000,
        };
        assert_eq!(
            report.line().as_str(),
            "Achieved sample rate: 9.40 samples per second\r\n"
        );
    }

    #[test]
    fn empty_window_reports_zero() {
        let report = RateReport {
            samples: 10,
            faults: 0,
            window_ms: 0,
        };
        assert_eq!(report.samples_per_second(), 0.0);
    }
}
