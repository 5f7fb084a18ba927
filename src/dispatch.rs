//! Dual-sink delivery: every sample goes to the serial stream, every
//! fifth sample also completes a BLE notification batch.
//!
//! Serial record layout (5 bytes):
//! ```text
//! Bytes 0..4 : sample (f32, little-endian)
//! Byte  4    : 0x0A ('\n')
//! ```
//! There is no escaping, so a reader that resynchronises on `\n` can be
//! fooled by a float whose raw bytes contain 0x0A. Downstream tools rely
//! on this exact framing.

use crate::batch::{Batcher, FullBatch, Sample, BATCH_PAYLOAD_SIZE};
use crate::error::Error;

/// Serial record size in bytes.
pub const SERIAL_RECORD_SIZE: usize = 5;

/// Record delimiter.
pub const SERIAL_DELIMITER: u8 = b'\n';

/// Encode one sample as a serial record.
pub fn serial_record(sample: Sample) -> [u8; SERIAL_RECORD_SIZE] {
    let b = sample.to_le_bytes();
    [b[0], b[1], b[2], b[3], SERIAL_DELIMITER]
}

/// Byte-oriented stream sink (USB CDC on the board).
#[allow(async_fn_in_trait)]
pub trait SerialSink {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

/// Packet sink for completed batches (GATT characteristic on the board).
pub trait PacketSink {
    fn send_packet(&mut self, payload: &[u8; BATCH_PAYLOAD_SIZE]) -> Result<(), Error>;
}

impl<T: SerialSink + ?Sized> SerialSink for &mut T {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        (**self).write_all(bytes).await
    }
}

impl<T: PacketSink + ?Sized> PacketSink for &mut T {
    fn send_packet(&mut self, payload: &[u8; BATCH_PAYLOAD_SIZE]) -> Result<(), Error> {
        (**self).send_packet(payload)
    }
}

/// What happened to one sample.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dispatched {
    /// The batch this sample completed, if any.
    pub flushed: Option<FullBatch>,
    /// First sink fault hit while delivering the sample.
    pub fault: Option<Error>,
}

/// Batching & dispatch unit. Owns the batch; borrows nothing.
pub struct Dispatcher<S, P> {
    batcher: Batcher,
    serial: S,
    packets: P,
}

impl<S, P> Dispatcher<S, P>
where
    S: SerialSink,
    P: PacketSink,
{
    pub fn new(serial: S, packets: P) -> Self {
        Self {
            batcher: Batcher::new(),
            serial,
            packets,
        }
    }

    /// Deliver one sample to both sinks.
    ///
    /// The serial record is written first, then the sample enters the
    /// batch. A sink fault never skips the batch update, so ordering is
    /// preserved across faults; the fault is reported in the result.
    pub async fn on_sample(&mut self, sample: Sample) -> Dispatched {
        let mut fault = self.serial.write_all(&serial_record(sample)).await.err();

        let flushed = self.batcher.push(sample);
        if let Some(batch) = &flushed {
            if let Err(e) = self.packets.send_packet(&batch.to_le_bytes()) {
                fault.get_or_insert(e);
            }
        }

        Dispatched { flushed, fault }
    }

    pub fn batcher(&self) -> &Batcher {
        &self.batcher
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn into_sinks(self) -> (S, P) {
        (self.serial, self.packets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportFault;
    use embassy_futures::block_on;

    #[derive(Default)]
    struct VecSerial {
        bytes: Vec<u8>,
        fail_next: usize,
    }

    impl SerialSink for VecSerial {
        async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
            if self.fail_next > 0 {
                self.fail_next -= 1;
                return Err(TransportFault::SerialUnavailable.into());
            }
            self.bytes.extend_from_slice(bytes);
            Ok(())
        }
    }

    #[derive(Default)]
    struct VecPackets {
        packets: Vec<[u8; BATCH_PAYLOAD_SIZE]>,
        reject: bool,
    }

    impl PacketSink for VecPackets {
        fn send_packet(&mut self, payload: &[u8; BATCH_PAYLOAD_SIZE]) -> Result<(), Error> {
            if self.reject {
                return Err(TransportFault::NotifyFailed.into());
            }
            self.packets.push(*payload);
            Ok(())
        }
    }

    #[test]
    fn serial_record_layout() {
        assert_eq!(serial_record(1.0), [0x00, 0x00, 0x80, 0x3F, b'\n']);
        assert_eq!(serial_record(-0.0), [0x00, 0x00, 0x00, 0x80, b'\n']);
    }

    #[test]
    fn serial_record_can_contain_delimiter() {
        // 0x0A in the low mantissa byte: the framing cannot tell this apart.
        let sample = f32::from_bits(0x3F80_000A);
        let record = serial_record(sample);
        assert_eq!(record[0], SERIAL_DELIMITER);
        assert_eq!(record[4], SERIAL_DELIMITER);
    }

    #[test]
    fn every_sample_is_written_before_batching() {
        let mut dispatcher = Dispatcher::new(VecSerial::default(), VecPackets::default());
        let out = block_on(dispatcher.on_sample(0.5));
        assert_eq!(out.flushed, None);
        assert_eq!(out.fault, None);

        let (serial, packets) = dispatcher.into_sinks();
        assert_eq!(serial.bytes, serial_record(0.5));
        assert!(packets.packets.is_empty());
    }

    #[test]
    fn serial_fault_still_advances_batch() {
        let serial = VecSerial {
            fail_next: 1,
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(serial, VecPackets::default());
        let out = block_on(dispatcher.on_sample(1.0));
        assert_eq!(
            out.fault,
            Some(Error::Transport(TransportFault::SerialUnavailable))
        );
        assert_eq!(dispatcher.batcher().fill(), 1);
    }

    #[test]
    fn packet_fault_still_resets_batch() {
        let packets = VecPackets {
            reject: true,
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(VecSerial::default(), packets);
        let mut last = None;
        for v in 1..=5 {
            last = Some(block_on(dispatcher.on_sample(v as f32)));
        }
        let last = last.unwrap();
        assert!(last.flushed.is_some());
        assert_eq!(
            last.fault,
            Some(Error::Transport(TransportFault::NotifyFailed))
        );
        assert!(dispatcher.batcher().is_empty());
    }

    #[test]
    fn serial_fault_reported_before_packet_fault() {
        let serial = VecSerial {
            fail_next: 5,
            ..Default::default()
        };
        let packets = VecPackets {
            reject: true,
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(serial, packets);
        let mut last = None;
        for v in 1..=5 {
            last = Some(block_on(dispatcher.on_sample(v as f32)));
        }
        assert_eq!(
            last.unwrap().fault,
            Some(Error::Transport(TransportFault::SerialUnavailable))
        );
    }
}
