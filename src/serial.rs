//! Non-blocking serial sink over a bounded byte queue.
//!
//! The control loop must never wait on the serial host. Records go into
//! a fixed-size queue drained by the USB task; when the port is closed
//! or the queue cannot take a whole record, the record is dropped and a
//! transport fault is reported instead.

use crate::dispatch::SerialSink;
use crate::error::{Error, TransportFault};

/// Byte queue between the control loop and whatever drains it.
pub trait RecordQueue {
    /// A host has the port open (DTR asserted on USB CDC).
    fn is_open(&self) -> bool;

    /// Bytes that can be queued right now without waiting.
    fn free_capacity(&self) -> usize;

    /// Queue as many bytes as fit, without waiting. Returns the count.
    fn try_write(&self, bytes: &[u8]) -> usize;
}

/// `SerialSink` that only ever writes whole records and never pends.
pub struct QueuedSerial<Q> {
    queue: Q,
}

impl<Q: RecordQueue> QueuedSerial<Q> {
    pub const fn new(queue: Q) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Queue `bytes` in full or not at all.
    pub fn push_record(&self, bytes: &[u8]) -> Result<(), Error> {
        if !self.queue.is_open() {
            return Err(TransportFault::SerialUnavailable.into());
        }
        if self.queue.free_capacity() < bytes.len() {
            return Err(TransportFault::SerialOverflow.into());
        }

        // A ring buffer may accept the record in two pieces.
        let mut rest = bytes;
        while !rest.is_empty() {
            let n = self.queue.try_write(rest);
            if n == 0 {
                return Err(TransportFault::SerialOverflow.into());
            }
            rest = &rest[n..];
        }
        Ok(())
    }
}

impl<Q: RecordQueue> SerialSink for QueuedSerial<Q> {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.push_record(bytes)
    }
}
