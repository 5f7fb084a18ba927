//! Fixed-capacity sample batch for the BLE notification path.
//!
//! Layout of a flushed batch (20 bytes):
//! ```text
//! Bytes  0..4  : sample n-4 (f32, little-endian)
//! Bytes  4..8  : sample n-3
//! Bytes  8..12 : sample n-2
//! Bytes 12..16 : sample n-1
//! Bytes 16..20 : sample n   (the one that filled the batch)
//! ```
//! 5 floats is the largest whole number of samples that fits a
//! notification at the default ATT MTU of 23.

/// A single voltage reading.
pub type Sample = f32;

/// Samples per batch.
pub const BATCH_CAPACITY: usize = 5;

/// Size of a flushed batch on the wire.
pub const BATCH_PAYLOAD_SIZE: usize = BATCH_CAPACITY * core::mem::size_of::<Sample>();

/// Five samples in acquisition order, handed out exactly once per fill.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FullBatch {
    pub samples: [Sample; BATCH_CAPACITY],
}

impl FullBatch {
    /// Raw little-endian byte block, a straight copy of the float bits.
    pub fn to_le_bytes(&self) -> [u8; BATCH_PAYLOAD_SIZE] {
        let mut out = [0u8; BATCH_PAYLOAD_SIZE];
        for (chunk, sample) in out.chunks_exact_mut(4).zip(self.samples.iter()) {
            chunk.copy_from_slice(&sample.to_le_bytes());
        }
        out
    }
}

/// Accumulates samples until `BATCH_CAPACITY` is reached.
///
/// Invariant: `fill < BATCH_CAPACITY` between calls, and every slot at
/// or past `fill` is zero.
#[derive(Clone, Debug)]
pub struct Batcher {
    slots: [Sample; BATCH_CAPACITY],
    fill: usize,
}

impl Batcher {
    pub const fn new() -> Self {
        Self {
            slots: [0.0; BATCH_CAPACITY],
            fill: 0,
        }
    }

    /// Append a sample. Returns the completed batch when this sample was
    /// the fifth since the last flush; the buffer is zeroed and the fill
    /// index reset before returning.
    pub fn push(&mut self, sample: Sample) -> Option<FullBatch> {
        self.slots[self.fill] = sample;
        if self.fill == BATCH_CAPACITY - 1 {
            let full = FullBatch {
                samples: self.slots,
            };
            self.slots = [0.0; BATCH_CAPACITY];
            self.fill = 0;
            Some(full)
        } else {
            self.fill += 1;
            None
        }
    }

    /// Number of samples waiting for the next flush.
    pub fn fill(&self) -> usize {
        self.fill
    }

    /// Current buffer contents, including the zeroed tail.
    pub fn slots(&self) -> &[Sample; BATCH_CAPACITY] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new()
    }
}
