//! Host-testable library interface for exg-stream.
//!
//! Everything the control loop does that is not a register poke or a
//! SoftDevice call lives here: batching, serial framing, the AD7124
//! driver (generic over `embedded-hal-async`), the fault policy and the
//! rate self test.
//!
//! Usage: `cargo test`
//!
//! Note: The embedded binary uses main.rs with #![no_std] and #![no_main]
//! and is only built with `--features embedded`.

#![cfg_attr(not(test), no_std)]

// ═══════════════════════════════════════════════════════════════════════════
// Core: acquisition, batching, dispatch
// ═══════════════════════════════════════════════════════════════════════════

pub mod acquisition;
pub mod batch;
pub mod dispatch;

// ═══════════════════════════════════════════════════════════════════════════
// Collaborators & ambient
// ═══════════════════════════════════════════════════════════════════════════

pub mod adc;
pub mod config;
pub mod decode;
pub mod error;
pub mod rate;
pub mod serial;
pub mod supervisor;

pub use acquisition::{Acquisition, Pipeline};
pub use batch::{Batcher, FullBatch, Sample, BATCH_CAPACITY, BATCH_PAYLOAD_SIZE};
pub use dispatch::{serial_record, Dispatched, Dispatcher, PacketSink, SerialSink};
pub use error::Error;

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests - delivery properties of the batching & dispatch unit
// ═══════════════════════════════════════════════════════════════════════════
