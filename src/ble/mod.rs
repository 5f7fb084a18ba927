//! Bluetooth Low Energy subsystem.
//!
//! This module drives the Nordic SoftDevice S140 in **Peripheral** role:
//!
//! 1. **GATT server** - one primary service carrying a single 20-byte
//!    read/notify characteristic that holds the latest sample batch.
//! 2. **Advertiser** - connectable undirected advertising with the
//!    service UUID; restarts after every disconnect.
//! 3. **Notifier** - the `PacketSink` the control loop pushes batches
//!    into. Values are always stored; a notification goes out only when
//!    a central is connected and subscribed.

pub mod server;

pub use server::{advertise_loop, BleNotifier, Server};
