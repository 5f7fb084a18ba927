//! USB Device subsystem - presents a CDC-ACM serial port to the host.
//!
//! The nRF52840's built-in USB 2.0 Full-Speed controller is driven by
//! `embassy-usb`.  Every sample is written to the port as a 5-byte
//! record (`f32` LE + `\n`), so the host sees an unbroken stream at the
//! converter's output rate.

pub mod serial;
