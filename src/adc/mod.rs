//! ADC collaborator - the "read one voltage sample" boundary.
//!
//! The control loop only sees [`VoltageSource`]; the AD7124 driver in
//! [`ad7124`] is the on-board implementation. Both are generic over the
//! `embedded-hal-async` traits so they run against fakes on the host.

pub mod ad7124;


use crate::error::Error;
use ad7124::AdcConfig;

/// Interface the acquisition step consumes.
#[allow(async_fn_in_trait)]
pub trait VoltageSource {
    /// Reset the converter and apply `config` to the configured channel.
    ///
    /// Also used by the supervisor to recover a converter that stopped
    /// answering.
    async fn configure(&mut self, config: &AdcConfig) -> Result<(), Error>;

    /// Wait for the next conversion on `channel` and return it in volts.
    async fn read_voltage(&mut self, channel: u8) -> Result<f32, Error>;
}
