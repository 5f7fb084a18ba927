//! Acquisition step and the acquire → dispatch cycle built on it.

use crate::adc::ad7124::AdcConfig;
use crate::adc::VoltageSource;
use crate::batch::Sample;
use crate::dispatch::{Dispatched, Dispatcher, PacketSink, SerialSink};
use crate::error::Error;

/// Pulls one sample per call from a fixed ADC channel.
///
/// Timing is set by the converter's output rate; the step itself does
/// no rate control. The timeout lives in the source (see
/// `Ad7124::with_timeout`).
pub struct Acquisition<A> {
    source: A,
    channel: u8,
}

impl<A: VoltageSource> Acquisition<A> {
    pub fn new(source: A, channel: u8) -> Self {
        Self { source, channel }
    }

    pub async fn acquire(&mut self) -> Result<Sample, Error> {
        self.source.read_voltage(self.channel).await
    }

    /// Reset and reconfigure the converter.
    pub async fn reinitialize(&mut self, config: &AdcConfig) -> Result<(), Error> {
        self.source.configure(config).await
    }

    pub fn source_mut(&mut self) -> &mut A {
        &mut self.source
    }
}

/// One acquisition step feeding one dispatcher.
pub struct Pipeline<A, S, P> {
    pub acquisition: Acquisition<A>,
    pub dispatcher: Dispatcher<S, P>,
}

impl<A, S, P> Pipeline<A, S, P>
where
    A: VoltageSource,
    S: SerialSink,
    P: PacketSink,
{
    pub fn new(acquisition: Acquisition<A>, dispatcher: Dispatcher<S, P>) -> Self {
        Self {
            acquisition,
            dispatcher,
        }
    }

    /// Acquire one sample and deliver it. An acquisition fault leaves the
    /// batch untouched.
    pub async fn step(&mut self) -> Result<Dispatched, Error> {
        let sample = self.acquisition.acquire().await?;
        Ok(self.dispatcher.on_sample(sample).await)
    }
}
