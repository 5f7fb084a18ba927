//! Unified error type for exg-stream.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Top-level error type used across the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The ADC collaborator failed to deliver a sample.
    Acquisition(AcquisitionFault),

    /// One of the two sinks rejected a write.
    Transport(TransportFault),
}

/// Why a sample could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionFault {
    /// No conversion became ready within the read timeout.
    Timeout,
    /// SPI transfer or chip-select toggle failed.
    Bus,
    /// Channel index outside the converter's 16 channel registers.
    InvalidChannel,
    /// The ID register read back as all zeros or all ones.
    NoDevice,
}

/// Why a sink write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportFault {
    /// No host has the serial port open; the record was dropped.
    SerialUnavailable,
    /// The serial queue could not take the whole record; it was dropped.
    SerialOverflow,
    /// GATT notification was refused by the SoftDevice.
    NotifyFailed,
    /// Characteristic value could not be updated.
    SetValueFailed,
}

impl Error {
    pub fn is_acquisition(&self) -> bool {
        matches!(self, Error::Acquisition(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

// Convenience conversions

impl From<AcquisitionFault> for Error {
    fn from(e: AcquisitionFault) -> Self {
        Error::Acquisition(e)
    }
}

impl From<TransportFault> for Error {
    fn from(e: TransportFault) -> Self {
        Error::Transport(e)
    }
}
