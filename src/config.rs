//! Application-wide constants and compile-time configuration.
//!
//! All hardware pin assignments, timing parameters, and protocol
//! constants live here so they can be tuned in one place.

use crate::adc::ad7124::{AdcConfig, ChannelMap, FilterType, Gain, InputSelect, Reference};

// ADC (AD7124 on SPIM3)

/// Output data rate divider (FS field of FILTER_0).
///
/// Full-power SINC4 rate is `614400 / (32 * FS)` samples per second:
///
/// | FS   | SPS   |
/// |------|-------|
/// | 1    | 19200 |
/// | 19   | 1010  |
/// | 38   | 505   |
/// | 60   | 320   |
/// | 75   | 256   |
/// | 160  | 120   |
/// | 320  | 60    |
/// | 384  | 50    |
/// | 2047 | 9.38  |
pub const ADC_OUTPUT_RATE_DIVIDER: u16 = 75;

/// Channel register used for the single differential input.
pub const ADC_CHANNEL: u8 = 0;

/// Differential input pair for `ADC_CHANNEL` (AIN1 - AIN0), using setup 0.
pub const ADC_CHANNEL_MAP: ChannelMap = ChannelMap {
    channel: ADC_CHANNEL,
    setup: 0,
    positive: InputSelect::Ain(1),
    negative: InputSelect::Ain(0),
};

/// Setup 0 configuration applied at boot and after every re-init.
pub const ADC_CONFIG: AdcConfig = AdcConfig {
    reference: Reference::Internal,
    gain: Gain::X1,
    filter: FilterType::Sinc4,
    output_rate_divider: ADC_OUTPUT_RATE_DIVIDER,
    bipolar: true,
};

/// SPI clock for the ADC (the AD7124 tolerates up to 10 MHz on SCLK).
pub const ADC_SPI_FREQUENCY_HZ: u32 = 8_000_000;

/// Lower bound on how long a single conversion is waited for.
///
/// Only the poll delays are counted; SPI traffic and timer tick rounding
/// add to it, so the real wait can be two to three times longer at a
/// 20 µs poll interval. The slowest configurable rate is ~9.4 SPS, so
/// 250 ms covers every divider with margin.
pub const ADC_READ_TIMEOUT_MS: u32 = 250;

/// Interval between STATUS polls while waiting for RDY.
pub const ADC_POLL_INTERVAL_US: u32 = 20;

/// Consecutive acquisition faults before the ADC is reset and reconfigured.
pub const ADC_REINIT_AFTER_FAULTS: u32 = 3;

// Serial (USB CDC-ACM)

/// Capacity of the record pipe between the control loop and the USB task.
/// 64 records of 5 bytes = 1.25 s of backlog at 256 SPS.
pub const SERIAL_PIPE_SIZE: usize = 320;

/// CDC bulk endpoint packet size.
pub const SERIAL_MAX_PACKET_SIZE: u16 = 64;

/// How often the writer task re-checks DTR while the port is closed or idle.
pub const SERIAL_DTR_POLL_MS: u64 = 50;

/// A bulk IN packet the host has not collected by now counts as a closed port.
pub const SERIAL_WRITE_TIMEOUT_MS: u64 = 100;

// BLE

/// GAP device name (also used in the scan response).
pub const BLE_DEVICE_NAME: &str = "OpenEarable ExG";

/// ADC service UUID `0029d054-23d0-4c58-a199-c6bdc16c4975`, little-endian.
pub const BLE_ADC_SERVICE_UUID_LE: [u8; 16] = [
    0x75, 0x49, 0x6c, 0xc1, 0xbd, 0xc6, 0x99, 0xa1, 0x58, 0x4c, 0xd0, 0x23, 0x54, 0xd0, 0x29, 0x00,
];

/// ATT MTU. The default 23 leaves 20 bytes of notification payload,
/// which is what bounds a batch to 5 floats.
pub const BLE_ATT_MTU: u16 = 23;

/// Advertising interval (in 0.625 ms units). 160 = 100 ms.
pub const BLE_ADV_INTERVAL: u32 = 160;

// USB

/// USB VID/PID - use the "pid.codes" open-source test VID.
/// Replace with your own allocated VID/PID for production.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0002;

/// USB device strings.
pub const USB_MANUFACTURER: &str = "exg-stream";
pub const USB_PRODUCT: &str = "ExG Sample Stream";
pub const USB_SERIAL_NUMBER: &str = "000001";

// GPIO pin assignments (OpenEarable v1 / nRF52840)
//
//   ADC SCK   → P0.13
//   ADC MOSI  → P1.01
//   ADC MISO  → P1.08
//   ADC CS    → P0.27
//   ADC RDY is read through STATUS, not the DOUT/RDY pin.

// Diagnostics

/// Wall-clock window of the sample-rate self test (milliseconds).
pub const RATE_MEASURE_WINDOW_MS: u64 = 5_000;

/// Run the sample-rate self test once before entering the steady loop.
pub const MEASURE_SAMPLE_RATE_ON_BOOT: bool = false;

/// Log a status line (sample count, fault counters) this often.
/// 2560 samples = 10 s at 256 SPS.
pub const STATUS_LOG_EVERY_SAMPLES: u32 = 2560;
