//! Analog Devices AD7124 24-bit sigma-delta ADC over SPI (mode 3).
//!
//! Only what the sampler needs: reset, ID check, continuous conversion
//! on one channel with one setup, and RDY polling through STATUS.
//!
//! Every transfer starts with the COMMS byte:
//! ```text
//! Bit 7   : WEN (must be 0)
//! Bit 6   : R/W (1 = read)
//! Bit 5-0 : register address
//! ```
//! Multi-byte registers are shifted out MSB first.

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::SpiBus;

use crate::adc::VoltageSource;
use crate::error::{AcquisitionFault, Error};

#[allow(dead_code)]
pub mod constants {
    // Register addresses
    pub const REG_STATUS: u8 = 0x00;
    pub const REG_ADC_CONTROL: u8 = 0x01;
    pub const REG_DATA: u8 = 0x02;
    pub const REG_IO_CONTROL_1: u8 = 0x03;
    pub const REG_IO_CONTROL_2: u8 = 0x04;
    pub const REG_ID: u8 = 0x05;
    pub const REG_ERROR: u8 = 0x06;
    pub const REG_ERROR_EN: u8 = 0x07;
    pub const REG_CHANNEL_0: u8 = 0x09;
    pub const REG_CONFIG_0: u8 = 0x19;
    pub const REG_FILTER_0: u8 = 0x21;

    /// Number of channel registers (CHANNEL_0..CHANNEL_15).
    pub const CHANNEL_COUNT: u8 = 16;
    /// Number of setups (CONFIG_x / FILTER_x pairs).
    pub const SETUP_COUNT: u8 = 8;

    // COMMS byte
    pub const COMMS_READ: u8 = 0x40;
    pub const COMMS_ADDR_MASK: u8 = 0x3F;

    // STATUS
    /// Active-low data ready flag.
    pub const STATUS_RDY_N: u8 = 0x80;

    // ADC_CONTROL
    pub const CONTROL_REF_EN: u16 = 1 << 8;
    pub const CONTROL_POWER_SHIFT: u16 = 6;
    pub const CONTROL_MODE_SHIFT: u16 = 2;

    // CONFIG_x
    pub const CONFIG_BIPOLAR: u16 = 1 << 11;
    pub const CONFIG_AIN_BUFP: u16 = 1 << 6;
    pub const CONFIG_AIN_BUFM: u16 = 1 << 5;
    pub const CONFIG_REF_SEL_SHIFT: u16 = 3;

    // FILTER_x
    pub const FILTER_TYPE_SHIFT: u32 = 21;
    pub const FILTER_POST_SHIFT: u32 = 17;
    pub const FILTER_FS_MASK: u32 = 0x07FF;

    // CHANNEL_x
    pub const CHANNEL_ENABLE: u16 = 1 << 15;
    pub const CHANNEL_SETUP_SHIFT: u16 = 12;
    pub const CHANNEL_AINP_SHIFT: u16 = 5;

    /// Internal reference voltage.
    pub const INTERNAL_REF_VOLTS: f32 = 2.5;
    /// Master clock divided by 32 in full power mode.
    pub const FULL_POWER_FILTER_CLOCK_HZ: f32 = 614_400.0;
    /// 64 consecutive ones reset the serial interface and all registers.
    pub const RESET_SEQUENCE: [u8; 8] = [0xFF; 8];
    /// Wait after reset before the first register access.
    pub const RESET_SETTLE_US: u32 = 1_000;
}

/// Reference source for a setup (REF_SEL).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reference {
    /// REFIN1(+)/REFIN1(-) at the given voltage.
    RefIn1(f32),
    /// REFIN2(+)/REFIN2(-) at the given voltage.
    RefIn2(f32),
    /// Internal 2.5 V band gap (requires REF_EN).
    Internal,
    /// AVDD - AVSS at the given voltage.
    Avdd(f32),
}

impl Reference {
    pub fn bits(self) -> u16 {
        match self {
            Reference::RefIn1(_) => 0,
            Reference::RefIn2(_) => 1,
            Reference::Internal => 2,
            Reference::Avdd(_) => 3,
        }
    }

    pub fn volts(self) -> f32 {
        match self {
            Reference::RefIn1(v) | Reference::RefIn2(v) | Reference::Avdd(v) => v,
            Reference::Internal => constants::INTERNAL_REF_VOLTS,
        }
    }
}

/// Programmable gain amplifier setting (PGA).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gain {
    X1,
    X2,
    X4,
    X8,
    X16,
    X32,
    X64,
    X128,
}

impl Gain {
    pub fn bits(self) -> u16 {
        self as u16
    }

    pub fn factor(self) -> f32 {
        (1u32 << self.bits()) as f32
    }
}

/// Digital filter type (FILTER field).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterType {
    Sinc4,
    Sinc3,
    FastSinc4,
    FastSinc3,
    Post,
}

impl FilterType {
    pub fn bits(self) -> u32 {
        match self {
            FilterType::Sinc4 => 0b000,
            FilterType::Sinc3 => 0b010,
            FilterType::FastSinc4 => 0b100,
            FilterType::FastSinc3 => 0b101,
            FilterType::Post => 0b111,
        }
    }
}

/// Analog input multiplexer selection (AINP / AINM fields).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputSelect {
    /// AIN0..AIN15.
    Ain(u8),
    Temperature,
    Avss,
    InternalRef,
    Dgnd,
}

impl InputSelect {
    pub fn bits(self) -> u16 {
        match self {
            InputSelect::Ain(n) => (n & 0x0F) as u16,
            InputSelect::Temperature => 16,
            InputSelect::Avss => 17,
            InputSelect::InternalRef => 18,
            InputSelect::Dgnd => 19,
        }
    }
}

/// Conversion mode (Mode field of ADC_CONTROL).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatingMode {
    Continuous = 0,
    Single = 1,
    Standby = 2,
    PowerDown = 3,
    Idle = 4,
}

/// Power mode (POWER_MODE field of ADC_CONTROL).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerMode {
    Low = 0,
    Mid = 1,
    Full = 2,
}

/// The tunables of one setup: reference, gain, filter, rate, polarity.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcConfig {
    pub reference: Reference,
    pub gain: Gain,
    pub filter: FilterType,
    /// FS field, 1..=2047.
    pub output_rate_divider: u16,
    pub bipolar: bool,
}

impl AdcConfig {
    /// CONFIG_x register value. Analog input buffers stay enabled (reset default).
    pub fn config_register(&self) -> u16 {
        use constants::*;
        let mut value = CONFIG_AIN_BUFP | CONFIG_AIN_BUFM;
        if self.bipolar {
            value |= CONFIG_BIPOLAR;
        }
        value | (self.reference.bits() << CONFIG_REF_SEL_SHIFT) | self.gain.bits()
    }

    /// FILTER_x register value, post filter disabled.
    pub fn filter_register(&self) -> u32 {
        use constants::*;
        let fs = (self.output_rate_divider as u32).clamp(1, FILTER_FS_MASK);
        (self.filter.bits() << FILTER_TYPE_SHIFT) | fs
    }

    /// Nominal full-power output rate for the SINC3/SINC4 filters.
    pub fn nominal_rate_sps(&self) -> f32 {
        let fs = self.output_rate_divider.clamp(1, constants::FILTER_FS_MASK as u16);
        constants::FULL_POWER_FILTER_CLOCK_HZ / (32.0 * fs as f32)
    }

    /// Convert a 24-bit data register value to volts at the input pins.
    pub fn code_to_volts(&self, code: u32) -> f32 {
        let code = (code & 0x00FF_FFFF) as f32;
        let span = self.reference.volts() / self.gain.factor();
        if self.bipolar {
            (code / 8_388_608.0 - 1.0) * span
        } else {
            code / 16_777_216.0 * span
        }
    }
}

/// Which physical inputs feed the sampled channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelMap {
    pub channel: u8,
    pub setup: u8,
    pub positive: InputSelect,
    pub negative: InputSelect,
}

impl ChannelMap {
    /// CHANNEL_x register value with the channel enabled.
    pub fn channel_register(&self) -> u16 {
        use constants::*;
        CHANNEL_ENABLE
            | (((self.setup & 0x07) as u16) << CHANNEL_SETUP_SHIFT)
            | (self.positive.bits() << CHANNEL_AINP_SHIFT)
            | self.negative.bits()
    }
}

/// ADC_CONTROL register value.
pub fn control_register(mode: OperatingMode, power: PowerMode, ref_enable: bool) -> u16 {
    use constants::*;
    let mut value = ((power as u16) << CONTROL_POWER_SHIFT) | ((mode as u16) << CONTROL_MODE_SHIFT);
    if ref_enable {
        value |= CONTROL_REF_EN;
    }
    value
}

/// Register width in bytes.
fn register_size(addr: u8) -> usize {
    use constants::*;
    match addr {
        REG_STATUS | REG_ID | 0x08 => 1,
        REG_ADC_CONTROL | REG_IO_CONTROL_2 => 2,
        REG_DATA | REG_IO_CONTROL_1 | REG_ERROR | REG_ERROR_EN => 3,
        0x09..=0x20 => 2,
        _ => 3,
    }
}

/// AD7124 driver with a dedicated chip-select pin.
pub struct Ad7124<SPI, CS, D> {
    spi: SPI,
    cs: CS,
    delay: D,
    channel: ChannelMap,
    config: Option<AdcConfig>,
    timeout_us: u32,
    poll_interval_us: u32,
}

impl<SPI, CS, D> Ad7124<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    pub fn new(spi: SPI, cs: CS, delay: D, channel: ChannelMap) -> Self {
        Self {
            spi,
            cs,
            delay,
            channel,
            config: None,
            timeout_us: 250_000,
            poll_interval_us: 20,
        }
    }

    /// Set the conversion-ready timeout and the STATUS poll interval.
    ///
    /// The budget counts requested delay time only. SPI transfers and
    /// timer rounding come on top, so wall-clock time before `Timeout`
    /// is at least `timeout_ms` and can be a few times longer with a
    /// short poll interval.
    pub fn with_timeout(mut self, timeout_ms: u32, poll_interval_us: u32) -> Self {
        self.timeout_us = timeout_ms.saturating_mul(1_000);
        self.poll_interval_us = poll_interval_us.max(1);
        self
    }

    /// Setup applied by the last successful `configure`.
    pub fn config(&self) -> Option<&AdcConfig> {
        self.config.as_ref()
    }

    /// Give back the bus, chip-select pin and delay.
    pub fn release(self) -> (SPI, CS, D) {
        (self.spi, self.cs, self.delay)
    }

    /// Clock 64 ones into DIN; every register returns to its reset value.
    pub async fn reset(&mut self) -> Result<(), Error> {
        self.cs.set_low().map_err(|_| AcquisitionFault::Bus)?;
        let result = match self.spi.write(&constants::RESET_SEQUENCE).await {
            Ok(()) => self.spi.flush().await,
            Err(e) => Err(e),
        };
        self.cs.set_high().map_err(|_| AcquisitionFault::Bus)?;
        result.map_err(|_| AcquisitionFault::Bus)?;
        self.config = None;
        self.delay.delay_us(constants::RESET_SETTLE_US).await;
        Ok(())
    }

    pub async fn read_id(&mut self) -> Result<u8, Error> {
        Ok(self.read_register(constants::REG_ID).await? as u8)
    }

    pub async fn read_register(&mut self, addr: u8) -> Result<u32, Error> {
        let size = register_size(addr);
        let mut frame = [0u8; 4];
        frame[0] = constants::COMMS_READ | (addr & constants::COMMS_ADDR_MASK);
        self.transfer(&mut frame[..=size]).await?;
        Ok(frame[1..=size]
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32))
    }

    pub async fn write_register(&mut self, addr: u8, value: u32) -> Result<(), Error> {
        let size = register_size(addr);
        let mut frame = [0u8; 4];
        frame[0] = addr & constants::COMMS_ADDR_MASK;
        for i in 0..size {
            frame[1 + i] = (value >> (8 * (size - 1 - i))) as u8;
        }
        self.transfer(&mut frame[..=size]).await
    }

    pub async fn set_adc_control(
        &mut self,
        mode: OperatingMode,
        power: PowerMode,
        ref_enable: bool,
    ) -> Result<(), Error> {
        let value = control_register(mode, power, ref_enable);
        self.write_register(constants::REG_ADC_CONTROL, value as u32)
            .await
    }

    /// Write CONFIG_x and FILTER_x for `setup`.
    pub async fn set_setup(&mut self, setup: u8, config: &AdcConfig) -> Result<(), Error> {
        if setup >= constants::SETUP_COUNT {
            return Err(AcquisitionFault::InvalidChannel.into());
        }
        self.write_register(constants::REG_CONFIG_0 + setup, config.config_register() as u32)
            .await?;
        self.write_register(constants::REG_FILTER_0 + setup, config.filter_register())
            .await
    }

    pub async fn set_channel(&mut self, map: &ChannelMap) -> Result<(), Error> {
        if map.channel >= constants::CHANNEL_COUNT {
            return Err(AcquisitionFault::InvalidChannel.into());
        }
        self.write_register(
            constants::REG_CHANNEL_0 + map.channel,
            map.channel_register() as u32,
        )
        .await
    }

    /// Poll STATUS until RDY goes low or the delay budget is spent.
    ///
    /// Gives up after `timeout / poll_interval` polls that found RDY high.
    pub async fn wait_ready(&mut self) -> Result<(), Error> {
        let mut waited_us: u32 = 0;
        loop {
            let status = self.read_register(constants::REG_STATUS).await? as u8;
            if status & constants::STATUS_RDY_N == 0 {
                return Ok(());
            }
            if waited_us >= self.timeout_us {
                return Err(AcquisitionFault::Timeout.into());
            }
            self.delay.delay_us(self.poll_interval_us).await;
            waited_us = waited_us.saturating_add(self.poll_interval_us);
        }
    }

    /// Wait for a conversion and return the raw 24-bit code.
    pub async fn read_raw(&mut self) -> Result<u32, Error> {
        self.wait_ready().await?;
        self.read_register(constants::REG_DATA).await
    }

    async fn transfer(&mut self, frame: &mut [u8]) -> Result<(), Error> {
        self.cs.set_low().map_err(|_| AcquisitionFault::Bus)?;
        let result = match self.spi.transfer_in_place(frame).await {
            Ok(()) => self.spi.flush().await,
            Err(e) => Err(e),
        };
        self.cs.set_high().map_err(|_| AcquisitionFault::Bus)?;
        result.map_err(|_| AcquisitionFault::Bus.into())
    }
}

impl<SPI, CS, D> VoltageSource for Ad7124<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    async fn configure(&mut self, config: &AdcConfig) -> Result<(), Error> {
        self.reset().await?;

        let id = self.read_id().await?;
        if id == 0x00 || id == 0xFF {
            return Err(AcquisitionFault::NoDevice.into());
        }

        let ref_enable = matches!(config.reference, Reference::Internal);
        self.set_adc_control(OperatingMode::Continuous, PowerMode::Full, ref_enable)
            .await?;
        let map = self.channel;
        self.set_setup(map.setup, config).await?;
        self.set_channel(&map).await?;

        self.config = Some(*config);
        Ok(())
    }

    async fn read_voltage(&mut self, channel: u8) -> Result<f32, Error> {
        if channel != self.channel.channel {
            return Err(AcquisitionFault::InvalidChannel.into());
        }
        let Some(config) = self.config else {
            return Err(AcquisitionFault::NoDevice.into());
        };
        let code = self.read_raw().await?;
        Ok(config.code_to_volts(code))
    }
}
