//! exg-stream - single-channel AD7124 biopotential sampler for nRF52840.
//!
//! Every conversion is written to the USB CDC port as a 5-byte record;
//! every fifth one also completes a 20-byte batch that is published on a
//! BLE GATT characteristic.
//!
//! ## Tasks
//!
//! | Task              | Role                                              |
//! |-------------------|---------------------------------------------------|
//! | `softdevice_task` | SoftDevice event pump, forwards USB power events  |
//! | `ble_task`        | advertise, serve one central, repeat              |
//! | `usb_task`        | USB device stack                                  |
//! | `serial_task`     | pipe → CDC bulk endpoint                          |
//! | `control_task`    | acquire → dispatch loop with fault supervision    |

#![no_std]
#![no_main]

mod ble;
mod usb;

use defmt::{debug, error, info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::spim::{self, Spim};
use embassy_nrf::usb::vbus_detect::SoftwareVbusDetect;
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_time::{Delay, Instant};
use exg_stream::adc::ad7124::Ad7124;
use exg_stream::config;
use exg_stream::rate::measure_sample_rate;
use exg_stream::supervisor::{Action, Supervisor};
use exg_stream::{Acquisition, Dispatcher, Pipeline};
use nrf_softdevice::{raw, SocEvent, Softdevice};
use static_cell::StaticCell;

use ble::{BleNotifier, Server};
use usb::serial::{PipeQueue, UsbDriver, UsbSerialSink};
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    SPIM3 => spim::InterruptHandler<peripherals::SPI3>;
});

type Adc = Ad7124<Spim<'static, peripherals::SPI3>, Output<'static>, Delay>;
type ExgPipeline = Pipeline<Adc, UsbSerialSink, BleNotifier>;

static SERVER: StaticCell<Server> = StaticCell::new();
static VBUS: StaticCell<SoftwareVbusDetect> = StaticCell::new();

// ═══════════════════════════════════════════════════════════════════════════
// Tasks
// ═══════════════════════════════════════════════════════════════════════════

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice, vbus: &'static SoftwareVbusDetect) -> ! {
    sd.run_with_callback(|event| match event {
        SocEvent::PowerUsbDetected => vbus.detected(true),
        SocEvent::PowerUsbRemoved => vbus.detected(false),
        SocEvent::PowerUsbPowerReady => vbus.ready(),
        _ => {}
    })
    .await
}

#[embassy_executor::task]
async fn ble_task(sd: &'static Softdevice, server: &'static Server) -> ! {
    ble::advertise_loop(sd, server).await
}

#[embassy_executor::task]
async fn usb_task(device: embassy_usb::UsbDevice<'static, UsbDriver>) -> ! {
    usb::serial::run_usb_device(device).await
}

#[embassy_executor::task]
async fn serial_task(class: embassy_usb::class::cdc_acm::CdcAcmClass<'static, UsbDriver>) -> ! {
    usb::serial::serial_writer_task(class).await
}

#[embassy_executor::task]
async fn control_task(mut pipeline: ExgPipeline) -> ! {
    match pipeline.acquisition.reinitialize(&config::ADC_CONFIG).await {
        Ok(()) => info!(
            "AD7124 configured: {} SPS nominal",
            config::ADC_CONFIG.nominal_rate_sps()
        ),
        // Left to the supervisor: every read fails until a re-init succeeds.
        Err(e) => error!("AD7124 configuration failed: {:?}", e),
    }

    if config::MEASURE_SAMPLE_RATE_ON_BOOT {
        let window = config::RATE_MEASURE_WINDOW_MS;
        match measure_sample_rate(&mut pipeline, window, || Instant::now().as_millis()).await {
            Ok(report) => info!(
                "rate test: {} samples, {} faults in {} ms",
                report.samples, report.faults, report.window_ms
            ),
            Err(e) => debug!("rate report not delivered: {:?}", e),
        }
    }

    let mut supervisor = Supervisor::new(config::ADC_REINIT_AFTER_FAULTS);
    let mut samples: u32 = 0;

    loop {
        match pipeline.step().await {
            Ok(out) => {
                supervisor.on_sample();
                if let Some(fault) = out.fault {
                    supervisor.on_fault(&fault);
                }
                samples = samples.wrapping_add(1);
                if samples % config::STATUS_LOG_EVERY_SAMPLES == 0 {
                    info!(
                        "{} samples, {} transport faults, {} ADC re-inits",
                        samples,
                        supervisor.transport_faults(),
                        supervisor.reinits()
                    );
                }
            }
            Err(e) => {
                warn!("acquisition fault: {:?}", e);
                if supervisor.on_fault(&e) == Action::ReinitAdc {
                    warn!("re-initialising AD7124");
                    if let Err(e) = pipeline.acquisition.reinitialize(&config::ADC_CONFIG).await {
                        error!("AD7124 re-init failed: {:?}", e);
                    }
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Setup
// ═══════════════════════════════════════════════════════════════════════════

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: config::BLE_ATT_MTU,
        }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: config::BLE_DEVICE_NAME.as_ptr() as _,
            current_len: config::BLE_DEVICE_NAME.len() as u16,
            max_len: config::BLE_DEVICE_NAME.len() as u16,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

/// Nearest SPIM clock not above `hz`.
fn spim_frequency(hz: u32) -> spim::Frequency {
    match hz {
        h if h >= 8_000_000 => spim::Frequency::M8,
        h if h >= 4_000_000 => spim::Frequency::M4,
        h if h >= 2_000_000 => spim::Frequency::M2,
        h if h >= 1_000_000 => spim::Frequency::M1,
        h if h >= 500_000 => spim::Frequency::K500,
        h if h >= 250_000 => spim::Frequency::K250,
        _ => spim::Frequency::K125,
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("exg-stream starting");

    // Priorities 0, 1 and 4 are reserved by the SoftDevice.
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(nrf_config);
    interrupt::USBD.set_priority(Priority::P2);
    interrupt::SPIM3.set_priority(Priority::P2);

    // BLE
    let sd = Softdevice::enable(&softdevice_config());
    let server = SERVER.init(unwrap!(Server::new(sd)));
    let sd: &'static Softdevice = sd;

    // SAFETY: plain SoftDevice calls, issued once after enable.
    unsafe {
        raw::sd_power_usbdetected_enable(1);
        raw::sd_power_usbremoved_enable(1);
        raw::sd_power_usbpwrrdy_enable(1);
    }
    let vbus = VBUS.init(SoftwareVbusDetect::new(true, true));

    unwrap!(spawner.spawn(softdevice_task(sd, vbus)));
    unwrap!(spawner.spawn(ble_task(sd, server)));

    // USB
    let usb = usb::serial::init(p.USBD, vbus);
    unwrap!(spawner.spawn(usb_task(usb.device)));
    unwrap!(spawner.spawn(serial_task(usb.class)));

    // ADC
    let mut spi_config = spim::Config::default();
    spi_config.frequency = spim_frequency(config::ADC_SPI_FREQUENCY_HZ);
    spi_config.mode = spim::MODE_3;
    let spi = Spim::new(p.SPI3, Irqs, p.P0_13, p.P1_08, p.P1_01, spi_config);
    let cs = Output::new(p.P0_27, Level::High, OutputDrive::Standard);

    let adc = Ad7124::new(spi, cs, Delay, config::ADC_CHANNEL_MAP)
        .with_timeout(config::ADC_READ_TIMEOUT_MS, config::ADC_POLL_INTERVAL_US);

    let pipeline = Pipeline::new(
        Acquisition::new(adc, config::ADC_CHANNEL),
        Dispatcher::new(UsbSerialSink::new(PipeQueue), BleNotifier::new(server)),
    );
    unwrap!(spawner.spawn(control_task(pipeline)));

    info!("all tasks spawned");
}
