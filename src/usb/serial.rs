//! USB CDC-ACM serial port carrying the raw sample stream.
//!
//! The control loop never touches the USB stack directly: records go
//! into a byte pipe without waiting, and a writer task moves them into
//! bulk packets. While no program has the port open (DTR low) the sink
//! refuses records and the backlog is discarded.

use core::sync::atomic::{AtomicBool, Ordering};

use defmt::{debug, info};
use embassy_futures::select::{select, Either};
use embassy_nrf::usb::vbus_detect::SoftwareVbusDetect;
use embassy_nrf::usb::Driver;
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embassy_time::{with_timeout, Duration, Timer};
use embassy_usb::driver::EndpointError;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::{Builder, Config, UsbDevice};
use exg_stream::config::{self, SERIAL_PIPE_SIZE};
use exg_stream::serial::{QueuedSerial, RecordQueue};
use static_cell::StaticCell;

// CLOCK_POWER belongs to the SoftDevice; VBUS events arrive through
// its SoC event callback instead (see `SoftwareVbusDetect`).
bind_interrupts!(struct Irqs {
    USBD => embassy_nrf::usb::InterruptHandler<peripherals::USBD>;
});

pub type UsbDriver = Driver<'static, peripherals::USBD, &'static SoftwareVbusDetect>;

type SerialPipe = Pipe<CriticalSectionRawMutex, SERIAL_PIPE_SIZE>;

static SERIAL_PIPE: SerialPipe = Pipe::new();
static HOST_OPEN: AtomicBool = AtomicBool::new(false);

static CDC_STATE: StaticCell<State> = StaticCell::new();
static USB_CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_CTRL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// Build result: the device runner and the CDC class for the writer task.
pub struct UsbSerial {
    pub device: UsbDevice<'static, UsbDriver>,
    pub class: CdcAcmClass<'static, UsbDriver>,
}

/// Initialise the USB stack with a single CDC-ACM function.
///
/// Must be called exactly once.  All static buffers are consumed here.
pub fn init(usbd: peripherals::USBD, vbus: &'static SoftwareVbusDetect) -> UsbSerial {
    let driver = Driver::new(usbd, Irqs, vbus);

    let mut usb_config = Config::new(config::USB_VID, config::USB_PID);
    usb_config.manufacturer = Some(config::USB_MANUFACTURER);
    usb_config.product = Some(config::USB_PRODUCT);
    usb_config.serial_number = Some(config::USB_SERIAL_NUMBER);
    usb_config.max_power = 100; // mA
    usb_config.max_packet_size_0 = 64;

    // CDC uses an IAD, so the device must announce the misc class triple.
    usb_config.device_class = 0xEF;
    usb_config.device_sub_class = 0x02;
    usb_config.device_protocol = 0x01;
    usb_config.composite_with_iads = true;

    let mut builder = Builder::new(
        driver,
        usb_config,
        USB_CONFIG_DESC.init([0u8; 256]),
        USB_BOS_DESC.init([0u8; 256]),
        USB_MSOS_DESC.init([0u8; 256]),
        USB_CTRL_BUF.init([0u8; 64]),
    );

    let class = CdcAcmClass::new(
        &mut builder,
        CDC_STATE.init(State::new()),
        config::SERIAL_MAX_PACKET_SIZE,
    );

    let device = builder.build();

    info!("USB CDC-ACM serial initialised");

    UsbSerial { device, class }
}

/// Run the USB device stack - must be spawned as a dedicated Embassy task.
pub async fn run_usb_device(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    info!("USB device task started");
    device.run().await
}

/// Move queued records from the pipe to the host, one bulk packet at a time.
///
/// The port counts as open only while the host asserts DTR and keeps
/// collecting packets. Whenever it closes, queued bytes are discarded.
pub async fn serial_writer_task(mut class: CdcAcmClass<'static, UsbDriver>) -> ! {
    let mut buf = [0u8; config::SERIAL_MAX_PACKET_SIZE as usize];
    let poll = Duration::from_millis(config::SERIAL_DTR_POLL_MS);

    loop {
        close_port();
        class.wait_connection().await;
        info!("USB serial configured");

        loop {
            if !class.dtr() {
                if HOST_OPEN.load(Ordering::Relaxed) {
                    info!("USB serial port closed");
                    close_port();
                }
                Timer::after(poll).await;
                continue;
            }

            if !HOST_OPEN.load(Ordering::Relaxed) {
                SERIAL_PIPE.clear();
                HOST_OPEN.store(true, Ordering::Relaxed);
                info!("USB serial port opened");
            }

            // Bounded so a DTR drop is noticed while the pipe is idle.
            let n = match select(SERIAL_PIPE.read(&mut buf), Timer::after(poll)).await {
                Either::First(n) => n,
                Either::Second(()) => continue,
            };

            match with_timeout(
                Duration::from_millis(config::SERIAL_WRITE_TIMEOUT_MS),
                class.write_packet(&buf[..n]),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(EndpointError::Disabled)) => break,
                Ok(Err(EndpointError::BufferOverflow)) | Err(_) => {
                    debug!("USB serial host stopped reading");
                    close_port();
                }
            }
        }

        info!("USB serial deconfigured");
    }
}

/// Refuse new records and discard the backlog.
fn close_port() {
    HOST_OPEN.store(false, Ordering::Relaxed);
    SERIAL_PIPE.clear();
}

/// `RecordQueue` view of the pipe and the port state.
pub struct PipeQueue;

impl RecordQueue for PipeQueue {
    fn is_open(&self) -> bool {
        HOST_OPEN.load(Ordering::Relaxed)
    }

    fn free_capacity(&self) -> usize {
        SERIAL_PIPE.free_capacity()
    }

    fn try_write(&self, bytes: &[u8]) -> usize {
        SERIAL_PIPE.try_write(bytes).unwrap_or(0)
    }
}

/// Serial sink handed to the control loop.
pub type UsbSerialSink = QueuedSerial<PipeQueue>;
