//! GATT server, advertising loop and batch notifier.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use defmt::{info, warn};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Timer};
use exg_stream::batch::BATCH_PAYLOAD_SIZE;
use exg_stream::config;
use exg_stream::dispatch::PacketSink;
use exg_stream::error::{Error, TransportFault};
use nrf_softdevice::ble::advertisement_builder::{
    Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload, ServiceList,
};
use nrf_softdevice::ble::{gatt_server, peripheral, Connection};
use nrf_softdevice::Softdevice;

#[nrf_softdevice::gatt_service(uuid = "0029d054-23d0-4c58-a199-c6bdc16c4975")]
pub struct AdcService {
    /// Five little-endian f32 samples, oldest first.
    #[characteristic(uuid = "20a4a273-c214-4c18-b433-329f30ef7275", read, notify)]
    pub samples: [u8; 20],
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    pub adc: AdcService,
}

/// Flags (3 bytes) + complete 128-bit service list (18 bytes).
static ADV_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
    .services_128(ServiceList::Complete, &[config::BLE_ADC_SERVICE_UUID_LE])
    .build();

static SCAN_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .full_name(config::BLE_DEVICE_NAME)
    .build();

/// The connected central, if any.
static CONNECTION: Mutex<CriticalSectionRawMutex, RefCell<Option<Connection>>> =
    Mutex::new(RefCell::new(None));

/// Set when the central enables notifications on the samples CCCD.
static SUBSCRIBED: AtomicBool = AtomicBool::new(false);

fn set_connection(conn: Option<Connection>) {
    CONNECTION.lock(|c| *c.borrow_mut() = conn);
}

/// Advertise, serve one central until it disconnects, repeat.
///
/// Must be spawned as a dedicated Embassy task after the SoftDevice is
/// enabled and `Server::new` has registered the service.
pub async fn advertise_loop(sd: &'static Softdevice, server: &'static Server) -> ! {
    let adv_config = peripheral::Config {
        interval: config::BLE_ADV_INTERVAL,
        ..Default::default()
    };

    loop {
        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &ADV_DATA,
            scan_data: &SCAN_DATA,
        };

        let conn = match peripheral::advertise_connectable(sd, adv, &adv_config).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("BLE advertising failed: {:?}", e);
                Timer::after(Duration::from_millis(500)).await;
                continue;
            }
        };

        info!("BLE central connected");
        set_connection(Some(conn.clone()));

        let reason = gatt_server::run(&conn, server, |event| match event {
            ServerEvent::Adc(AdcServiceEvent::SamplesCccdWrite { notifications }) => {
                info!("BLE sample notifications: {}", notifications);
                SUBSCRIBED.store(notifications, Ordering::Relaxed);
            }
        })
        .await;

        SUBSCRIBED.store(false, Ordering::Relaxed);
        set_connection(None);
        info!("BLE central disconnected: {:?}", reason);
    }
}

/// `PacketSink` backed by the samples characteristic.
pub struct BleNotifier {
    server: &'static Server,
}

impl BleNotifier {
    pub fn new(server: &'static Server) -> Self {
        Self { server }
    }
}

impl PacketSink for BleNotifier {
    fn send_packet(&mut self, payload: &[u8; BATCH_PAYLOAD_SIZE]) -> Result<(), Error> {
        self.server
            .adc
            .samples_set(payload)
            .map_err(|_| TransportFault::SetValueFailed)?;

        if !SUBSCRIBED.load(Ordering::Relaxed) {
            return Ok(());
        }

        let conn = CONNECTION.lock(|c| c.borrow().clone());
        if let Some(conn) = conn {
            self.server
                .adc
                .samples_notify(&conn, payload)
                .map_err(|_| TransportFault::NotifyFailed)?;
        }
        Ok(())
    }
}
