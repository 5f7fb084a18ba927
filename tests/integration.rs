//! Integration tests for exg-stream host-testable logic.
//!
//! A scripted voltage source drives the full acquire → dispatch cycle;
//! the output is checked the way a receiver would see it.

use std::collections::VecDeque;

use embassy_futures::block_on;
use exg_stream::adc::ad7124::AdcConfig;
use exg_stream::adc::VoltageSource;
use exg_stream::config;
use exg_stream::decode::{decode_payload, SerialFrameDecoder};
use exg_stream::error::{AcquisitionFault, Error, TransportFault};
use exg_stream::rate::measure_sample_rate;
use exg_stream::supervisor::{Action, Supervisor};
use exg_stream::{Acquisition, Dispatcher, PacketSink, Pipeline, SerialSink, BATCH_PAYLOAD_SIZE};

/// Plays back a fixed script of readings and faults.
#[derive(Default)]
struct Script {
    readings: VecDeque<Result<f32, AcquisitionFault>>,
    configured: usize,
}

impl Script {
    fn of(values: &[f32]) -> Self {
        Self {
            readings: values.iter().map(|&v| Ok(v)).collect(),
            configured: 0,
        }
    }
}

impl VoltageSource for Script {
    async fn configure(&mut self, _config: &AdcConfig) -> Result<(), Error> {
        self.configured += 1;
        Ok(())
    }

    async fn read_voltage(&mut self, channel: u8) -> Result<f32, Error> {
        assert_eq!(channel, config::ADC_CHANNEL);
        match self.readings.pop_front() {
            Some(Ok(v)) => Ok(v),
            Some(Err(f)) => Err(f.into()),
            None => Err(AcquisitionFault::Timeout.into()),
        }
    }
}

#[derive(Default)]
struct Wire(Vec<u8>);

impl SerialSink for Wire {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.0.extend_from_slice(bytes);
        Ok(())
    }
}

#[derive(Default)]
struct Air {
    packets: Vec<[u8; BATCH_PAYLOAD_SIZE]>,
    /// Refuse every packet, like a link with a stuck notification queue.
    refuse: bool,
}

impl PacketSink for Air {
    fn send_packet(&mut self, payload: &[u8; BATCH_PAYLOAD_SIZE]) -> Result<(), Error> {
        if self.refuse {
            return Err(TransportFault::NotifyFailed.into());
        }
        self.packets.push(*payload);
        Ok(())
    }
}

fn pipeline(source: Script, air: Air) -> Pipeline<Script, Wire, Air> {
    Pipeline::new(
        Acquisition::new(source, config::ADC_CHANNEL),
        Dispatcher::new(Wire::default(), air),
    )
}

#[test]
fn serial_and_ble_carry_the_same_samples() {
    let values: Vec<f32> = (0..12).map(|i| 0.001 * i as f32 - 0.004).collect();
    let mut p = pipeline(Script::of(&values), Air::default());

    for _ in 0..values.len() {
        block_on(p.step()).unwrap();
    }

    let (wire, air) = p.dispatcher.into_sinks();

    let mut decoder = SerialFrameDecoder::new();
    let from_serial: Vec<f32> = wire.0.iter().filter_map(|&b| decoder.push(b)).collect();
    assert_eq!(from_serial, values);

    let from_ble: Vec<f32> = air
        .packets
        .iter()
        .flat_map(|p| decode_payload(p).unwrap())
        .collect();
    assert_eq!(from_ble, values[..10]);
}

#[test]
fn acquisition_fault_skips_only_that_sample() {
    let mut source = Script::of(&[1.0, 2.0]);
    source.readings.push_back(Err(AcquisitionFault::Timeout));
    source.readings.extend([Ok(3.0), Ok(4.0), Ok(5.0)]);
    let mut p = pipeline(source, Air::default());

    let results: Vec<_> = (0..6).map(|_| block_on(p.step())).collect();
    assert_eq!(
        results[2],
        Err(Error::Acquisition(AcquisitionFault::Timeout))
    );
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);

    let (wire, air) = p.dispatcher.into_sinks();
    assert_eq!(wire.0.len(), 5 * 5);
    assert_eq!(
        decode_payload(&air.packets[0]),
        Some([1.0, 2.0, 3.0, 4.0, 5.0])
    );
}

#[test]
fn refused_notifications_do_not_stall_serial() {
    let values = [0.5f32; 10];
    let air = Air {
        refuse: true,
        ..Default::default()
    };
    let mut p = pipeline(Script::of(&values), air);

    let faults = (0..10)
        .filter_map(|_| block_on(p.step()).unwrap().fault)
        .count();
    assert_eq!(faults, 2);
    assert_eq!(p.dispatcher.batcher().fill(), 0);

    let (wire, _) = p.dispatcher.into_sinks();
    assert_eq!(wire.0.len(), 10 * 5);
}

#[test]
fn supervisor_reinitialises_a_silent_adc() {
    let mut source = Script::of(&[0.1]);
    for _ in 0..config::ADC_REINIT_AFTER_FAULTS {
        source.readings.push_back(Err(AcquisitionFault::Bus));
    }
    source.readings.push_back(Ok(0.2));
    let mut p = pipeline(source, Air::default());
    let mut supervisor = Supervisor::new(config::ADC_REINIT_AFTER_FAULTS);

    // The same loop the firmware runs, bounded.
    let mut delivered = 0;
    for _ in 0..(config::ADC_REINIT_AFTER_FAULTS + 2) {
        match block_on(p.step()) {
            Ok(_) => {
                supervisor.on_sample();
                delivered += 1;
            }
            Err(e) => {
                if supervisor.on_fault(&e) == Action::ReinitAdc {
                    block_on(p.acquisition.reinitialize(&config::ADC_CONFIG)).unwrap();
                }
            }
        }
    }

    assert_eq!(delivered, 2);
    assert_eq!(supervisor.reinits(), 1);
    assert_eq!(p.acquisition.source_mut().configured, 1);
}

#[test]
fn rate_test_reports_on_the_serial_stream() {
    let values = [0.25f32; 40];
    let mut p = pipeline(Script::of(&values), Air::default());

    // Each clock read advances 10 ms; the loop reads once per step.
    let mut t = 0u64;
    let report = block_on(measure_sample_rate(&mut p, 200, || {
        let now = t;
        t += 10;
        now
    }))
    .unwrap();

    assert_eq!(report.samples, 19);
    assert_eq!(report.faults, 0);

    let (wire, air) = p.dispatcher.into_sinks();
    let text = b"Achieved sample rate: 95.00 samples per second\r\n";
    assert!(wire.0.ends_with(text));
    assert_eq!(wire.0.len(), 19 * 5 + text.len());
    assert_eq!(air.packets.len(), 3);
}
