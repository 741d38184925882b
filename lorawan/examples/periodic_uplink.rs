//! Periodic sensor uplinks against a simulated radio
//!
//! Run with `RUST_LOG=debug` to follow the receive windows and the duty
//! cycle postponements.

use core::time::Duration;

use lorawan_mac::{
    class::{ClassA, MacEvents, SendStatus, TxOutcome},
    config::{DevAddr, DeviceConfig},
    lorawan::region::Eu868,
    radio::{Radio, RadioState, RxConfig, TxConfig},
};
use rand::{rngs::SmallRng, SeedableRng};

/// Radio that completes every transmission instantly and never hears a downlink
struct SimulatedRadio {
    state: RadioState,
}

impl Radio for SimulatedRadio {
    type Error = core::convert::Infallible;

    fn transmit(&mut self, frame: &[u8], config: TxConfig) -> Result<(), Self::Error> {
        log::info!("TX {:02X?} on {} Hz", frame, config.frequency);
        self.state = RadioState::Tx;
        Ok(())
    }

    fn configure_rx(&mut self, config: RxConfig) -> Result<(), Self::Error> {
        log::debug!("RX on {} Hz, SF{}", config.frequency, config.spreading_factor);
        Ok(())
    }

    fn standby(&mut self) -> Result<(), Self::Error> {
        self.state = RadioState::Standby;
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), Self::Error> {
        self.state = RadioState::Sleep;
        Ok(())
    }

    fn state(&self) -> RadioState {
        self.state
    }
}

struct Report;

impl MacEvents for Report {
    fn transmission_finished(&mut self, outcome: &TxOutcome<'_>) {
        log::info!(
            "uplink finished, success {} after {} transmissions",
            outcome.success,
            outcome.transmissions
        );
    }
}

// Sensor data structure
#[derive(Default)]
struct SensorData {
    temperature: i16,
    humidity: u8,
    pressure: u16,
}

impl SensorData {
    fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..2].copy_from_slice(&self.temperature.to_be_bytes());
        bytes[2] = self.humidity;
        bytes[3..5].copy_from_slice(&self.pressure.to_be_bytes());
        bytes
    }
}

fn main() {
    env_logger::init();

    let mut config = DeviceConfig::new(DevAddr(0x2601_1F42));
    config.f_port = 2;
    let radio = SimulatedRadio {
        state: RadioState::Sleep,
    };
    let mut device = ClassA::new(radio, Eu868::new(), config, SmallRng::seed_from_u64(7), Report)
        .expect("default EU868 configuration");

    let period = Duration::from_secs(30);
    let mut sensor_data = SensorData::default();
    let mut now = Duration::ZERO;
    for reading in 0..10u16 {
        sensor_data.temperature = 250 + reading as i16;
        sensor_data.humidity = 60;
        sensor_data.pressure = 1013;

        match device.send(now, &sensor_data.to_bytes()).expect("radio") {
            SendStatus::Postponed(delay) => {
                log::info!("waiting {} ms for a free channel", delay.as_millis())
            }
            SendStatus::Aborted(reason) => log::warn!("uplink dropped: {}", reason),
            SendStatus::Sent => {}
        }

        // run timers until the next reading is due
        let next_reading = now + period;
        while let Some(deadline) = device.next_deadline().filter(|d| *d <= next_reading) {
            device.handle_timers(deadline).expect("radio");
            if device.radio().state() == RadioState::Tx {
                device.on_tx_finished(deadline).expect("radio");
            }
        }
        now = next_reading;
    }
}
