use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use error_stack::{Report, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::Duration;

use log::debug;

use crate::channel::{
    Ack, BusController, Capabilities, ChannelId, ChannelReport, Field, TemperatureRange,
    ThermostatChannel, WireValue,
};
use crate::error::TransportError;

#[derive(Debug, Default)]
struct SimulatedDevice {
    readings: HashMap<Field, WireValue>,
    sent: Vec<(Field, WireValue)>,
    failures: VecDeque<TransportError>,
    in_flight: usize,
    max_in_flight: usize,
    subscribers: Vec<Sender<ChannelReport>>,
}

/// In-memory thermostat channel. Every `set_value` is recorded as a frame put on the bus.
#[derive(Debug)]
pub struct SimulatedChannel {
    id: ChannelId,
    name: String,
    capabilities: Capabilities,
    range: TemperatureRange,
    latency: Duration,
    device: Mutex<SimulatedDevice>,
}

impl SimulatedChannel {
    pub fn new(id: ChannelId, name: impl Into<String>) -> Self {
        SimulatedChannel {
            id,
            name: name.into(),
            capabilities: Capabilities::thermostat(),
            range: TemperatureRange::default(),
            latency: Duration::ZERO,
            device: Mutex::new(SimulatedDevice::default()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_range(mut self, range: TemperatureRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_reading(self, field: Field, value: WireValue) -> Self {
        self.device().readings.insert(field, value);
        self
    }

    /// The next `set_value` fails with `error` after the usual latency.
    pub fn fail_next(&self, error: TransportError) {
        self.device().failures.push_back(error);
    }

    /// Emit an unsolicited report to every subscriber.
    pub fn push(&self, field: Field, value: Option<WireValue>) {
        let mut device = self.device();
        match value {
            Some(value) => device.readings.insert(field, value),
            None => device.readings.remove(&field),
        };

        let report = ChannelReport { field, value };
        device
            .subscribers
            .retain(|subscriber| subscriber.try_send(report.clone()).is_ok());
    }

    pub fn sent(&self) -> Vec<(Field, WireValue)> {
        self.device().sent.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.device().max_in_flight
    }

    fn device(&self) -> MutexGuard<'_, SimulatedDevice> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ThermostatChannel for SimulatedChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn temperature_range(&self) -> TemperatureRange {
        self.range
    }

    fn current_reading(&self, field: Field) -> Option<WireValue> {
        self.device().readings.get(&field).copied()
    }

    async fn set_value(&self, field: Field, value: WireValue) -> Result<Ack, TransportError> {
        let failure = {
            let mut device = self.device();
            device.in_flight += 1;
            device.max_in_flight = device.max_in_flight.max(device.in_flight);
            device.sent.push((field, value));
            device.failures.pop_front()
        };

        debug!("Channel {} sending {} = {:?}", self.id, field, value);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut device = self.device();
        device.in_flight -= 1;

        if let Some(error) = failure {
            return Err(Report::new(error).attach_printable(format!("Channel {}", self.id)));
        }

        device.readings.insert(field, value);
        Ok(Ack)
    }

    fn subscribe(&self) -> Receiver<ChannelReport> {
        let (tx, rx) = async_channel::unbounded();
        self.device().subscribers.push(tx);
        rx
    }
}

/// Bus controller over a fixed set of simulated channels.
pub struct SimulatedBus {
    channels: Vec<Arc<SimulatedChannel>>,
    scan_done: watch::Sender<bool>,
}

impl SimulatedBus {
    pub fn new(channels: Vec<Arc<SimulatedChannel>>) -> Self {
        SimulatedBus {
            channels,
            scan_done: watch::Sender::new(false),
        }
    }

    pub fn ready_signal(&self) -> watch::Receiver<bool> {
        self.scan_done.subscribe()
    }

    pub fn finish_scan(&self) {
        self.scan_done.send_replace(true);
    }

    pub fn channels(&self) -> &[Arc<SimulatedChannel>] {
        &self.channels
    }
}

impl BusController for SimulatedBus {
    fn climate_channels(&self) -> Vec<Arc<dyn ThermostatChannel>> {
        self.channels
            .iter()
            .map(|channel| channel.clone() as Arc<dyn ThermostatChannel>)
            .collect()
    }
}

/// Pushes a slowly drifting current temperature on every channel, the way a real bus reports sensors.
pub async fn report_worker(period: Duration, channels: Vec<Arc<SimulatedChannel>>) {
    let mut tick: u32 = 0;
    loop {
        tokio::time::sleep(period).await;
        tick = tick.wrapping_add(1);

        for channel in &channels {
            let base = match channel.current_reading(Field::TargetTemperature) {
                Some(WireValue::Temperature(target)) => target,
                _ => 20.0,
            };
            let offset = ((tick % 5) as f32 - 2.0) * 0.5;
            channel.push(Field::CurrentTemperature, Some(WireValue::Temperature(base + offset)));
        }
    }
}
