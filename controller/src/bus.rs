use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use heating_common::{
    Actuators, SensorAddress, SensorBus, SensorFault, SENSOR_ERROR_PAYLOAD,
    TOPIC_CONTROLLER_BOILER, TOPIC_CONTROLLER_PUMP,
};
use rumqttc::{AsyncClient, QoS};
use tracing::warn;

use crate::parse::parse_reading;

#[derive(Debug, Clone, Copy)]
struct Reading {
    value: Result<i16, SensorFault>,
    at: Instant,
}

#[derive(Debug, Clone)]
pub struct MqttSensorBus {
    readings: Arc<Mutex<BTreeMap<SensorAddress, Reading>>>,
    stale_after: Duration,
}

impl MqttSensorBus {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            readings: Arc::new(Mutex::new(BTreeMap::new())),
            stale_after,
        }
    }

    pub fn record_payload(&self, address: SensorAddress, payload: &str) -> bool {
        let value = if payload.trim().eq_ignore_ascii_case(SENSOR_ERROR_PAYLOAD) {
            Err(SensorFault::Timeout)
        } else {
            match parse_reading(payload) {
                Some(hundredths) => Ok(hundredths),
                None => return false,
            }
        };
        self.record(address, value, Instant::now());
        true
    }

    fn record(&self, address: SensorAddress, value: Result<i16, SensorFault>, at: Instant) {
        self.lock().insert(address, Reading { value, at });
    }

    fn read_at(&self, address: &SensorAddress, now: Instant) -> Result<i16, SensorFault> {
        let readings = self.lock();
        let reading = readings.get(address).ok_or(SensorFault::NotPresent)?;
        if now.saturating_duration_since(reading.at) > self.stale_after {
            return Err(SensorFault::Stale);
        }
        reading.value
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SensorAddress, Reading>> {
        self.readings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SensorBus for MqttSensorBus {
    fn read(&mut self, address: &SensorAddress) -> Result<i16, SensorFault> {
        self.read_at(address, Instant::now())
    }

    fn search(&mut self) -> Vec<(SensorAddress, Result<i16, SensorFault>)> {
        let now = Instant::now();
        let addresses: Vec<SensorAddress> = self.lock().keys().copied().collect();
        addresses
            .into_iter()
            .map(|address| (address, self.read_at(&address, now)))
            .collect()
    }
}

// Publishing never waits: if the client queue is full the write is dropped
// and the next tick sends it again.
#[derive(Clone)]
pub struct MqttActuators {
    mqtt: AsyncClient,
}

impl MqttActuators {
    pub fn new(mqtt: AsyncClient) -> Self {
        Self { mqtt }
    }

    fn publish(&self, topic: &str, on: bool) {
        let payload = if on { "ON" } else { "OFF" };
        if let Err(err) = self
            .mqtt
            .try_publish(topic, QoS::AtLeastOnce, true, payload)
        {
            warn!("{topic} publish failed: {err}");
        }
    }
}

impl Actuators for MqttActuators {
    fn set_boiler(&mut self, on: bool) {
        self.publish(TOPIC_CONTROLLER_BOILER, on);
    }

    fn set_pump(&mut self, on: bool) {
        self.publish(TOPIC_CONTROLLER_PUMP, on);
    }
}
