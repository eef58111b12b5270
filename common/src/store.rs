//! Persistent configuration in a flat, byte-addressable image.
//!
//! Record formats (multi-byte fields big-endian):
//!
//! ```text
//! sensor  [0..8] ROM address (byte 0 == 0 ends the list)  [8] zone
//! event   [0] day mask (0 ends the list)  [1..3] minutes  [3] zone  [4..6] set-point
//! zone    [0] hysteresis  [1] 1 = space heating
//! ```
//!
//! Sensor and event regions are always contiguous from slot 0 and followed
//! by a zero leading byte, which is how a load finds the record count.
//! Every mutation here preserves that.

use tracing::{debug, info, warn};

use crate::{
    config::{StoreLayout, EVENT_RECORD_LEN, SENSOR_RECORD_LEN, ZONE_RECORD_LEN},
    error::{CoreError, RecordKind, StorageError},
    types::{
        DayMask, Event, Sensor, SensorAddress, Zone, ZoneState, MINUTES_PER_DAY, ZONE_COUNT,
    },
};

pub trait Eeprom {
    fn len(&self) -> usize;

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn check_bounds(offset: usize, len: usize, size: usize) -> Result<(), StorageError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(StorageError::OutOfBounds { offset, len, size }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEeprom {
    bytes: Vec<u8>,
}

impl MemoryEeprom {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Eeprom for MemoryEeprom {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(offset, buf.len(), self.bytes.len())?;
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(offset, data.len(), self.bytes.len())?;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub sensors: Vec<Sensor>,
    pub events: Vec<Event>,
    pub zones: [Zone; ZONE_COUNT],
}

fn encode_sensor(sensor: &Sensor) -> [u8; SENSOR_RECORD_LEN] {
    let mut record = [0u8; SENSOR_RECORD_LEN];
    record[..SensorAddress::LEN].copy_from_slice(&sensor.address.0);
    record[8] = sensor.zone;
    record
}

fn decode_sensor(record: &[u8; SENSOR_RECORD_LEN]) -> Sensor {
    let mut address = [0u8; SensorAddress::LEN];
    address.copy_from_slice(&record[..SensorAddress::LEN]);
    Sensor::new(SensorAddress(address), record[8])
}

fn encode_event(event: &Event) -> [u8; EVENT_RECORD_LEN] {
    let time = event.time.to_be_bytes();
    let setpoint = event.setpoint.to_be_bytes();
    [
        event.days.bits(),
        time[0],
        time[1],
        event.zone,
        setpoint[0],
        setpoint[1],
    ]
}

fn decode_event(record: &[u8; EVENT_RECORD_LEN]) -> Event {
    Event {
        days: DayMask::from_bits(record[0]),
        time: u16::from_be_bytes([record[1], record[2]]),
        zone: record[3],
        setpoint: i16::from_be_bytes([record[4], record[5]]),
    }
}

fn encode_zone(zone: &Zone) -> [u8; ZONE_RECORD_LEN] {
    [zone.hysteresis, u8::from(zone.space_heating)]
}

fn decode_zone(record: &[u8; ZONE_RECORD_LEN]) -> Zone {
    Zone {
        hysteresis: record[0],
        space_heating: record[1] == 1,
        ..Zone::default()
    }
}

#[derive(Debug)]
pub struct ConfigStore<E> {
    eeprom: E,
    layout: StoreLayout,
    sensors: Vec<Sensor>,
    events: Vec<Event>,
    zones: [Zone; ZONE_COUNT],
}

impl<E: Eeprom> ConfigStore<E> {
    pub fn open(eeprom: E, layout: StoreLayout) -> Result<Self, CoreError> {
        if let Err(reason) = layout.validate() {
            warn!("invalid store layout: {reason}");
            return Err(CoreError::out_of_range("layout", layout.image_len()));
        }
        if eeprom.len() < layout.image_len() {
            return Err(CoreError::StorageUnavailable {
                offset: eeprom.len(),
                source: StorageError::OutOfBounds {
                    offset: 0,
                    len: layout.image_len(),
                    size: eeprom.len(),
                },
            });
        }

        let mut store = Self {
            eeprom,
            layout,
            sensors: Vec::new(),
            events: Vec::new(),
            zones: [Zone::default(); ZONE_COUNT],
        };
        let loaded = store.load()?;
        store.sensors = loaded.sensors;
        store.events = loaded.events;
        store.zones = loaded.zones;

        info!(
            "configuration loaded: {} sensors, {} events",
            store.sensors.len(),
            store.events.len()
        );
        Ok(store)
    }

    pub fn load(&self) -> Result<LoadedConfig, CoreError> {
        let mut sensors = Vec::with_capacity(self.layout.max_sensors);
        for index in 0..self.layout.max_sensors {
            let mut record = [0u8; SENSOR_RECORD_LEN];
            self.read(self.layout.sensor_offset(index), &mut record)?;
            if record[0] == 0 {
                break;
            }
            sensors.push(decode_sensor(&record));
        }

        let mut events = Vec::with_capacity(self.layout.max_events);
        for index in 0..self.layout.max_events {
            let mut record = [0u8; EVENT_RECORD_LEN];
            self.read(self.layout.event_offset(index), &mut record)?;
            if record[0] == 0 {
                break;
            }
            events.push(decode_event(&record));
        }

        let mut zones = [Zone::default(); ZONE_COUNT];
        for (index, zone) in zones.iter_mut().enumerate() {
            let mut record = [0u8; ZONE_RECORD_LEN];
            self.read(self.layout.zone_offset(index), &mut record)?;
            *zone = decode_zone(&record);
        }

        Ok(LoadedConfig {
            sensors,
            events,
            zones,
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn eeprom(&self) -> &E {
        &self.eeprom
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn zones(&self) -> &[Zone; ZONE_COUNT] {
        &self.zones
    }

    pub(crate) fn zones_mut(&mut self) -> &mut [Zone; ZONE_COUNT] {
        &mut self.zones
    }

    pub(crate) fn tables_mut(&mut self) -> (&mut [Sensor], &[Event], &mut [Zone; ZONE_COUNT]) {
        (&mut self.sensors, &self.events, &mut self.zones)
    }

    pub fn add_sensor(&mut self, address: SensorAddress, zone: u8) -> Result<usize, CoreError> {
        if !address.is_storable() {
            return Err(CoreError::out_of_range("sensor address", address.0[0]));
        }
        if usize::from(zone) >= ZONE_COUNT {
            return Err(CoreError::out_of_range("zone", zone));
        }

        if let Some(index) = self.sensors.iter().position(|s| s.address == address) {
            debug!("updating existing sensor {address}");
            let previous = self.sensors[index].zone;
            self.sensors[index].zone = zone;
            if previous != zone {
                self.release_unfed_zone(previous);
            }
            self.persist_sensor(index)?;
            return Ok(index);
        }

        if self.sensors.len() >= self.layout.max_sensors {
            return Err(CoreError::CapacityExceeded {
                kind: RecordKind::Sensor,
                capacity: self.layout.max_sensors,
            });
        }

        let index = self.sensors.len();
        self.sensors.push(Sensor::new(address, zone));
        info!("adding sensor {address} in zone {zone}");
        self.persist_sensor(index)?;
        Ok(index)
    }

    pub fn add_event(&mut self, event: Event) -> Result<usize, CoreError> {
        if event.days.is_empty() {
            return Err(CoreError::out_of_range("event days", event.days.bits()));
        }
        if event.time >= MINUTES_PER_DAY {
            return Err(CoreError::out_of_range("event time", event.time));
        }
        if usize::from(event.zone) >= ZONE_COUNT {
            return Err(CoreError::out_of_range("zone", event.zone));
        }
        if self.events.len() >= self.layout.max_events {
            return Err(CoreError::CapacityExceeded {
                kind: RecordKind::Event,
                capacity: self.layout.max_events,
            });
        }

        let index = self.events.len();
        self.events.push(event);
        self.persist_event(index)?;
        Ok(index)
    }

    pub fn delete_event(&mut self, index: usize) -> Result<Event, CoreError> {
        if index >= self.events.len() {
            return Err(CoreError::out_of_range("event index", index));
        }

        let removed = self.events.remove(index);
        for slot in index..self.events.len() {
            self.persist_event(slot)?;
        }
        let vacated = self.layout.event_offset(self.events.len());
        self.write(vacated, &[0], "event sentinel")?;
        Ok(removed)
    }

    pub fn save_zone(&mut self, index: usize) -> Result<(), CoreError> {
        let Some(zone) = self.zones.get(index) else {
            return Err(CoreError::out_of_range("zone", index));
        };
        let record = encode_zone(zone);
        self.write(self.layout.zone_offset(index), &record, "zone")
    }

    pub fn configure_zone(
        &mut self,
        index: usize,
        hysteresis: u8,
        space_heating: bool,
    ) -> Result<(), CoreError> {
        let Some(zone) = self.zones.get_mut(index) else {
            return Err(CoreError::out_of_range("zone", index));
        };
        zone.hysteresis = hysteresis;
        zone.space_heating = space_heating;
        self.save_zone(index)
    }

    pub fn clear_all_sensors(&mut self) -> Result<(), CoreError> {
        self.sensors.clear();
        for zone in 0..ZONE_COUNT {
            self.release_unfed_zone(zone as u8);
        }
        for index in 0..self.layout.max_sensors {
            self.write(self.layout.sensor_offset(index), &[0], "sensor sentinel")?;
        }
        info!("all sensors cleared");
        Ok(())
    }

    pub fn clear_all_events(&mut self) -> Result<(), CoreError> {
        self.events.clear();
        for index in 0..self.layout.max_events {
            self.write(self.layout.event_offset(index), &[0], "event sentinel")?;
        }
        info!("all events cleared");
        Ok(())
    }

    pub fn dump(&self, row_len: usize) -> Result<Vec<Vec<u8>>, CoreError> {
        let mut image = vec![0u8; self.layout.image_len()];
        self.read(0, &mut image)?;
        Ok(image.chunks(row_len.max(1)).map(<[u8]>::to_vec).collect())
    }

    // A zone only changes state when one of its sensors is read, so a zone
    // left without sensors must stop calling for heat here.
    fn release_unfed_zone(&mut self, zone: u8) {
        if self.sensors.iter().any(|sensor| sensor.zone == zone) {
            return;
        }
        let Some(slot) = self.zones.get_mut(usize::from(zone)) else {
            return;
        };
        if slot.state.is_on() {
            info!("zone {zone} has no sensors left, switching off");
        }
        slot.state = ZoneState::Off;
    }

    fn persist_sensor(&mut self, index: usize) -> Result<(), CoreError> {
        let record = encode_sensor(&self.sensors[index]);
        self.write(self.layout.sensor_offset(index), &record, "sensor")
    }

    fn persist_event(&mut self, index: usize) -> Result<(), CoreError> {
        let record = encode_event(&self.events[index]);
        self.write(self.layout.event_offset(index), &record, "event")
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), CoreError> {
        self.eeprom
            .read(offset, buf)
            .map_err(|source| CoreError::StorageUnavailable { offset, source })
    }

    fn write(&mut self, offset: usize, data: &[u8], what: &str) -> Result<(), CoreError> {
        self.eeprom.write(offset, data).map_err(|source| {
            warn!("{what} write at offset {offset} failed, stored copy is out of date: {source}");
            CoreError::StorageUnavailable { offset, source }
        })
    }
}
