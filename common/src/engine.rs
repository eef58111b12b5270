use tracing::{info, warn};

use crate::{
    config::StoreLayout,
    error::CoreError,
    ports::{Actuators, SensorBus},
    schedule::Scheduler,
    store::{ConfigStore, Eeprom},
    types::{
        ActuatorOutputs, ControllerStatus, Event, Sensor, SensorAddress, SensorStatus, Timestamp,
        Zone, ZoneStatus, ZONE_COUNT,
    },
    zone::ZoneController,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub outputs: ActuatorOutputs,
    pub applied_events: Vec<usize>,
    pub sensor_failures: Vec<CoreError>,
}

#[derive(Debug)]
pub struct ControlCore<E> {
    store: ConfigStore<E>,
    scheduler: Scheduler,
    outputs: ActuatorOutputs,
    last_tick: Option<Timestamp>,
}

impl<E: Eeprom> ControlCore<E> {
    pub fn open(eeprom: E, layout: StoreLayout) -> Result<Self, CoreError> {
        Ok(Self {
            store: ConfigStore::open(eeprom, layout)?,
            scheduler: Scheduler::new(),
            outputs: ActuatorOutputs::default(),
            last_tick: None,
        })
    }

    pub fn store(&self) -> &ConfigStore<E> {
        &self.store
    }

    pub fn sensors(&self) -> &[Sensor] {
        self.store.sensors()
    }

    pub fn events(&self) -> &[Event] {
        self.store.events()
    }

    pub fn zones(&self) -> &[Zone; ZONE_COUNT] {
        self.store.zones()
    }

    pub fn next_event(&self) -> Timestamp {
        self.scheduler.next_event()
    }

    pub fn outputs(&self) -> ActuatorOutputs {
        self.outputs
    }

    pub fn last_tick(&self) -> Option<Timestamp> {
        self.last_tick
    }

    pub fn tick<B, A>(&mut self, now: Timestamp, bus: &mut B, actuators: &mut A) -> TickReport
    where
        B: SensorBus + ?Sized,
        A: Actuators + ?Sized,
    {
        self.last_tick = Some(now);
        let applied_events = self.process_schedule(now);

        let mut sensor_failures = Vec::new();
        let (sensors, _, zones) = self.store.tables_mut();
        for sensor in sensors.iter_mut() {
            match bus.read(&sensor.address) {
                Ok(value) => {
                    sensor.value = value;
                    sensor.last_read_ok = true;
                }
                Err(fault) => {
                    warn!("sensor {} read failed: {fault}", sensor.address);
                    sensor.last_read_ok = false;
                    sensor_failures.push(CoreError::SensorReadFailure {
                        address: sensor.address,
                        fault,
                    });
                    continue;
                }
            }

            // Several sensors may feed one zone; the last one read wins.
            let Some(zone) = zones.get_mut(usize::from(sensor.zone)) else {
                continue;
            };
            if ZoneController::update(zone, sensor.value_tenths()) {
                info!(
                    "zone {} now {} (reading {}, set-point {})",
                    sensor.zone,
                    zone.state.as_str(),
                    sensor.value_tenths(),
                    zone.setpoint
                );
            }
        }

        let outputs = ZoneController::aggregate(zones.as_slice());
        if outputs != self.outputs {
            info!("boiler {} pump {}", on_off(outputs.boiler), on_off(outputs.pump));
        }
        self.outputs = outputs;
        actuators.set_boiler(outputs.boiler);
        actuators.set_pump(outputs.pump);

        TickReport {
            outputs,
            applied_events,
            sensor_failures,
        }
    }

    pub fn process_schedule(&mut self, now: Timestamp) -> Vec<usize> {
        let (_, events, zones) = self.store.tables_mut();
        self.scheduler.process(now, events, zones.as_mut_slice())
    }

    pub fn restore_setpoints(&mut self, now: Timestamp) -> usize {
        let (_, events, zones) = self.store.tables_mut();
        let restored = self
            .scheduler
            .restore_setpoints(now, events, zones.as_mut_slice());
        info!("restored {restored} zone set-points from schedule at {now}");
        restored
    }

    // The wall clock was moved: adopt the new time at once rather than at
    // the next tick.
    pub fn clock_changed(&mut self, now: Timestamp) -> Vec<usize> {
        self.last_tick = Some(now);
        self.process_schedule(now)
    }

    pub fn add_sensor(&mut self, address: SensorAddress, zone: u8) -> Result<usize, CoreError> {
        self.store.add_sensor(address, zone)
    }

    pub fn clear_sensors(&mut self) -> Result<(), CoreError> {
        self.store.clear_all_sensors()
    }

    pub fn add_event(&mut self, event: Event) -> Result<usize, CoreError> {
        let result = self.store.add_event(event);
        self.refresh_schedule();
        result
    }

    pub fn delete_event(&mut self, index: usize) -> Result<Event, CoreError> {
        let result = self.store.delete_event(index);
        self.refresh_schedule();
        result
    }

    pub fn clear_events(&mut self) -> Result<(), CoreError> {
        let result = self.store.clear_all_events();
        self.scheduler.reset();
        self.refresh_schedule();
        result
    }

    pub fn configure_zone(
        &mut self,
        index: usize,
        hysteresis: u8,
        space_heating: bool,
    ) -> Result<(), CoreError> {
        self.store.configure_zone(index, hysteresis, space_heating)
    }

    pub fn set_setpoint(&mut self, index: usize, setpoint: i16) -> Result<(), CoreError> {
        let Some(zone) = self.store.zones_mut().get_mut(index) else {
            return Err(CoreError::out_of_range("zone", index));
        };
        zone.setpoint = setpoint;
        Ok(())
    }

    pub fn dump(&self, row_len: usize) -> Result<Vec<Vec<u8>>, CoreError> {
        self.store.dump(row_len)
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            now: self.last_tick.map(|now| now.to_string()),
            next_event: self.scheduler.next_event().to_string(),
            boiler: self.outputs.boiler,
            pump: self.outputs.pump,
            zones: self
                .zones()
                .iter()
                .enumerate()
                .map(|(index, zone)| ZoneStatus {
                    index,
                    setpoint: f32::from(zone.setpoint) / 10.0,
                    hysteresis: f32::from(zone.hysteresis) / 10.0,
                    space_heating: zone.space_heating,
                    state: zone.state.as_str(),
                })
                .collect(),
            sensors: self
                .sensors()
                .iter()
                .map(|sensor| SensorStatus {
                    address: sensor.address.to_string(),
                    zone: sensor.zone,
                    temperature: f32::from(sensor.value) / 100.0,
                    last_read_ok: sensor.last_read_ok,
                })
                .collect(),
            event_count: self.events().len(),
        }
    }

    fn refresh_schedule(&mut self) {
        if let Some(now) = self.last_tick {
            self.process_schedule(now);
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}
