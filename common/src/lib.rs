pub mod config;
pub mod engine;
pub mod error;
pub mod ports;
pub mod schedule;
pub mod store;
pub mod topics;
pub mod types;
pub mod zone;

pub use config::{NetworkConfig, RuntimeConfig, StoreLayout};
pub use engine::{ControlCore, TickReport};
pub use error::{CoreError, RecordKind, SensorFault, StorageError};
pub use ports::{Actuators, Clock, SensorBus};
pub use schedule::{DayOfWeek, Scheduler};
pub use store::{ConfigStore, Eeprom, LoadedConfig, MemoryEeprom};
pub use topics::*;
pub use types::{
    ActuatorOutputs, ControllerStatus, DayMask, Event, Sensor, SensorAddress, Timestamp, Zone,
    ZoneState, MINUTES_PER_DAY, ZONE_COUNT,
};
pub use zone::ZoneController;
