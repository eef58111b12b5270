use crate::{
    error::SensorFault,
    types::{SensorAddress, Timestamp},
};

pub trait Clock {
    fn now(&self) -> Timestamp;
}

pub trait SensorBus {
    fn read(&mut self, address: &SensorAddress) -> Result<i16, SensorFault>;

    fn search(&mut self) -> Vec<(SensorAddress, Result<i16, SensorFault>)>;
}

pub trait Actuators {
    fn set_boiler(&mut self, on: bool);

    fn set_pump(&mut self, on: bool);
}
