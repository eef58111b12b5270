pub const TOPIC_SENSOR_PREFIX: &str = "heating/sensor";
pub const TOPIC_SENSOR_TEMP_FILTER: &str = "heating/sensor/+/temperature";
pub const TOPIC_SENSOR_STATUS: &str = "heating/sensor/status";

pub const TOPIC_CONTROLLER_STATE: &str = "heating/controller/state";
pub const TOPIC_CONTROLLER_BOILER: &str = "heating/controller/boiler";
pub const TOPIC_CONTROLLER_PUMP: &str = "heating/controller/pump";

pub const SENSOR_ERROR_PAYLOAD: &str = "error";

pub fn sensor_temperature_topic(address: &str) -> String {
    format!("{TOPIC_SENSOR_PREFIX}/{address}/temperature")
}

pub fn sensor_address_from_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(TOPIC_SENSOR_PREFIX)?
        .strip_prefix('/')?
        .strip_suffix("/temperature")
        .filter(|address| !address.is_empty() && !address.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_topics_round_trip_address() {
        let topic = sensor_temperature_topic("28FF010000000A9C");
        assert_eq!(topic, "heating/sensor/28FF010000000A9C/temperature");
        assert_eq!(sensor_address_from_topic(&topic), Some("28FF010000000A9C"));
        assert_eq!(sensor_address_from_topic("heating/sensor/status"), None);
        assert_eq!(sensor_address_from_topic("heating/sensor//temperature"), None);
    }
}
