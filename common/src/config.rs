use serde::{Deserialize, Serialize};

use crate::types::ZONE_COUNT;

pub const SENSOR_RECORD_LEN: usize = 9;
pub const EVENT_RECORD_LEN: usize = 6;
pub const ZONE_RECORD_LEN: usize = 2;

/// Where each record region lives in the persistent byte image.
///
/// Sensor and event regions have no stored count: a load scans until the
/// first record whose leading byte is zero. The defaults reproduce the
/// firmware image byte for byte.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreLayout {
    pub sensor_base: usize,
    pub sensor_stride: usize,
    pub max_sensors: usize,
    pub zone_base: usize,
    pub zone_stride: usize,
    pub event_base: usize,
    pub event_stride: usize,
    pub max_events: usize,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            sensor_base: 0,
            sensor_stride: 10,
            max_sensors: 10,
            zone_base: 100,
            zone_stride: 2,
            event_base: 200,
            event_stride: 10,
            max_events: 100,
        }
    }
}

impl StoreLayout {
    pub fn sensor_offset(&self, index: usize) -> usize {
        self.sensor_base + index * self.sensor_stride
    }

    pub fn zone_offset(&self, index: usize) -> usize {
        self.zone_base + index * self.zone_stride
    }

    pub fn event_offset(&self, index: usize) -> usize {
        self.event_base + index * self.event_stride
    }

    fn regions(&self) -> [(&'static str, usize, usize); 3] {
        [
            ("sensor", self.sensor_base, self.max_sensors * self.sensor_stride),
            ("zone", self.zone_base, ZONE_COUNT * self.zone_stride),
            ("event", self.event_base, self.max_events * self.event_stride),
        ]
    }

    pub fn image_len(&self) -> usize {
        self.regions()
            .iter()
            .map(|(_, base, len)| base + len)
            .max()
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sensor_stride < SENSOR_RECORD_LEN {
            return Err(format!(
                "sensor stride {} is shorter than a {SENSOR_RECORD_LEN}-byte record",
                self.sensor_stride
            ));
        }
        if self.zone_stride < ZONE_RECORD_LEN {
            return Err(format!(
                "zone stride {} is shorter than a {ZONE_RECORD_LEN}-byte record",
                self.zone_stride
            ));
        }
        if self.event_stride < EVENT_RECORD_LEN {
            return Err(format!(
                "event stride {} is shorter than a {EVENT_RECORD_LEN}-byte record",
                self.event_stride
            ));
        }
        if self.max_sensors > usize::from(u8::MAX) || self.max_events > usize::from(u8::MAX) {
            return Err("sensor and event capacities are limited to 255".to_string());
        }

        let regions = self.regions();
        for (i, &(name_a, base_a, len_a)) in regions.iter().enumerate() {
            for &(name_b, base_b, len_b) in &regions[i + 1..] {
                if base_a < base_b + len_b && base_b < base_a + len_a {
                    return Err(format!("{name_a} region overlaps {name_b} region"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub layout: StoreLayout,
    pub timezone: String,
    #[serde(default)]
    pub network: NetworkConfig,
    pub http_port: u16,
    pub sensor_stale_timeout_secs: u64,
    pub state_publish_interval_secs: u64,
    #[serde(default = "default_restore_setpoints")]
    pub restore_setpoints_on_boot: bool,
}

fn default_restore_setpoints() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            layout: StoreLayout::default(),
            timezone: "Europe/London".to_string(),
            network: NetworkConfig::default(),
            http_port: 8080,
            sensor_stale_timeout_secs: 180,
            state_publish_interval_secs: 10,
            restore_setpoints_on_boot: default_restore_setpoints(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.sensor_stale_timeout_secs = self.sensor_stale_timeout_secs.clamp(60, 3_600);
        self.state_publish_interval_secs = self.state_publish_interval_secs.clamp(1, 300);
        if self.http_port == 0 {
            self.http_port = 8080;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_matches_firmware_image() {
        let layout = StoreLayout::default();
        assert!(layout.validate().is_ok());
        assert_eq!(layout.sensor_offset(3), 30);
        assert_eq!(layout.zone_offset(9), 118);
        assert_eq!(layout.event_offset(99), 1_190);
        assert_eq!(layout.image_len(), 1_200);
    }

    #[test]
    fn rejects_overlapping_regions() {
        let layout = StoreLayout {
            zone_base: 1_100,
            ..StoreLayout::default()
        };
        let err = layout.validate().unwrap_err();
        assert!(err.contains("overlaps"), "{err}");
    }

    #[test]
    fn rejects_short_strides() {
        let layout = StoreLayout {
            event_stride: 4,
            ..StoreLayout::default()
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn partial_runtime_config_fills_defaults() {
        let raw = r#"{
            "timezone": "Europe/Paris",
            "http_port": 9000,
            "sensor_stale_timeout_secs": 5,
            "state_publish_interval_secs": 10
        }"#;
        let mut config: RuntimeConfig = serde_json::from_str(raw).unwrap();
        config.sanitize();

        assert_eq!(config.layout, StoreLayout::default());
        assert_eq!(config.network.mqtt_port, 1883);
        assert!(config.restore_setpoints_on_boot);
        assert_eq!(config.sensor_stale_timeout_secs, 60);
    }
}
