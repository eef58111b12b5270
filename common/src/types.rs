use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schedule::DayOfWeek;

pub const ZONE_COUNT: usize = 10;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

// Weekday flag set. Bit 0 is reserved, bits 1..=7 are Monday..Sunday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayMask(u8);

impl DayMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0b1111_1110);
    const FIRST_DAY: u8 = 0b0000_0010;
    const LAST_DAY: u8 = 0b1000_0000;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn day(day: DayOfWeek) -> Self {
        Self(day.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 & Self::ALL.0 == 0
    }

    pub fn contains(self, day: DayOfWeek) -> bool {
        self.0 & day.bit() != 0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn next_day(self) -> Self {
        match self.0 {
            0 | Self::LAST_DAY => Self(Self::FIRST_DAY),
            bits if bits > Self::LAST_DAY => Self(Self::FIRST_DAY),
            bits => Self(bits << 1),
        }
    }

    pub fn days(self) -> impl Iterator<Item = DayOfWeek> {
        (0..7)
            .map(DayOfWeek::from_index)
            .filter(move |day| self.contains(*day))
    }
}

impl fmt::Display for DayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        let mut first = true;
        for day in self.days() {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(day.short_name())?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub day: DayMask,
    pub minutes: u16,
}

impl Timestamp {
    pub fn new(day: DayOfWeek, minutes: u16) -> Self {
        Self {
            day: DayMask::day(day),
            minutes,
        }
    }

    pub fn weekday(self) -> Option<DayOfWeek> {
        self.day.days().next()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}",
            self.day,
            self.minutes / 60,
            self.minutes % 60
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SensorAddress(pub [u8; 8]);

impl SensorAddress {
    pub const LEN: usize = 8;

    pub fn is_storable(&self) -> bool {
        self.0[0] != 0
    }
}

impl fmt::Display for SensorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub address: SensorAddress,
    pub value: i16,
    pub zone: u8,
    #[serde(rename = "lastReadOk")]
    pub last_read_ok: bool,
}

impl Sensor {
    pub fn new(address: SensorAddress, zone: u8) -> Self {
        Self {
            address,
            value: 0,
            zone,
            last_read_ok: false,
        }
    }

    pub fn value_tenths(&self) -> i16 {
        self.value / 10
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZoneState {
    #[default]
    Off,
    On,
}

impl ZoneState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    // Tenths of a degree. Volatile: driven by the schedule, never stored.
    pub setpoint: i16,
    pub hysteresis: u8,
    #[serde(rename = "spaceHeating")]
    pub space_heating: bool,
    pub state: ZoneState,
}

impl Zone {
    pub fn floor(&self) -> i16 {
        self.setpoint.saturating_sub(i16::from(self.hysteresis))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub days: DayMask,
    pub time: u16,
    pub zone: u8,
    pub setpoint: i16,
}

impl Event {
    pub fn fires_at(&self, now: Timestamp) -> bool {
        self.time == now.minutes && self.days.intersects(now.day)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorOutputs {
    pub boiler: bool,
    pub pump: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneStatus {
    pub index: usize,
    pub setpoint: f32,
    pub hysteresis: f32,
    #[serde(rename = "spaceHeating")]
    pub space_heating: bool,
    pub state: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorStatus {
    pub address: String,
    pub zone: u8,
    pub temperature: f32,
    #[serde(rename = "lastReadOk")]
    pub last_read_ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub now: Option<String>,
    #[serde(rename = "nextEvent")]
    pub next_event: String,
    pub boiler: bool,
    pub pump: bool,
    pub zones: Vec<ZoneStatus>,
    pub sensors: Vec<SensorStatus>,
    #[serde(rename = "eventCount")]
    pub event_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_day_wraps_sunday_to_monday() {
        let sunday = DayMask::day(DayOfWeek::Sun);
        assert_eq!(sunday.bits(), 0b1000_0000);
        assert_eq!(sunday.next_day(), DayMask::day(DayOfWeek::Mon));
        assert_eq!(
            DayMask::day(DayOfWeek::Mon).next_day(),
            DayMask::day(DayOfWeek::Tue)
        );
    }

    #[test]
    fn reserved_bit_alone_is_empty() {
        assert!(DayMask::from_bits(0b0000_0001).is_empty());
        assert!(!DayMask::from_bits(0b0000_0011).is_empty());
    }

    #[test]
    fn timestamps_compare_by_raw_day_bits() {
        let sunday_early = Timestamp::new(DayOfWeek::Sun, 10);
        let monday_late = Timestamp::new(DayOfWeek::Mon, 1_000);
        // Sunday carries the highest bit so it sorts after Monday.
        assert!(sunday_early > monday_late);
    }

    #[test]
    fn formats_masks_and_addresses() {
        let mask = DayMask::from_bits(0b0100_0110);
        assert_eq!(mask.to_string(), "Mon Tue Sat");
        let address = SensorAddress([0x28, 0xFF, 0x01, 0, 0, 0, 0x0A, 0x9C]);
        assert_eq!(address.to_string(), "28FF010000000A9C");
        assert_eq!(Timestamp::new(DayOfWeek::Wed, 7 * 60 + 5).to_string(), "Wed 07:05");
    }

    #[test]
    fn floor_saturates() {
        let zone = Zone {
            setpoint: i16::MIN + 5,
            hysteresis: 20,
            ..Zone::default()
        };
        assert_eq!(zone.floor(), i16::MIN);
    }
}
