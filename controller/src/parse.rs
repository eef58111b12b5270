use heating_common::{DayMask, DayOfWeek, SensorAddress, MINUTES_PER_DAY};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("sensor address must be 16 hex digits, got '{0}'")]
    Address(String),
    #[error("time must be hh:mm, got '{0}'")]
    Time(String),
    #[error("unknown day '{0}'")]
    Day(String),
    #[error("temperature {0} is out of range")]
    Temperature(String),
}

pub fn parse_address(raw: &str) -> Result<SensorAddress, ParseError> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | ' '))
        .collect();
    if digits.len() != SensorAddress::LEN * 2 || !digits.is_ascii() {
        return Err(ParseError::Address(raw.to_string()));
    }

    let mut bytes = [0u8; SensorAddress::LEN];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
            .map_err(|_| ParseError::Address(raw.to_string()))?;
    }
    Ok(SensorAddress(bytes))
}

pub fn parse_time(raw: &str) -> Result<u16, ParseError> {
    let invalid = || ParseError::Time(raw.to_string());
    let (hours, minutes) = raw.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u16 = hours.parse().map_err(|_| invalid())?;
    let minutes: u16 = minutes.parse().map_err(|_| invalid())?;
    if hours >= 24 || minutes >= 60 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

pub fn format_time(minutes: u16) -> String {
    let minutes = minutes % MINUTES_PER_DAY;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn parse_day(raw: &str) -> Result<DayOfWeek, ParseError> {
    let lower = raw.trim().to_ascii_lowercase();
    if let Ok(number) = lower.parse::<usize>() {
        return match number {
            1..=7 => Ok(DayOfWeek::from_index(number - 1)),
            _ => Err(ParseError::Day(raw.to_string())),
        };
    }
    (0..7)
        .map(DayOfWeek::from_index)
        .find(|day| {
            let short = day.short_name().to_ascii_lowercase();
            lower.starts_with(&short) && full_day_name(*day).starts_with(&lower)
        })
        .ok_or_else(|| ParseError::Day(raw.to_string()))
}

pub fn parse_days<S: AsRef<str>>(raw: &[S]) -> Result<DayMask, ParseError> {
    raw.iter().try_fold(DayMask::NONE, |mask, day| {
        let day = parse_day(day.as_ref())?;
        Ok(DayMask::from_bits(mask.bits() | day.bit()))
    })
}

pub fn celsius_to_tenths(celsius: f32) -> Result<i16, ParseError> {
    let tenths = (celsius * 10.0).round();
    if !tenths.is_finite() || tenths < f32::from(i16::MIN) || tenths > f32::from(i16::MAX) {
        return Err(ParseError::Temperature(celsius.to_string()));
    }
    Ok(tenths as i16)
}

pub fn parse_reading(payload: &str) -> Option<i16> {
    payload.trim().parse().ok()
}

fn full_day_name(day: DayOfWeek) -> &'static str {
    match day {
        DayOfWeek::Mon => "monday",
        DayOfWeek::Tue => "tuesday",
        DayOfWeek::Wed => "wednesday",
        DayOfWeek::Thu => "thursday",
        DayOfWeek::Fri => "friday",
        DayOfWeek::Sat => "saturday",
        DayOfWeek::Sun => "sunday",
    }
}
