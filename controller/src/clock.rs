use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use heating_common::{Clock, DayOfWeek, Timestamp, MINUTES_PER_DAY};

const MINUTES_PER_WEEK: i64 = 7 * MINUTES_PER_DAY as i64;

#[derive(Debug, Clone)]
pub struct HostClock {
    timezone: Tz,
    offset: Duration,
}

impl HostClock {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            offset: Duration::zero(),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn set_timezone(&mut self, timezone: Tz) {
        self.timezone = timezone;
    }

    pub fn offset_minutes(&self) -> i64 {
        self.offset.num_minutes()
    }

    pub fn local_now(&self) -> DateTime<Tz> {
        self.local_at(Utc::now())
    }

    pub fn set_time(&mut self, day: DayOfWeek, minutes: u16) {
        self.set_time_at(Utc::now(), day, minutes);
    }

    pub fn reset(&mut self) {
        self.offset = Duration::zero();
    }

    fn local_at(&self, utc: DateTime<Utc>) -> DateTime<Tz> {
        self.timezone.from_utc_datetime(&(utc + self.offset).naive_utc())
    }

    fn now_at(&self, utc: DateTime<Utc>) -> Timestamp {
        to_timestamp(&self.local_at(utc))
    }

    fn set_time_at(&mut self, utc: DateTime<Utc>, day: DayOfWeek, minutes: u16) {
        let system = to_timestamp(&self.timezone.from_utc_datetime(&utc.naive_utc()));
        let mut delta = week_minute(day, minutes) - week_minute_of(system);
        if delta > MINUTES_PER_WEEK / 2 {
            delta -= MINUTES_PER_WEEK;
        } else if delta < -MINUTES_PER_WEEK / 2 {
            delta += MINUTES_PER_WEEK;
        }
        self.offset = Duration::minutes(delta);
    }
}

impl Clock for HostClock {
    fn now(&self) -> Timestamp {
        self.now_at(Utc::now())
    }
}

fn to_timestamp<T: Datelike + Timelike>(local: &T) -> Timestamp {
    let minutes = local.hour() * 60 + local.minute();
    Timestamp::new(
        DayOfWeek::from_chrono(local.weekday()),
        u16::try_from(minutes).unwrap_or(0),
    )
}

fn week_minute(day: DayOfWeek, minutes: u16) -> i64 {
    day.index() as i64 * i64::from(MINUTES_PER_DAY) + i64::from(minutes)
}

fn week_minute_of(timestamp: Timestamp) -> i64 {
    let day = timestamp.weekday().unwrap_or(DayOfWeek::Mon);
    week_minute(day, timestamp.minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wednesday_noon_utc() -> DateTime<Utc> {
        // 2024-01-10 was a Wednesday.
        Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 30).unwrap()
    }

    #[test]
    fn reports_local_minute_of_week() {
        let clock = HostClock::new(chrono_tz::Europe::London);
        assert_eq!(
            clock.now_at(wednesday_noon_utc()),
            Timestamp::new(DayOfWeek::Wed, 12 * 60)
        );

        let clock = HostClock::new(chrono_tz::Asia::Tokyo);
        assert_eq!(
            clock.now_at(wednesday_noon_utc()),
            Timestamp::new(DayOfWeek::Wed, 21 * 60)
        );
    }

    #[test]
    fn set_time_moves_the_reading() {
        let utc = wednesday_noon_utc();
        let mut clock = HostClock::new(chrono_tz::Europe::London);

        clock.set_time_at(utc, DayOfWeek::Thu, 6 * 60 + 30);
        assert_eq!(clock.now_at(utc), Timestamp::new(DayOfWeek::Thu, 6 * 60 + 30));
        assert_eq!(clock.offset_minutes(), 18 * 60 + 30);

        // Later system time carries the set clock along with it.
        let later = utc + Duration::minutes(45);
        assert_eq!(clock.now_at(later), Timestamp::new(DayOfWeek::Thu, 7 * 60 + 15));
    }

    #[test]
    fn set_time_wraps_around_the_week() {
        let utc = Utc.with_ymd_and_hms(2024, 1, 14, 23, 50, 0).unwrap(); // Sunday
        let mut clock = HostClock::new(chrono_tz::UTC);

        clock.set_time_at(utc, DayOfWeek::Mon, 10);
        assert_eq!(clock.offset_minutes(), 20);
        assert_eq!(clock.now_at(utc), Timestamp::new(DayOfWeek::Mon, 10));

        clock.reset();
        assert_eq!(clock.now_at(utc), Timestamp::new(DayOfWeek::Sun, 23 * 60 + 50));
    }
}
