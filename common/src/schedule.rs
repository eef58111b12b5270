use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{DayMask, Event, Timestamp, Zone, MINUTES_PER_DAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub fn index(self) -> usize {
        match self {
            Self::Mon => 0,
            Self::Tue => 1,
            Self::Wed => 2,
            Self::Thu => 3,
            Self::Fri => 4,
            Self::Sat => 5,
            Self::Sun => 6,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index % 7 {
            0 => Self::Mon,
            1 => Self::Tue,
            2 => Self::Wed,
            3 => Self::Thu,
            4 => Self::Fri,
            5 => Self::Sat,
            _ => Self::Sun,
        }
    }

    pub fn from_chrono(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Mon,
            Weekday::Tue => Self::Tue,
            Weekday::Wed => Self::Wed,
            Weekday::Thu => Self::Thu,
            Weekday::Fri => Self::Fri,
            Weekday::Sat => Self::Sat,
            Weekday::Sun => Self::Sun,
        }
    }

    pub fn bit(self) -> u8 {
        1 << (self.index() + 1)
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Self::Mon => "Mon",
            Self::Tue => "Tue",
            Self::Wed => "Wed",
            Self::Thu => "Thu",
            Self::Fri => "Fri",
            Self::Sat => "Sat",
            Self::Sun => "Sun",
        }
    }
}

/// Tracks the next scheduled set-point change and applies events as their
/// minute comes round.
///
/// The look-ahead never goes past the end of today: when nothing else is due
/// today the next event is reported as minute 0 of the following day, whether
/// or not that day has any events. Running [`Scheduler::process`] every minute
/// corrects this within a day.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    next_event: Timestamp,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_event(&self) -> Timestamp {
        self.next_event
    }

    pub fn reset(&mut self) {
        self.next_event = Timestamp::default();
    }

    pub fn process(
        &mut self,
        now: Timestamp,
        events: &[Event],
        zones: &mut [Zone],
    ) -> Vec<usize> {
        let mut applied = Vec::new();
        let mut next_minutes: Option<u16> = None;

        for (index, event) in events.iter().enumerate() {
            if event.fires_at(now) {
                if let Some(zone) = zones.get_mut(usize::from(event.zone)) {
                    zone.setpoint = event.setpoint;
                    applied.push(index);
                    info!(
                        "event {index} applied: zone {} set-point {}",
                        event.zone, event.setpoint
                    );
                }
            } else if event.days.intersects(now.day)
                && event.time > now.minutes
                && next_minutes.map(|best| event.time < best).unwrap_or(true)
            {
                next_minutes = Some(event.time);
            }
        }

        self.next_event = match next_minutes {
            Some(minutes) => Timestamp {
                day: now.day,
                minutes,
            },
            None => Timestamp {
                day: now.day.next_day(),
                minutes: 0,
            },
        };

        applied
    }

    pub fn restore_setpoints(
        &self,
        now: Timestamp,
        events: &[Event],
        zones: &mut [Zone],
    ) -> usize {
        let Some(today) = now.weekday() else {
            return 0;
        };

        let mut restored = 0;
        for (zone_index, zone) in zones.iter_mut().enumerate() {
            // Seven days back is today's weekday again, for events later than now.
            let latest = (0..=7usize).find_map(|days_back| {
                let day = DayOfWeek::from_index(today.index() + 7 - days_back);
                let cutoff = if days_back == 0 {
                    now.minutes
                } else {
                    MINUTES_PER_DAY
                };
                events
                    .iter()
                    .filter(|event| {
                        usize::from(event.zone) == zone_index
                            && event.days.contains(day)
                            && event.time <= cutoff
                    })
                    .max_by_key(|event| event.time)
            });

            if let Some(event) = latest {
                zone.setpoint = event.setpoint;
                restored += 1;
            }
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ZONE_COUNT;

    fn event(days: u8, time: u16, zone: u8, setpoint: i16) -> Event {
        Event {
            days: DayMask::from_bits(days),
            time,
            zone,
            setpoint,
        }
    }

    fn zones() -> Vec<Zone> {
        vec![Zone::default(); ZONE_COUNT]
    }

    #[test]
    fn applies_event_on_its_minute_then_rolls_to_tomorrow() {
        let events = [event(0b0000_0010, 420, 1, 210)];
        let mut zones = zones();
        let mut scheduler = Scheduler::new();

        let now = Timestamp::new(DayOfWeek::Mon, 420);
        let applied = scheduler.process(now, &events, &mut zones);
        assert_eq!(applied, vec![0]);
        assert_eq!(zones[1].setpoint, 210);

        zones[1].setpoint = 150;
        let now = Timestamp::new(DayOfWeek::Mon, 421);
        let applied = scheduler.process(now, &events, &mut zones);
        assert!(applied.is_empty());
        assert_eq!(zones[1].setpoint, 150);
        assert_eq!(scheduler.next_event(), Timestamp::new(DayOfWeek::Tue, 0));
    }

    #[test]
    fn picks_earliest_later_event_today() {
        let events = [
            event(DayMask::ALL.bits(), 1_080, 2, 180),
            event(0b0000_1000, 600, 2, 200),
            event(0b0000_1000, 300, 2, 190),
        ];
        let mut zones = zones();
        let mut scheduler = Scheduler::new();

        scheduler.process(Timestamp::new(DayOfWeek::Wed, 400), &events, &mut zones);
        assert_eq!(scheduler.next_event(), Timestamp::new(DayOfWeek::Wed, 600));
    }

    #[test]
    fn ignores_events_for_other_days_and_missing_zones() {
        let events = [
            event(0b0000_0100, 420, 1, 210),
            event(0b0000_0010, 420, 42, 190),
        ];
        let mut zones = zones();
        let mut scheduler = Scheduler::new();

        let now = Timestamp::new(DayOfWeek::Mon, 420);
        let applied = scheduler.process(now, &events, &mut zones);
        assert!(applied.is_empty());
        assert!(zones.iter().all(|zone| zone.setpoint == 0));
    }

    #[test]
    fn sunday_rolls_over_to_monday() {
        let mut zones = zones();
        let mut scheduler = Scheduler::new();
        scheduler.process(Timestamp::new(DayOfWeek::Sun, 1_439), &[], &mut zones);
        assert_eq!(scheduler.next_event(), Timestamp::new(DayOfWeek::Mon, 0));
    }

    #[test]
    fn restores_latest_event_across_days() {
        let events = [
            event(DayMask::day(DayOfWeek::Sun).bits(), 23 * 60, 1, 170),
            event(DayMask::day(DayOfWeek::Mon).bits(), 9 * 60, 1, 210),
            event(DayMask::day(DayOfWeek::Mon).bits(), 6 * 60, 0, 550),
        ];
        let mut zones = zones();
        let scheduler = Scheduler::new();

        // Monday 08:00: zone 1 still follows Sunday night, zone 0 took the 06:00 event.
        let now = Timestamp::new(DayOfWeek::Mon, 8 * 60);
        let restored = scheduler.restore_setpoints(now, &events, &mut zones);

        assert_eq!(restored, 2);
        assert_eq!(zones[1].setpoint, 170);
        assert_eq!(zones[0].setpoint, 550);
        assert_eq!(zones[2].setpoint, 0);
    }

    #[test]
    fn restores_same_weekday_from_last_week() {
        let events = [event(DayMask::day(DayOfWeek::Mon).bits(), 9 * 60, 1, 210)];
        let mut zones = zones();
        let scheduler = Scheduler::new();

        // Monday 08:00: the last change was last Monday at 09:00.
        let now = Timestamp::new(DayOfWeek::Mon, 8 * 60);
        let restored = scheduler.restore_setpoints(now, &events, &mut zones);

        assert_eq!(restored, 1);
        assert_eq!(zones[1].setpoint, 210);
    }
}
