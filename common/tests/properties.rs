use heating_common::{
    DayMask, DayOfWeek, Event, MemoryEeprom, Scheduler, ConfigStore, SensorAddress, StoreLayout,
    Timestamp, Zone, ZoneController, ZoneState, MINUTES_PER_DAY, ZONE_COUNT,
};
use proptest::prelude::*;

fn blank_store() -> ConfigStore<MemoryEeprom> {
    let layout = StoreLayout::default();
    ConfigStore::open(MemoryEeprom::new(layout.image_len()), layout).unwrap()
}

fn arb_event() -> impl Strategy<Value = Event> {
    (
        1u8..=127,
        0..MINUTES_PER_DAY,
        0u8..ZONE_COUNT as u8,
        -300i16..=900,
    )
        .prop_map(|(days, time, zone, setpoint)| Event {
            days: DayMask::from_bits(days << 1),
            time,
            zone,
            setpoint,
        })
}

fn arb_zone() -> impl Strategy<Value = Zone> {
    (-100i16..=800, 0u8..=80, any::<bool>(), any::<bool>()).prop_map(
        |(setpoint, hysteresis, space_heating, on)| Zone {
            setpoint,
            hysteresis,
            space_heating,
            state: if on { ZoneState::On } else { ZoneState::Off },
        },
    )
}

proptest! {
    #[test]
    fn delete_shifts_later_events_down(
        events in proptest::collection::vec(arb_event(), 1..40),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut store = blank_store();
        for event in &events {
            store.add_event(*event).unwrap();
        }
        let index = pick.index(events.len());

        store.delete_event(index).unwrap();

        prop_assert_eq!(store.events().len(), events.len() - 1);
        prop_assert_eq!(&store.events()[..index], &events[..index]);
        prop_assert_eq!(&store.events()[index..], &events[index + 1..]);
        prop_assert_eq!(store.load().unwrap().events, store.events().to_vec());
    }

    #[test]
    fn re_adding_a_sensor_never_grows_the_table(
        tail in any::<[u8; 7]>(),
        first_zone in 0u8..ZONE_COUNT as u8,
        second_zone in 0u8..ZONE_COUNT as u8,
    ) {
        let mut bytes = [0x28u8; 8];
        bytes[1..].copy_from_slice(&tail);
        let address = SensorAddress(bytes);
        let mut store = blank_store();

        let first = store.add_sensor(address, first_zone).unwrap();
        let second = store.add_sensor(address, second_zone).unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(store.sensors().len(), 1);
        prop_assert_eq!(store.sensors()[0].zone, second_zone);
    }

    #[test]
    fn evaluation_is_stable_at_fixed_input(zone in arb_zone(), reading in -500i16..=1000) {
        let mut zone = zone;
        ZoneController::update(&mut zone, reading);
        let settled = zone.state;

        prop_assert!(!ZoneController::update(&mut zone, reading));
        prop_assert_eq!(ZoneController::evaluate(&zone, reading), settled);
    }

    #[test]
    fn due_event_always_applies(event in arb_event(), day_index in 0usize..7) {
        let day = DayOfWeek::from_index(day_index);
        let now = Timestamp::new(day, event.time);
        let mut zones = [Zone::default(); ZONE_COUNT];
        let mut scheduler = Scheduler::new();

        let applied = scheduler.process(now, &[event], &mut zones);

        if event.days.contains(day) {
            prop_assert_eq!(applied, vec![0]);
            prop_assert_eq!(zones[usize::from(event.zone)].setpoint, event.setpoint);
        } else {
            prop_assert!(applied.is_empty());
        }
        prop_assert!(scheduler.next_event() != now);
    }
}
