use crate::types::{ActuatorOutputs, Zone, ZoneState};

// Reaching the set-point exactly counts as over it, reaching the floor
// exactly does not count as under it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneController;

impl ZoneController {
    pub fn evaluate(zone: &Zone, reading: i16) -> ZoneState {
        if reading >= zone.setpoint {
            ZoneState::Off
        } else if reading < zone.floor() {
            ZoneState::On
        } else {
            zone.state
        }
    }

    pub fn update(zone: &mut Zone, reading: i16) -> bool {
        let next = Self::evaluate(zone, reading);
        let changed = next != zone.state;
        zone.state = next;
        changed
    }

    pub fn aggregate(zones: &[Zone]) -> ActuatorOutputs {
        zones
            .iter()
            .filter(|zone| zone.state.is_on())
            .fold(ActuatorOutputs::default(), |outputs, zone| ActuatorOutputs {
                boiler: true,
                pump: outputs.pump || zone.space_heating,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heating_zone(state: ZoneState) -> Zone {
        Zone {
            setpoint: 200,
            hysteresis: 20,
            space_heating: true,
            state,
        }
    }

    #[test]
    fn follows_hysteresis_band() {
        let mut zone = heating_zone(ZoneState::Off);

        ZoneController::update(&mut zone, 179);
        assert_eq!(zone.state, ZoneState::On);

        let mut zone = heating_zone(ZoneState::Off);
        ZoneController::update(&mut zone, 181);
        assert_eq!(zone.state, ZoneState::Off);

        let mut zone = heating_zone(ZoneState::On);
        ZoneController::update(&mut zone, 201);
        assert_eq!(zone.state, ZoneState::Off);
    }

    #[test]
    fn reading_at_setpoint_is_off_while_floor_holds_state() {
        // Equality at the set-point counts as over it (`>=`): off, regardless of history.
        let on = heating_zone(ZoneState::On);
        let off = heating_zone(ZoneState::Off);
        assert_eq!(ZoneController::evaluate(&on, 200), ZoneState::Off);
        // At the floor: keep whatever we had.
        assert_eq!(ZoneController::evaluate(&off, 180), ZoneState::Off);
        assert_eq!(ZoneController::evaluate(&on, 180), ZoneState::On);
    }

    #[test]
    fn heating_zone_stays_on_through_dead_band() {
        let mut zone = heating_zone(ZoneState::Off);
        assert!(ZoneController::update(&mut zone, 170));
        assert!(!ZoneController::update(&mut zone, 185));
        assert!(!ZoneController::update(&mut zone, 199));
        assert_eq!(zone.state, ZoneState::On);
        assert!(ZoneController::update(&mut zone, 200));
        assert_eq!(zone.state, ZoneState::Off);
    }

    #[test]
    fn water_zone_fires_boiler_without_pump() {
        let mut zones = [Zone::default(); 3];
        zones[0].state = ZoneState::On;
        assert_eq!(
            ZoneController::aggregate(&zones),
            ActuatorOutputs {
                boiler: true,
                pump: false
            }
        );

        zones[2].space_heating = true;
        zones[2].state = ZoneState::On;
        assert_eq!(
            ZoneController::aggregate(&zones),
            ActuatorOutputs {
                boiler: true,
                pump: true
            }
        );

        let idle = [Zone::default(); 3];
        assert_eq!(ZoneController::aggregate(&idle), ActuatorOutputs::default());
    }
}
