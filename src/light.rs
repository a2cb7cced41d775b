use crate::grid::Tile;
use crate::math::Point2d;
use crate::policy::Action;
use crate::vehicle::{CoarseDir, Vehicle};
use crate::TrafficLightId;
use cgmath::prelude::*;
use smallvec::SmallVec;

/// A traffic light guarding the approach from one or more spawn tiles.
///
/// The light has no timer of its own; its phase only changes when an
/// [Action] is applied to it.
#[derive(Clone, Debug)]
pub struct TrafficLight {
    /// The world space point vehicles stop in front of.
    stop_point: Point2d,
    /// The current state.
    state: LightState,
    /// The number of decisions since the state last changed.
    since_switch: u32,
    /// Vehicles spawning on these tiles are controlled by this light.
    controls: SmallVec<[Tile; 2]>,
}

/// The state of a traffic light.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum LightState {
    Red,
    Green,
}

impl LightState {
    pub fn from_green(green: bool) -> Self {
        if green {
            LightState::Green
        } else {
            LightState::Red
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            LightState::Red => LightState::Green,
            LightState::Green => LightState::Red,
        }
    }
}

impl TrafficLight {
    /// Creates a new traffic light.
    pub fn new(stop_point: Point2d, controls: &[Tile], start_green: bool) -> Self {
        Self {
            stop_point,
            state: LightState::from_green(start_green),
            since_switch: 0,
            controls: controls.iter().copied().collect(),
        }
    }

    /// The point vehicles stop in front of.
    pub fn stop_point(&self) -> Point2d {
        self.stop_point
    }

    pub fn state(&self) -> LightState {
        self.state
    }

    pub fn is_green(&self) -> bool {
        self.state == LightState::Green
    }

    /// The number of decisions since the light last changed.
    pub fn since_switch(&self) -> u32 {
        self.since_switch
    }

    /// The tiles whose vehicles this light controls.
    pub fn controlled_tiles(&self) -> &[Tile] {
        &self.controls
    }

    /// Whether a vehicle spawning on `tile` is controlled by this light.
    pub fn controls(&self, tile: Tile) -> bool {
        self.controls.contains(&tile)
    }

    /// Applies a decision: `Stay` keeps the phase and counts the tick,
    /// `Switch` flips the phase and restarts the count.
    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Stay => self.since_switch += 1,
            Action::Switch => {
                self.state = self.state.toggled();
                self.since_switch = 0;
            }
        }
    }

    /// Puts the light into the given phase with a fresh count.
    pub(crate) fn reset(&mut self, green: bool) {
        self.state = LightState::from_green(green);
        self.since_switch = 0;
    }

    /// Determines whether a vehicle moving in `dir` may pass this light.
    ///
    /// Lights only hold back the vehicles they control, and only until those
    /// vehicles have cleared them. A red light holds a vehicle that is still
    /// approaching the stop point, or one with no discernible direction.
    pub fn car_can_pass(&self, id: TrafficLightId, vehicle: &Vehicle, dir: CoarseDir) -> bool {
        if vehicle.control_light() != Some(id) || vehicle.has_cleared_light() {
            return true;
        }
        if self.is_green() {
            return true;
        }
        if dir.is_zero() {
            return false;
        }
        let to_stop = self.stop_point - vehicle.position();
        let approaching = to_stop.dot(dir.vector()) > 0.0;
        !approaching
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{LaneConfig, VehicleConfig};
    use crate::grid::RoadNetwork;
    use crate::math::Vector2d;
    use crate::path::PathPlanner;
    use crate::vehicle::VehicleAttributes;
    use crate::VehicleId;
    use slotmap::SlotMap;

    const EAST: CoarseDir = CoarseDir { dx: 1, dy: 0 };

    /// A red light at column 3 of a straight road, and a vehicle it controls
    /// spawning at the west end.
    fn setup(control: bool) -> (TrafficLightId, TrafficLight, Vehicle) {
        let network = RoadNetwork::from_rows(&[vec![2, 1, 1, 1, 1, 3]], 100.0).unwrap();
        let light = TrafficLight::new(network.world_point(3.0, 0.0), &[Tile::new(0, 0)], false);
        let mut lights = SlotMap::<TrafficLightId, ()>::with_key();
        let light_id = lights.insert(());
        let mut vehicle_ids = SlotMap::<VehicleId, ()>::with_key();

        let lanes = LaneConfig::default();
        let planner = PathPlanner::new(&network, &lanes);
        let path = planner.plan(Tile::new(0, 0), Tile::new(5, 0), 0).unwrap();
        let pose = planner.spawn_pose(path.tiles(), 0);
        let vehicle = Vehicle::new(
            vehicle_ids.insert(()),
            &VehicleAttributes::sedan(),
            path,
            pose,
            control.then_some(light_id),
            &VehicleConfig::default(),
        );
        (light_id, light, vehicle)
    }

    #[test]
    fn stay_counts_ticks() {
        let mut light = TrafficLight::new(Point2d::new(0.0, 0.0), &[], true);
        for tick in 1..=3 {
            light.apply(Action::Stay);
            assert_eq!(light.since_switch(), tick);
            assert_eq!(light.state(), LightState::Green);
        }
    }

    #[test]
    fn switch_flips_phase() {
        let mut light = TrafficLight::new(Point2d::new(0.0, 0.0), &[], false);
        light.apply(Action::Stay);
        light.apply(Action::Stay);
        light.apply(Action::Switch);
        assert_eq!(light.state(), LightState::Green);
        assert_eq!(light.since_switch(), 0);
        light.apply(Action::Switch);
        assert!(!light.is_green());
        assert_eq!(light.since_switch(), 0);
    }

    #[test]
    fn red_holds_approaching_vehicle() {
        let (id, light, vehicle) = setup(true);
        assert!(vehicle.position().x < light.stop_point().x);
        assert!(!light.car_can_pass(id, &vehicle, EAST));
        assert!(!light.car_can_pass(id, &vehicle, CoarseDir::ZERO));
    }

    #[test]
    fn green_lets_vehicle_pass() {
        let (id, mut light, vehicle) = setup(true);
        light.apply(Action::Switch);
        assert!(light.car_can_pass(id, &vehicle, EAST));
        assert!(light.car_can_pass(id, &vehicle, CoarseDir::ZERO));
    }

    #[test]
    fn red_releases_receding_vehicle() {
        let (id, light, mut vehicle) = setup(true);
        vehicle.place(light.stop_point() + Vector2d::new(50.0, 25.0), 40.0);
        assert!(light.car_can_pass(id, &vehicle, EAST));
        // Still held with no direction to judge by
        assert!(!light.car_can_pass(id, &vehicle, CoarseDir::ZERO));
    }

    #[test]
    fn red_ignores_uncontrolled_vehicle() {
        let (id, light, vehicle) = setup(false);
        assert!(light.car_can_pass(id, &vehicle, EAST));
        assert!(light.car_can_pass(id, &vehicle, CoarseDir::ZERO));

        let (_, light, vehicle) = setup(true);
        let mut others = SlotMap::<TrafficLightId, ()>::with_key();
        others.insert(());
        let other = others.insert(());
        assert!(light.car_can_pass(other, &vehicle, EAST));
    }
}
