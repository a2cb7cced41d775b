use self::sensing::{scan_ahead, SpacingHysteresis};
use crate::config::VehicleConfig;
use crate::light::TrafficLight;
use crate::math::{distance_to_segment, heading_vector, project_onto, Point2d, Rect, Vector2d};
use crate::path::{Path, SpawnPose};
use crate::{TrafficLightId, VehicleId};
use cgmath::prelude::*;
use log::trace;
use slotmap::SlotMap;

pub use dynamics::CoarseDir;
pub use model::{ModelRanges, VehicleAttributes, VehicleModel};
pub use sensing::Footprint;

mod dynamics;
mod model;
mod sensing;

/// Distances below this are treated as zero when normalising directions.
const EPSILON: f64 = 1e-3;

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    id: VehicleId,
    /// The vehicle's body style.
    model: VehicleModel,
    /// The vehicle's length along its heading.
    length: f64,
    /// The vehicle's width across its heading.
    width: f64,
    /// The top speed.
    max_speed: f64,
    /// Index into the renderer's palette.
    color: usize,
    /// The world space coordinates of the centre of the vehicle.
    position: Point2d,
    /// The heading in radians, clockwise from east.
    heading: f64,
    /// The current speed.
    speed: f64,
    /// The route being followed.
    path: Path,
    /// Index of the waypoint currently being driven towards.
    target: usize,
    /// The last direction of travel observed while moving.
    prev_dir: CoarseDir,
    /// The traffic light controlling this vehicle, if any.
    control_light: Option<TrafficLightId>,
    /// Whether the vehicle has driven past its controlling light.
    has_cleared_light: bool,
    /// Car following state.
    spacing: SpacingHysteresis,
    /// Whether a light held the vehicle during the last update.
    stopped_for_light: bool,
    /// Whether the vehicle was turning during the last update.
    turning: bool,
    /// Whether the vehicle has reached the end of its path.
    reached: bool,
}

/// The observable state of a vehicle, derived from its last update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleState {
    BlockedByLight,
    BlockedByCar,
    Turning,
    Cruising,
    Reached,
}

/// Everything a vehicle needs to know about the world for one update.
pub(crate) struct StepContext<'a> {
    /// Where every vehicle was before this tick's movement.
    pub others: &'a [Footprint],
    pub lights: &'a SlotMap<TrafficLightId, TrafficLight>,
    pub config: &'a VehicleConfig,
}

impl Vehicle {
    /// Creates a new vehicle at the start of its path.
    pub(crate) fn new(
        id: VehicleId,
        attributes: &VehicleAttributes,
        path: Path,
        pose: SpawnPose,
        control_light: Option<TrafficLightId>,
        config: &VehicleConfig,
    ) -> Self {
        let reached = path.is_empty();
        Self {
            id,
            model: attributes.model,
            length: attributes.length,
            width: attributes.width,
            max_speed: attributes.max_speed,
            color: attributes.color,
            position: pose.position,
            heading: pose.heading,
            speed: 0.5 * attributes.max_speed,
            path,
            target: 0,
            prev_dir: CoarseDir::ZERO,
            control_light,
            has_cleared_light: false,
            spacing: SpacingHysteresis::new(attributes.length, config),
            stopped_for_light: false,
            turning: false,
            reached,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn model(&self) -> VehicleModel {
        self.model
    }

    /// The vehicle's length along its heading.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The vehicle's width across its heading.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// The vehicle's palette colour index.
    pub fn color(&self) -> usize {
        self.color
    }

    /// The coordinates in world space of the centre of the vehicle.
    pub fn position(&self) -> Point2d {
        self.position
    }

    /// The heading in radians.
    pub fn heading(&self) -> f64 {
        self.heading
    }

    /// A unit vector in world space aligned with the vehicle's heading.
    pub fn direction(&self) -> Vector2d {
        heading_vector(self.heading)
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    /// The route the vehicle is following.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The index of the waypoint the vehicle is heading for.
    pub fn target_index(&self) -> usize {
        self.target
    }

    pub fn control_light(&self) -> Option<TrafficLightId> {
        self.control_light
    }

    pub fn has_cleared_light(&self) -> bool {
        self.has_cleared_light
    }

    /// Whether the vehicle is held behind the vehicle ahead.
    pub fn blocked_by_car(&self) -> bool {
        self.spacing.is_blocked()
    }

    /// Whether the vehicle has reached the end of its path.
    pub fn reached(&self) -> bool {
        self.reached
    }

    pub fn state(&self) -> VehicleState {
        if self.reached {
            VehicleState::Reached
        } else if self.stopped_for_light {
            VehicleState::BlockedByLight
        } else if self.spacing.is_blocked() {
            VehicleState::BlockedByCar
        } else if self.turning {
            VehicleState::Turning
        } else {
            VehicleState::Cruising
        }
    }

    /// The axis-aligned bounds of the vehicle's body.
    pub fn bounds(&self) -> Rect {
        Rect::bounding_rotated(self.position, self.direction(), self.length, self.width)
    }

    /// A snapshot of the vehicle for others to sense.
    pub fn footprint(&self) -> Footprint {
        Footprint {
            id: self.id,
            position: self.position,
            bounds: self.bounds(),
            reached: self.reached,
        }
    }

    /// The length of the sensing rays.
    fn ray_length(&self, config: &VehicleConfig) -> f64 {
        config.ray_base + config.ray_length_factor * self.length
    }

    fn reach(&mut self) {
        if !self.reached {
            trace!("vehicle {:?} reached its destination", self.id);
        }
        self.reached = true;
        self.speed = 0.0;
    }

    /// Advances the vehicle by `dt` seconds.
    pub(crate) fn update(&mut self, dt: f64, ctx: &StepContext) {
        let config = ctx.config;
        if self.reached {
            return;
        }
        let Some(target) = self.path.waypoint(self.target) else {
            self.reach();
            return;
        };

        // Direction of travel
        let to_target = target - self.position;
        let dist = to_target.magnitude();
        let move_dir = if dist > EPSILON {
            to_target / dist
        } else {
            Vector2d::new(0.0, 0.0)
        };
        let dir = CoarseDir::from_vector(move_dir, config.direction_dead_zone);
        self.turning = !self.prev_dir.is_zero() && dir != self.prev_dir;
        if self.speed > config.direction_memory_speed {
            self.prev_dir = dir;
        }

        // Traffic lights
        let hold = self.find_red_light(dt, move_dir, dir, ctx);
        if hold.is_some() != self.stopped_for_light {
            trace!("vehicle {:?} held by light: {}", self.id, hold.is_some());
        }
        self.stopped_for_light = hold.is_some();
        self.check_cleared_light(move_dir, ctx);

        // Vehicles ahead
        let scan = scan_ahead(
            self.id,
            self.position,
            self.heading,
            self.ray_length(config),
            config,
            ctx.others,
        );
        self.spacing.observe(scan.nearest);

        // Speed
        let mut desired = if self.stopped_for_light || self.spacing.is_blocked() {
            0.0
        } else {
            self.max_speed * scan.slow_factor
        };
        if self.turning {
            desired = f64::min(desired, self.max_speed * config.turn_speed_fraction);
        }
        self.speed = dynamics::blend_speed(self.speed, desired, config.speed_blend)
            .clamp(0.0, self.max_speed);

        // Steering
        let braking_hard = scan.slow_factor <= config.harshest_slow_factor()
            && self.speed < config.stationary_speed;
        let blocked = self.stopped_for_light || self.spacing.is_blocked() || braking_hard;
        if !blocked && dist > EPSILON {
            let bearing = to_target.y.atan2(to_target.x);
            self.heading = dynamics::steer(self.heading, bearing, config.steer_rate * dt);
        }

        // Integration
        let forward = self.direction();
        let mut step = self.speed * dt;
        if let Some(stop_point) = hold {
            let allowed = project_onto(stop_point, self.position, forward) - config.stop_distance;
            let allowed = f64::max(allowed, 0.0);
            if step > allowed {
                step = allowed;
                self.speed = if dt > 0.0 { allowed / dt } else { 0.0 };
            }
        }
        let start = self.position;
        self.position += forward * step;
        self.speed *= config.drag;

        // Waypoints, including any swept past during this step
        while let Some(waypoint) = self.path.waypoint(self.target) {
            if distance_to_segment(waypoint, start, self.position) >= config.waypoint_radius {
                break;
            }
            self.target += 1;
        }
        if self.target >= self.path.len() {
            self.reach();
        }
    }

    /// Finds a light ahead that refuses to let the vehicle pass, and returns
    /// its stop point.
    fn find_red_light(
        &self,
        dt: f64,
        move_dir: Vector2d,
        dir: CoarseDir,
        ctx: &StepContext,
    ) -> Option<Point2d> {
        let config = ctx.config;
        let range = config.stop_distance + config.signal_lookahead + self.speed * dt;
        ctx.lights
            .iter()
            .filter(|(_, light)| {
                let to_light = light.stop_point() - self.position;
                to_light.magnitude() < range && to_light.dot(move_dir) > 0.0
            })
            .find(|(id, light)| !light.car_can_pass(*id, self, dir))
            .map(|(_, light)| light.stop_point())
    }

    /// Marks the controlling light as cleared once the vehicle is past it.
    fn check_cleared_light(&mut self, move_dir: Vector2d, ctx: &StepContext) {
        if self.has_cleared_light {
            return;
        }
        let Some(light) = self.control_light.and_then(|id| ctx.lights.get(id)) else {
            return;
        };
        let passed = project_onto(self.position, light.stop_point(), move_dir);
        if passed > ctx.config.clear_distance {
            trace!("vehicle {:?} cleared its light", self.id);
            self.has_cleared_light = true;
        }
    }
}

#[cfg(test)]
impl Vehicle {
    /// Moves the vehicle without simulating the motion in between.
    pub(crate) fn place(&mut self, position: Point2d, speed: f64) {
        self.position = position;
        self.speed = speed;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::LaneConfig;
    use crate::grid::{RoadNetwork, Tile};
    use crate::path::PathPlanner;
    use crate::policy::Action;

    struct Fixture {
        network: RoadNetwork,
        lanes: LaneConfig,
        config: VehicleConfig,
        vehicle_ids: SlotMap<VehicleId, ()>,
        lights: SlotMap<TrafficLightId, TrafficLight>,
    }

    impl Fixture {
        /// A straight east-west road 12 tiles long with 100 unit tiles.
        fn new() -> Self {
            let mut row = vec![1; 12];
            row[0] = 2;
            row[11] = 3;
            Self {
                network: RoadNetwork::from_rows(&[row], 100.0).unwrap(),
                lanes: LaneConfig::default(),
                config: VehicleConfig::default(),
                vehicle_ids: SlotMap::with_key(),
                lights: SlotMap::with_key(),
            }
        }

        fn add_light(&mut self, col: f64, green: bool) -> TrafficLightId {
            let stop = self.network.world_point(col, 0.0);
            self.lights
                .insert(TrafficLight::new(stop, &[Tile::new(0, 0)], green))
        }

        fn vehicle(&mut self, control_light: Option<TrafficLightId>) -> Vehicle {
            let planner = PathPlanner::new(&self.network, &self.lanes);
            let path = planner.plan(Tile::new(0, 0), Tile::new(11, 0), 0).unwrap();
            let pose = planner.spawn_pose(path.tiles(), 0);
            let id = self.vehicle_ids.insert(());
            Vehicle::new(
                id,
                &VehicleAttributes::sedan(),
                path,
                pose,
                control_light,
                &self.config,
            )
        }

        fn step(&self, vehicle: &mut Vehicle, dt: f64, others: &[Footprint]) {
            let ctx = StepContext {
                others,
                lights: &self.lights,
                config: &self.config,
            };
            vehicle.update(dt, &ctx);
        }
    }

    #[test]
    fn drives_to_the_end() {
        let mut fx = Fixture::new();
        let mut vehicle = fx.vehicle(None);
        let mut x = vehicle.position().x;
        for _ in 0..2000 {
            fx.step(&mut vehicle, 1.0 / 60.0, &[]);
            assert!(vehicle.position().x >= x - 1e-9);
            x = vehicle.position().x;
            if vehicle.reached() {
                break;
            }
        }
        assert!(vehicle.reached());
        assert_eq!(vehicle.state(), VehicleState::Reached);
        assert!((vehicle.position().y - 75.0).abs() < 1.0);
    }

    #[test]
    fn holds_at_red_light() {
        for dt in [1.0 / 120.0, 1.0 / 60.0, 0.05, 0.1, 0.2, 0.3] {
            let mut fx = Fixture::new();
            let light = fx.add_light(3.0, false);
            let mut vehicle = fx.vehicle(Some(light));
            let stop = fx.lights[light].stop_point();
            let stop_distance = fx.config.stop_distance;

            for _ in 0..(60.0 / dt) as usize {
                let before = (stop - vehicle.position()).magnitude();
                fx.step(&mut vehicle, dt, &[]);
                let after = (stop - vehicle.position()).magnitude();
                if before >= stop_distance {
                    assert!(after >= stop_distance - 1e-9, "dt {}: {} -> {}", dt, before, after);
                }
                assert!(!vehicle.has_cleared_light());
            }
            assert!(vehicle.speed() < 1.0, "dt {}: still moving", dt);
            assert_eq!(vehicle.state(), VehicleState::BlockedByLight);
        }
    }

    #[test]
    fn proceeds_on_green_and_clears() {
        let mut fx = Fixture::new();
        let light = fx.add_light(3.0, false);
        let mut vehicle = fx.vehicle(Some(light));
        for _ in 0..600 {
            fx.step(&mut vehicle, 1.0 / 60.0, &[]);
        }
        assert_eq!(vehicle.state(), VehicleState::BlockedByLight);

        fx.lights[light].apply(Action::Switch);
        for _ in 0..600 {
            fx.step(&mut vehicle, 1.0 / 60.0, &[]);
            if vehicle.has_cleared_light() {
                break;
            }
        }
        assert!(vehicle.has_cleared_light());

        // Red again: the vehicle has cleared the light and is never held by it
        fx.lights[light].apply(Action::Switch);
        for _ in 0..2000 {
            fx.step(&mut vehicle, 1.0 / 60.0, &[]);
            assert_ne!(vehicle.state(), VehicleState::BlockedByLight);
            if vehicle.reached() {
                break;
            }
        }
        assert!(vehicle.reached());
    }

    #[test]
    fn cleared_vehicle_ignores_red() {
        let mut fx = Fixture::new();
        let light = fx.add_light(3.0, false);
        let mut vehicle = fx.vehicle(Some(light));
        vehicle.has_cleared_light = true;
        for _ in 0..600 {
            fx.step(&mut vehicle, 1.0 / 60.0, &[]);
            assert_ne!(vehicle.state(), VehicleState::BlockedByLight);
        }
        assert!(vehicle.position().x > fx.lights[light].stop_point().x);
    }

    #[test]
    fn uncontrolled_vehicle_ignores_red() {
        let mut fx = Fixture::new();
        let light = fx.add_light(3.0, false);
        let mut vehicle = fx.vehicle(None);
        for _ in 0..600 {
            fx.step(&mut vehicle, 1.0 / 60.0, &[]);
        }
        assert!(vehicle.position().x > fx.lights[light].stop_point().x);
    }

    #[test]
    fn spacing_hysteresis() {
        let mut fx = Fixture::new();
        let mut vehicle = fx.vehicle(None);
        let mut leader = fx.vehicle(None);
        let (block, release) = (vehicle.spacing.block_gap(), vehicle.spacing.release_gap());

        let mut step_with_gap = |fx: &Fixture, vehicle: &mut Vehicle, gap: f64| {
            leader.position = vehicle.position() + Vector2d::new(gap, 0.0);
            leader.heading = 0.0;
            let others = [vehicle.footprint(), leader.footprint()];
            fx.step(vehicle, 1.0 / 60.0, &others);
        };

        // Approach to within the block gap
        step_with_gap(&fx, &mut vehicle, block - 2.0);
        assert!(vehicle.blocked_by_car());

        // Inside the band, rays alone would allow a crawl, but the hold stays
        let gap = 0.5 * (block + release);
        for _ in 0..120 {
            let speed = vehicle.speed();
            step_with_gap(&fx, &mut vehicle, gap);
            assert!(vehicle.blocked_by_car());
            assert!(vehicle.speed() <= speed);
        }
        assert!(vehicle.speed() < 1.0);

        // Once the gap opens past the release gap, the vehicle moves off
        step_with_gap(&fx, &mut vehicle, release + 2.0);
        assert!(!vehicle.blocked_by_car());
        for _ in 0..60 {
            step_with_gap(&fx, &mut vehicle, release + 40.0);
        }
        assert!(vehicle.speed() > 10.0);
    }
}
