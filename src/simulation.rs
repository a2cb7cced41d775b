#[cfg(feature = "debug")]
use crate::debug::{debug_path, debug_rect, take_debug_frame};
use crate::config::{ObservationConfig, Scenario, SimConfig};
use crate::error::Result;
use crate::grid::{RoadNetwork, Tile};
use crate::light::TrafficLight;
use crate::math::Point2d;
use crate::path::PathPlanner;
use crate::policy::{Action, LightPolicy, StateKey};
use crate::vehicle::{Footprint, StepContext, Vehicle, VehicleAttributes};
use crate::{TrafficLightId, VehicleId, VehicleSet};
use cgmath::prelude::*;
use itertools::Itertools;
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use slotmap::{SecondaryMap, SlotMap};

/// The components of the most recent reward given to a traffic light.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RewardBreakdown {
    /// Bonus for vehicles that left the queue.
    pub clear: f64,
    /// Penalty for vehicles still queued.
    pub queue: f64,
    /// Penalty for vehicles in the wider area.
    pub opposing: f64,
    /// Penalty for having just switched.
    pub switch: f64,
    /// Penalty for a gridlocked central intersection.
    pub gridlock: f64,
}

impl RewardBreakdown {
    pub fn total(&self) -> f64 {
        self.clear + self.queue + self.opposing + self.switch + self.gridlock
    }
}

/// Reward bookkeeping for a single traffic light.
#[derive(Clone, Copy, Debug, Default)]
pub struct LightStats {
    /// The sum of every reward received, across episodes.
    pub total_reward: f64,
    /// The reward received for the last decision.
    pub last_reward: f64,
    /// The last decision taken in this episode.
    pub last_action: Option<Action>,
    /// The queue length observed after the last decision.
    pub last_queue: usize,
    pub breakdown: RewardBreakdown,
}

impl LightStats {
    fn record(&mut self, action: Action, queue: usize, breakdown: RewardBreakdown) {
        let reward = breakdown.total();
        self.total_reward += reward;
        self.last_reward = reward;
        self.last_action = Some(action);
        self.last_queue = queue;
        self.breakdown = breakdown;
    }

    /// Forgets the current episode, keeping the running total.
    fn restart(&mut self) {
        *self = Self {
            total_reward: self.total_reward,
            ..Default::default()
        };
    }
}

/// A traffic simulation on a tile grid, with learning traffic lights.
pub struct Simulation {
    /// The road layout.
    network: RoadNetwork,
    /// The simulation parameters.
    config: SimConfig,
    /// The traffic lights, in decision order.
    lights: SlotMap<TrafficLightId, TrafficLight>,
    /// Reward bookkeeping for each light.
    stats: SecondaryMap<TrafficLightId, LightStats>,
    /// Each light's most recent state and decision in the current episode.
    decisions: SecondaryMap<TrafficLightId, (StateKey, Action)>,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The value table shared by every light.
    policy: LightPolicy,
    rng: StdRng,
    /// Wall-clock time of the last spawn attempt, in ms.
    last_spawn_ms: u64,
    /// The number of collisions so far.
    crashes: usize,
    /// The number of vehicles that reached their destination.
    arrivals: usize,
    /// The current frame of simulation.
    frame: usize,
    /// Debugging information from the previously simulated frame.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl Simulation {
    /// Creates a simulation with no traffic lights.
    pub fn new(network: RoadNetwork, config: SimConfig) -> Self {
        if network.portals().count() < 2 {
            warn!("road network has fewer than two portals, no vehicles will spawn");
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            network,
            policy: LightPolicy::new(&config.learning),
            config,
            lights: SlotMap::with_key(),
            stats: SecondaryMap::new(),
            decisions: SecondaryMap::new(),
            vehicles: SlotMap::with_key(),
            rng,
            last_spawn_ms: 0,
            crashes: 0,
            arrivals: 0,
            frame: 0,
            #[cfg(feature = "debug")]
            debug: serde_json::Value::Null,
        }
    }

    /// Builds a simulation from a scenario, validating its road map.
    pub fn from_scenario(scenario: &Scenario) -> Result<Self> {
        let network = RoadNetwork::from_rows(&scenario.map, scenario.config.tile_size)?;
        let mut sim = Self::new(network, scenario.config.clone());
        for def in &scenario.lights {
            let stop_point = sim.network.world_point(def.tile[0], def.tile[1]);
            let controls = def
                .controls
                .iter()
                .map(|[col, row]| Tile::new(*col, *row))
                .collect::<Vec<_>>();
            sim.add_traffic_light(TrafficLight::new(stop_point, &controls, def.start_green));
        }
        Ok(sim)
    }

    /// Adds a traffic light to the simulation.
    pub fn add_traffic_light(&mut self, light: TrafficLight) -> TrafficLightId {
        let id = self.lights.insert(light);
        self.stats.insert(id, LightStats::default());
        id
    }

    /// Adds a vehicle travelling from `start` to `goal`.
    ///
    /// Returns `None`, adding nothing, if there is no legal route between them.
    pub fn add_vehicle(
        &mut self,
        start: Tile,
        goal: Tile,
        attributes: &VehicleAttributes,
    ) -> Option<VehicleId> {
        let lanes = self.network.lanes(start).max(1) as usize;
        let lane = self.rng.gen_range(0..lanes);
        let planner = PathPlanner::new(&self.network, &self.config.lanes);
        let path = planner.plan(start, goal, lane)?;
        let pose = planner.spawn_pose(path.tiles(), lane);
        let control_light = self
            .lights
            .iter()
            .find(|(_, light)| light.controls(start))
            .map(|(id, _)| id);

        let config = &self.config.vehicle;
        let id = self.vehicles.insert_with_key(|id| {
            Vehicle::new(id, attributes, path, pose, control_light, config)
        });
        debug!(
            "spawned {:?} {:?} from {:?} to {:?} (light {:?})",
            attributes.model, id, start, goal, control_light
        );
        Some(id)
    }

    /// Tries to add a random vehicle between two distinct portal groups.
    fn spawn_random(&mut self) -> Option<VehicleId> {
        let portals = self.network.portals().map(|(id, _)| id).collect::<Vec<_>>();
        if portals.len() < 2 {
            return None;
        }
        let attributes = VehicleAttributes::random(&mut self.rng, self.config.spawn.palette_size);
        for _ in 0..self.config.spawn.max_tries {
            let from = portals.choose(&mut self.rng).copied();
            let to = portals.choose(&mut self.rng).copied();
            let (Some(from), Some(to)) = (from, to) else {
                return None;
            };
            if from == to {
                continue;
            }
            let start = self.network.portal_tiles(from).choose(&mut self.rng).copied();
            let goal = self.network.portal_tiles(to).choose(&mut self.rng).copied();
            if let (Some(start), Some(goal)) = (start, goal) {
                if let Some(id) = self.add_vehicle(start, goal, &attributes) {
                    return Some(id);
                }
            }
        }
        trace!("no route found after {} tries", self.config.spawn.max_tries);
        None
    }

    /// Advances the simulation by `dt` seconds. `now_ms` is the caller's
    /// wall-clock time, used only to pace spawning.
    pub fn step(&mut self, dt: f64, now_ms: u64) {
        self.spawn(now_ms);
        self.update_lights();
        self.update_vehicles(dt);
        self.remove_reached();
        if let Some((a, b)) = self.find_collision() {
            self.handle_crash(a, b, now_ms);
        }
        self.frame += 1;

        #[cfg(feature = "debug")]
        {
            for vehicle in self.vehicles.values() {
                debug_path("path", vehicle.path().waypoints());
                debug_rect("vehicle", &vehicle.bounds());
            }
            self.debug = take_debug_frame();
        }
    }

    /// Spawns a vehicle if there is room and the spawn interval has elapsed.
    fn spawn(&mut self, now_ms: u64) {
        let spawn = &self.config.spawn;
        if self.vehicles.len() >= spawn.max_active
            || now_ms.saturating_sub(self.last_spawn_ms) < spawn.interval_ms
        {
            return;
        }
        self.spawn_random();
        self.last_spawn_ms = now_ms;
    }

    /// Lets every light observe, decide and learn from the result.
    fn update_lights(&mut self) {
        let obs = &self.config.observation;
        let rewards = &self.config.reward;
        let gridlocked = is_gridlocked(&self.vehicles, obs);

        for (id, light) in self.lights.iter_mut() {
            let stop = light.stop_point();
            let queue = queue_near(&self.vehicles, stop, obs.queue_radius);
            let opposing = queue_near(&self.vehicles, stop, obs.opposing_radius);
            let state = observe(light, queue, opposing, obs);

            let action = self.policy.choose_action(state, &mut self.rng);
            self.decisions.insert(id, (state, action));
            light.apply(action);

            let new_queue = queue_near(&self.vehicles, stop, obs.queue_radius);
            let new_opposing = queue_near(&self.vehicles, stop, obs.opposing_radius);
            let Some(stats) = self.stats.get_mut(id) else {
                continue;
            };
            let cleared = queue.saturating_sub(new_queue);
            let breakdown = RewardBreakdown {
                clear: rewards.clear_bonus * cleared as f64,
                queue: -rewards.queue_penalty * new_queue as f64,
                opposing: -rewards.opposing_penalty * opposing as f64,
                switch: if light.since_switch() == 0 {
                    -rewards.switch_penalty
                } else {
                    0.0
                },
                gridlock: if gridlocked {
                    -rewards.gridlock_penalty
                } else {
                    0.0
                },
            };
            stats.record(action, new_queue, breakdown);
            debug!(
                "light {:?}: {:?} in {:?}, reward {:.1}",
                id,
                action,
                state,
                breakdown.total()
            );

            let next = observe(light, new_queue, new_opposing, obs);
            self.policy.update(state, action, breakdown.total(), next);
        }
    }

    /// Moves every vehicle. Vehicles sense each other as they were before
    /// any of them moved.
    fn update_vehicles(&mut self, dt: f64) {
        let footprints = self
            .vehicles
            .values()
            .map(Vehicle::footprint)
            .collect::<Vec<Footprint>>();
        let ctx = StepContext {
            others: &footprints,
            lights: &self.lights,
            config: &self.config.vehicle,
        };
        for vehicle in self.vehicles.values_mut() {
            vehicle.update(dt, &ctx);
        }
    }

    fn remove_reached(&mut self) {
        let before = self.vehicles.len();
        self.vehicles.retain(|_, vehicle| !vehicle.reached());
        self.arrivals += before - self.vehicles.len();
    }

    /// Finds the first pair of vehicles, in roster order, whose bounds overlap.
    fn find_collision(&self) -> Option<(VehicleId, VehicleId)> {
        self.vehicles
            .values()
            .filter(|vehicle| !vehicle.reached())
            .tuple_combinations()
            .find(|(a, b)| a.bounds().overlaps(&b.bounds()))
            .map(|(a, b)| (a.id(), b.id()))
    }

    /// Penalises every light's last decision and starts a new episode.
    fn handle_crash(&mut self, a: VehicleId, b: VehicleId, now_ms: u64) {
        self.crashes += 1;
        info!(
            "collision between {:?} and {:?}, resetting episode (crash {})",
            a, b, self.crashes
        );
        let crash_reward = self.config.reward.crash_reward;
        for id in self.lights.keys() {
            if let Some(&(state, action)) = self.decisions.get(id) {
                self.policy.update(state, action, crash_reward, state);
            }
        }
        self.reset_episode(now_ms);
    }

    /// Clears the scene and gives every light a random phase. What the
    /// lights have learned, and their running scores, are kept.
    pub fn reset_episode(&mut self, now_ms: u64) {
        self.vehicles.clear();
        self.decisions.clear();
        self.last_spawn_ms = now_ms;
        for (id, light) in self.lights.iter_mut() {
            light.reset(self.rng.gen());
            if let Some(stats) = self.stats.get_mut(id) {
                stats.restart();
            }
        }
        info!("episode reset with {} learned states", self.policy.len());
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// The number of collisions so far.
    pub fn crashes(&self) -> usize {
        self.crashes
    }

    /// The number of vehicles that have reached their destination.
    pub fn arrivals(&self) -> usize {
        self.arrivals
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The learning state shared by the traffic lights.
    pub fn policy(&self) -> &LightPolicy {
        &self.policy
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID, if it is still active.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// Returns an iterator over all the traffic lights in the simulation.
    pub fn iter_lights(&self) -> impl Iterator<Item = (TrafficLightId, &TrafficLight)> {
        self.lights.iter()
    }

    /// Gets the reward bookkeeping of a traffic light.
    pub fn light_stats(&self, light_id: TrafficLightId) -> Option<&LightStats> {
        self.stats.get(light_id)
    }

    /// Gets the debugging information for the previously simulated frame as JSON array.
    #[cfg(feature = "debug")]
    pub fn debug(&self) -> serde_json::Value {
        self.debug.clone()
    }
}

/// Counts the vehicles within `radius` of `point` that have not cleared their light.
fn queue_near(vehicles: &VehicleSet, point: Point2d, radius: f64) -> usize {
    vehicles
        .values()
        .filter(|v| !v.has_cleared_light() && (v.position() - point).magnitude() < radius)
        .count()
}

/// Whether a nearly stationary vehicle sits in the central intersection.
fn is_gridlocked(vehicles: &VehicleSet, obs: &ObservationConfig) -> bool {
    vehicles.values().any(|v| {
        let pos = v.position();
        obs.gridlock_x.contains_strict(pos.x)
            && obs.gridlock_y.contains_strict(pos.y)
            && v.speed() < obs.gridlock_speed
    })
}

/// Discretises what a light sees into a learning state.
fn observe(light: &TrafficLight, queue: usize, opposing: usize, obs: &ObservationConfig) -> StateKey {
    let clamp = |count: usize, max: u8| count.min(max as usize) as u8;
    StateKey {
        queue: clamp(queue, obs.max_queue),
        opposing: clamp(opposing, obs.max_queue),
        since_switch: light.since_switch().min(obs.max_ticks as u32) as u8,
        green: light.is_green(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Vector2d;
    use assert_approx_eq::assert_approx_eq;
    use std::collections::BTreeSet;

    fn scenario() -> Scenario {
        let mut scenario = Scenario::from_json(
            r#"{
                "map": [[2, 1, 1, 1, 1, 3]],
                "lights": [{ "tile": [3.0, 0.0], "controls": [[0, 0]] }],
                "config": { "tile_size": 100.0, "seed": 11 }
            }"#,
        )
        .unwrap();
        scenario.config.learning.epsilon = 0.5;
        scenario
    }

    #[test]
    fn stats_exist_for_every_light() {
        let sim = Simulation::from_scenario(&Scenario::builtin()).unwrap();
        assert_eq!(sim.iter_lights().count(), 4);
        for (id, _) in sim.iter_lights() {
            let stats = sim.light_stats(id).unwrap();
            assert_eq!(stats.total_reward, 0.0);
            assert_eq!(stats.last_action, None);
        }
    }

    #[test]
    fn lights_decide_every_tick() {
        let mut sim = Simulation::from_scenario(&scenario()).unwrap();
        for frame in 0..20 {
            sim.step(1.0 / 60.0, frame * 16);
        }
        let (id, light) = sim.iter_lights().next().unwrap();
        let stats = sim.light_stats(id).unwrap();
        assert!(stats.last_action.is_some());
        assert!(light.since_switch() <= 20);
        assert!(!sim.policy().is_empty());
        assert_eq!(sim.frame(), 20);
    }

    #[test]
    fn controlled_by_spawn_tile() {
        let mut sim = Simulation::from_scenario(&scenario()).unwrap();
        let light = sim.iter_lights().next().map(|(id, _)| id);
        let attrs = VehicleAttributes::sedan();
        let east = sim.add_vehicle(Tile::new(0, 0), Tile::new(5, 0), &attrs).unwrap();
        let west = sim.add_vehicle(Tile::new(5, 0), Tile::new(0, 0), &attrs).unwrap();
        assert_eq!(sim.get_vehicle(east).unwrap().control_light(), light);
        assert_eq!(sim.get_vehicle(west).unwrap().control_light(), None);
    }

    #[test]
    fn crash_keeps_learning() {
        let mut sim = Simulation::from_scenario(&scenario()).unwrap();
        for frame in 0..30 {
            sim.step(1.0 / 60.0, frame * 16);
        }
        let light = sim.iter_lights().next().map(|(id, _)| id).unwrap();
        let total = sim.light_stats(light).unwrap().total_reward;
        let (state, action) = sim.decisions[light];
        let value = sim.policy().values(&state).unwrap().get(action);
        let states = sim.policy().states().copied().collect::<BTreeSet<_>>();

        let attrs = VehicleAttributes::sedan();
        let a = sim.add_vehicle(Tile::new(0, 0), Tile::new(5, 0), &attrs).unwrap();
        let b = sim.add_vehicle(Tile::new(0, 0), Tile::new(5, 0), &attrs).unwrap();
        assert_eq!(sim.find_collision(), Some((a, b)));
        sim.handle_crash(a, b, 500);

        assert_eq!(sim.crashes(), 1);
        assert_eq!(sim.iter_vehicles().count(), 0);
        assert_eq!(sim.policy().states().copied().collect::<BTreeSet<_>>(), states);
        assert!(sim.policy().values(&state).unwrap().get(action) < value);
        assert_eq!(sim.light_stats(light).unwrap().total_reward, total);
        assert_eq!(sim.light_stats(light).unwrap().last_action, None);
        let (_, light) = sim.iter_lights().next().unwrap();
        assert_eq!(light.since_switch(), 0);
    }

    /// Adds a vehicle on the road and moves it to `position`.
    fn place_vehicle(sim: &mut Simulation, position: Point2d, speed: f64) -> VehicleId {
        let attrs = VehicleAttributes::sedan();
        let id = sim.add_vehicle(Tile::new(0, 0), Tile::new(5, 0), &attrs).unwrap();
        sim.vehicles[id].place(position, speed);
        id
    }

    #[test]
    fn reward_terms() {
        let mut scenario = scenario();
        scenario.config.learning.epsilon = 0.0;
        let mut sim = Simulation::from_scenario(&scenario).unwrap();
        let (light, stop) = sim
            .iter_lights()
            .next()
            .map(|(id, light)| (id, light.stop_point()))
            .unwrap();

        // One queued, one more in the wider area, one stalled in the centre
        place_vehicle(&mut sim, stop + Vector2d::new(30.0, 0.0), 40.0);
        place_vehicle(&mut sim, stop + Vector2d::new(0.0, 100.0), 40.0);
        place_vehicle(&mut sim, Point2d::new(350.0, 350.0), 0.0);

        let seen = observe(&sim.lights[light], 1, 2, &sim.config.observation);
        sim.policy.update(seen, Action::Switch, 10.0, seen);
        sim.update_lights();

        let stats = sim.light_stats(light).unwrap();
        assert_eq!(stats.last_action, Some(Action::Switch));
        assert_eq!(stats.last_queue, 1);
        let terms = stats.breakdown;
        assert_approx_eq!(terms.clear, 0.0);
        assert_approx_eq!(terms.queue, -1.0);
        assert_approx_eq!(terms.opposing, -1.0);
        assert_approx_eq!(terms.switch, -2.0);
        assert_approx_eq!(terms.gridlock, -5.0);
        assert_approx_eq!(stats.last_reward, -9.0);

        // The new state is unseen, so the light stays and pays no switch penalty
        sim.update_lights();
        let stats = sim.light_stats(light).unwrap();
        assert_eq!(stats.last_action, Some(Action::Stay));
        assert_approx_eq!(stats.breakdown.switch, 0.0);
        assert_approx_eq!(stats.last_reward, -7.0);
        assert_approx_eq!(stats.total_reward, -16.0);
    }

    #[test]
    fn clear_bonus_counts_this_tick_only() {
        let mut scenario = scenario();
        scenario.config.learning.epsilon = 0.0;
        let mut sim = Simulation::from_scenario(&scenario).unwrap();
        let (light, stop) = sim
            .iter_lights()
            .next()
            .map(|(id, light)| (id, light.stop_point()))
            .unwrap();

        let id = place_vehicle(&mut sim, stop + Vector2d::new(-30.0, 0.0), 40.0);
        sim.update_lights();
        assert_eq!(sim.light_stats(light).unwrap().last_queue, 1);

        // Driving away between decisions is not a vehicle cleared by the decision
        sim.vehicles[id].place(stop + Vector2d::new(200.0, 0.0), 40.0);
        sim.update_lights();
        let stats = sim.light_stats(light).unwrap();
        assert_eq!(stats.last_queue, 0);
        assert_eq!(stats.breakdown.clear, 0.0);
        assert_approx_eq!(stats.breakdown.queue, 0.0);
        assert_approx_eq!(stats.breakdown.opposing, 0.0);
    }

    #[test]
    fn gridlock_needs_slow_central_vehicle() {
        let mut sim = Simulation::from_scenario(&scenario()).unwrap();
        let obs = sim.config.observation.clone();
        assert!(!is_gridlocked(&sim.vehicles, &obs));

        let id = place_vehicle(&mut sim, Point2d::new(300.0, 300.0), 20.0);
        assert!(!is_gridlocked(&sim.vehicles, &obs));
        sim.vehicles[id].place(Point2d::new(300.0, 300.0), 5.0);
        assert!(is_gridlocked(&sim.vehicles, &obs));
        sim.vehicles[id].place(Point2d::new(250.0, 300.0), 5.0);
        assert!(!is_gridlocked(&sim.vehicles, &obs));
    }

    #[test]
    fn spawn_pacing() {
        let mut scenario = scenario();
        scenario.config.spawn.max_active = 2;
        scenario.config.spawn.max_tries = 64;
        let mut sim = Simulation::from_scenario(&scenario).unwrap();
        let interval = sim.config().spawn.interval_ms;

        sim.spawn(interval - 1);
        assert_eq!(sim.iter_vehicles().count(), 0);
        sim.spawn(interval);
        assert_eq!(sim.iter_vehicles().count(), 1);
        sim.spawn(interval + 1);
        assert_eq!(sim.iter_vehicles().count(), 1);
        sim.spawn(2 * interval);
        assert_eq!(sim.iter_vehicles().count(), 2);

        // Full: no spawn however long the wait
        sim.spawn(10 * interval);
        assert_eq!(sim.iter_vehicles().count(), 2);
        assert_eq!(sim.last_spawn_ms, 2 * interval);
    }
}
