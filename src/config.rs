//! Simulation parameters and scenario loading.
//!
//! All parameters are fixed for the lifetime of a [Simulation](crate::Simulation).
//! Every field has a default, so a scenario file only needs to name the values
//! it wants to change.

use crate::error::Result;
use crate::util::Interval;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The top-level simulation parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// The side length of a tile in world units.
    pub tile_size: f64,
    /// Seed for the simulation's random number generator.
    /// A random seed is drawn when absent.
    pub seed: Option<u64>,
    pub spawn: SpawnConfig,
    pub vehicle: VehicleConfig,
    pub lanes: LaneConfig,
    pub learning: LearningConfig,
    pub observation: ObservationConfig,
    pub reward: RewardConfig,
}

/// Vehicle spawning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Maximum number of vehicles on the road at once.
    pub max_active: usize,
    /// Minimum wall-clock time between spawn attempts, in ms.
    pub interval_ms: u64,
    /// Number of random portal pairs tried per spawn attempt.
    pub max_tries: usize,
    /// Number of colours in the renderer's vehicle palette.
    pub palette_size: usize,
}

/// Lane and turn geometry, as fractions of the tile size.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// Offset of the (inner) lane from the tile centre line.
    pub offset: f64,
    /// Additional offset per lane on multi-lane roads.
    pub spacing: f64,
    /// Distance of the turn anchors from the corner tile centre.
    pub curve_radius: f64,
    /// Number of points sampled along each turn curve, ends included.
    pub curve_samples: usize,
    /// Distance behind the start tile centre at which vehicles spawn.
    pub spawn_distance: f64,
}

/// Local motion control of a single vehicle. Distances are in world units.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Vehicles hold this far short of a red stop point.
    pub stop_distance: f64,
    /// Extra look-ahead beyond `stop_distance` for noticing signals.
    pub signal_lookahead: f64,
    /// How far past its own stop point a vehicle must be to have cleared it.
    pub clear_distance: f64,
    /// Sensing ray length before scaling by vehicle length.
    pub ray_base: f64,
    /// Sensing ray length added per unit of vehicle length.
    pub ray_length_factor: f64,
    /// Angle between the centre ray and each side ray, in degrees.
    pub ray_spread_deg: f64,
    /// Distance thresholds and slow factors, from mildest to harshest.
    pub slow_zones: [SlowZone; 3],
    /// Spacing hysteresis "block" gap as a multiple of vehicle length.
    pub block_gap_factor: f64,
    /// Minimum spacing hysteresis "block" gap.
    pub block_gap_floor: f64,
    /// Spacing hysteresis "release" gap as a multiple of vehicle length.
    pub release_gap_factor: f64,
    /// Minimum difference between the release and block gaps.
    pub release_gap_band: f64,
    /// Speed cap while turning, as a fraction of top speed.
    pub turn_speed_fraction: f64,
    /// Fraction of the gap to the desired speed closed each tick.
    pub speed_blend: f64,
    /// Multiplicative speed drag applied every tick.
    pub drag: f64,
    /// Steering rate, in fractions of the heading error per second.
    pub steer_rate: f64,
    /// A waypoint counts as reached within this distance.
    pub waypoint_radius: f64,
    /// Direction components smaller than this are treated as zero.
    pub direction_dead_zone: f64,
    /// The remembered direction is only updated above this speed.
    pub direction_memory_speed: f64,
    /// Speeds below this count as (nearly) stationary.
    pub stationary_speed: f64,
}

/// One band of the forward collision response.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SlowZone {
    /// Applies to vehicles detected closer than this.
    pub distance: f64,
    /// The speed cap as a fraction of top speed.
    pub factor: f64,
}

/// Tabular Q-learning parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Learning rate.
    pub alpha: f64,
    /// Discount factor.
    pub gamma: f64,
    /// Exploration rate.
    pub epsilon: f64,
}

/// How the traffic lights observe their surroundings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// Vehicles within this radius of a stop point are queued at it.
    pub queue_radius: f64,
    /// Vehicles within this radius count towards the opposing queue.
    pub opposing_radius: f64,
    /// Queue counts are clamped to this value in the learning state.
    pub max_queue: u8,
    /// Ticks since the last switch are clamped to this value.
    pub max_ticks: u8,
    /// The central intersection region watched for gridlock.
    pub gridlock_x: Interval<f64>,
    pub gridlock_y: Interval<f64>,
    /// Vehicles slower than this inside the region count as gridlocked.
    pub gridlock_speed: f64,
}

/// Reward shaping constants.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Bonus per vehicle that left the queue.
    pub clear_bonus: f64,
    /// Penalty per vehicle still queued.
    pub queue_penalty: f64,
    /// Penalty per vehicle in the opposing queue.
    pub opposing_penalty: f64,
    /// Penalty for switching phase.
    pub switch_penalty: f64,
    /// Penalty while the central intersection is gridlocked.
    pub gridlock_penalty: f64,
    /// Reward applied to every light's last decision after a crash.
    pub crash_reward: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tile_size: 110.0,
            seed: None,
            spawn: Default::default(),
            vehicle: Default::default(),
            lanes: Default::default(),
            learning: Default::default(),
            observation: Default::default(),
            reward: Default::default(),
        }
    }
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            max_active: 100,
            interval_ms: 1500,
            max_tries: 12,
            palette_size: 5,
        }
    }
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            offset: 0.25,
            spacing: 0.14,
            curve_radius: 0.40,
            curve_samples: 13,
            spawn_distance: 0.6,
        }
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            stop_distance: 55.0,
            signal_lookahead: 40.0,
            clear_distance: 20.0,
            ray_base: 60.0,
            ray_length_factor: 1.0,
            ray_spread_deg: 15.0,
            slow_zones: [
                SlowZone { distance: 90.0, factor: 0.6 },
                SlowZone { distance: 60.0, factor: 0.25 },
                SlowZone { distance: 40.0, factor: 0.01 },
            ],
            block_gap_factor: 0.9,
            block_gap_floor: 24.0,
            release_gap_factor: 1.4,
            release_gap_band: 10.0,
            turn_speed_fraction: 0.45,
            speed_blend: 0.12,
            drag: 0.98,
            steer_rate: 6.0,
            waypoint_radius: 8.0,
            direction_dead_zone: 0.1,
            direction_memory_speed: 5.0,
            stationary_speed: 1.0,
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.9,
            epsilon: 0.05,
        }
    }
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            queue_radius: 80.0,
            opposing_radius: 130.0,
            max_queue: 5,
            max_ticks: 10,
            gridlock_x: Interval::new(250.0, 450.0),
            gridlock_y: Interval::new(250.0, 450.0),
            gridlock_speed: 10.0,
        }
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            clear_bonus: 2.0,
            queue_penalty: 1.0,
            opposing_penalty: 0.5,
            switch_penalty: 2.0,
            gridlock_penalty: 5.0,
            crash_reward: -200.0,
        }
    }
}

impl VehicleConfig {
    /// The harshest slow factor, used to decide whether a vehicle is braking hard.
    pub fn harshest_slow_factor(&self) -> f64 {
        self.slow_zones
            .iter()
            .map(|zone| zone.factor)
            .fold(1.0, f64::min)
    }
}

/// A traffic light as described in a scenario file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LightDef {
    /// The stop point in (possibly fractional) tile coordinates.
    pub tile: [f64; 2],
    /// Vehicles spawning on these tiles are controlled by the light.
    pub controls: Vec<[usize; 2]>,
    /// The initial phase.
    #[serde(default)]
    pub start_green: bool,
}

/// A complete simulation setup: road map, traffic lights and parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    /// The tile grid, one row per entry. See [RoadNetwork](crate::RoadNetwork)
    /// for the encoding.
    pub map: Vec<Vec<i32>>,
    #[serde(default)]
    pub lights: Vec<LightDef>,
    #[serde(default)]
    pub config: SimConfig,
}

impl Scenario {
    /// Parses a scenario from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a scenario from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// The built-in demonstration town: four portals around a small
    /// network of two-way streets, with a light guarding each entry.
    pub fn builtin() -> Self {
        let map = vec![
            vec![5, 1, 1, 1, 1, 1, 1, 1, 2, 0],
            vec![0, 1, 0, 1, 0, 1, 0, 0, 0, 0],
            vec![0, 1, 0, 1, 0, 1, 0, 0, 0, 0],
            vec![4, 1, 1, 1, 0, 1, 0, 0, 0, 0],
            vec![0, 0, 1, 0, 0, 1, 0, 0, 0, 0],
            vec![0, 0, 1, 1, 1, 1, 0, 0, 0, 0],
            vec![0, 0, 0, 0, 0, 1, 0, 0, 0, 0],
            vec![0, 0, 0, 0, 0, 3, 0, 0, 0, 0],
        ];
        let light = |tile: [f64; 2], controls: [usize; 2], start_green| LightDef {
            tile,
            controls: vec![controls],
            start_green,
        };
        Self {
            map,
            lights: vec![
                light([1.0, 0.0], [0, 0], true),
                light([7.0, 0.0], [8, 0], true),
                light([1.0, 3.0], [0, 3], false),
                light([5.0, 6.0], [5, 7], false),
            ],
            config: SimConfig::default(),
        }
    }
}
