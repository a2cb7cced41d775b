//! A tile-grid traffic simulation whose traffic lights learn, by tabular
//! Q-learning, when to switch.

pub use cgmath;
pub use config::{
    LaneConfig, LearningConfig, LightDef, ObservationConfig, RewardConfig, Scenario, SimConfig,
    SlowZone, SpawnConfig, VehicleConfig,
};
pub use error::{Error, Result};
pub use grid::{Direction, RoadNetwork, Tile, TileKind};
pub use light::{LightState, TrafficLight};
pub use path::{Path, PathPlanner, SpawnPose};
pub use policy::{Action, ActionValues, LightPolicy, StateKey};
pub use simulation::{LightStats, RewardBreakdown, Simulation};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::{
    CoarseDir, Footprint, ModelRanges, Vehicle, VehicleAttributes, VehicleModel, VehicleState,
};

mod config;
mod debug;
mod error;
mod grid;
mod light;
pub mod math;
mod path;
mod policy;
mod simulation;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
    /// Unique ID of a [TrafficLight].
    pub struct TrafficLightId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
