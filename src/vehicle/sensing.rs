use crate::config::VehicleConfig;
use crate::debug::debug_line;
use crate::math::{heading_vector, Point2d, Rect};
use crate::VehicleId;
use cgmath::prelude::*;

/// What other vehicles see of a vehicle: a snapshot taken before anyone moves.
#[derive(Clone, Copy, Debug)]
pub struct Footprint {
    pub id: VehicleId,
    pub position: Point2d,
    pub bounds: Rect,
    pub reached: bool,
}

/// The outcome of scanning the road ahead.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scan {
    /// The harshest slow factor triggered, 1.0 if nothing was seen.
    pub slow_factor: f64,
    /// The distance to the nearest vehicle seen ahead.
    pub nearest: Option<f64>,
}

/// Casts three rays ahead of a vehicle (straight ahead and to either side)
/// and reports how strongly the vehicles they hit should slow it down.
pub fn scan_ahead(
    me: VehicleId,
    origin: Point2d,
    heading: f64,
    ray_length: f64,
    config: &VehicleConfig,
    others: &[Footprint],
) -> Scan {
    let spread = config.ray_spread_deg.to_radians();
    let rays = [heading, heading - spread, heading + spread]
        .map(|angle| origin + heading_vector(angle) * ray_length);
    for end in rays {
        debug_line("ray", origin, end);
    }

    let mut scan = Scan {
        slow_factor: 1.0,
        nearest: None,
    };
    for other in others.iter().filter(|o| o.id != me && !o.reached) {
        if !rays.iter().any(|end| other.bounds.hit_by_segment(origin, *end)) {
            continue;
        }
        let dist = (other.position - origin).magnitude();
        for zone in &config.slow_zones {
            if dist < zone.distance {
                scan.slow_factor = f64::min(scan.slow_factor, zone.factor);
            }
        }
        if scan.nearest.map_or(true, |nearest| dist < nearest) {
            scan.nearest = Some(dist);
        }
    }
    scan
}

/// Keeps a vehicle stopped behind the one ahead until a clear gap opens.
///
/// The vehicle blocks once the gap falls below `block_gap` and only releases
/// once it grows past the larger `release_gap`.
#[derive(Clone, Copy, Debug)]
pub struct SpacingHysteresis {
    block_gap: f64,
    release_gap: f64,
    blocked: bool,
}

impl SpacingHysteresis {
    /// Creates the gaps for a vehicle of the given length.
    pub fn new(length: f64, config: &VehicleConfig) -> Self {
        let block_gap = f64::max(config.block_gap_floor, config.block_gap_factor * length);
        let release_gap = f64::max(
            block_gap + config.release_gap_band,
            config.release_gap_factor * length,
        );
        Self {
            block_gap,
            release_gap,
            blocked: false,
        }
    }

    pub fn block_gap(&self) -> f64 {
        self.block_gap
    }

    pub fn release_gap(&self) -> f64 {
        self.release_gap
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Updates the flag from the distance to the nearest vehicle ahead.
    pub fn observe(&mut self, nearest: Option<f64>) -> bool {
        let gap = nearest.unwrap_or(f64::INFINITY);
        if self.blocked {
            self.blocked = gap <= self.release_gap;
        } else {
            self.blocked = gap < self.block_gap;
        }
        self.blocked
    }
}
