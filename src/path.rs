//! Route planning over the tile grid and lane geometry.

use crate::config::LaneConfig;
use crate::grid::{Direction, RoadNetwork, Tile};
use crate::math::{cross, rot90, CubicBezier2d, ParametricCurve2d, Point2d};

/// Control handle length, as a fraction of the turn radius, for which a
/// cubic bezier closely approximates a quarter circle.
const QUARTER_CIRCLE_HANDLE: f64 = 0.5523;

/// A planned route: the tiles to visit and the world space waypoints to follow.
#[derive(Clone, Debug, Default)]
pub struct Path {
    tiles: Vec<Tile>,
    waypoints: Vec<Point2d>,
}

impl Path {
    /// The tiles visited, from start to goal.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// The world space waypoints, from start to goal.
    pub fn waypoints(&self) -> &[Point2d] {
        &self.waypoints
    }

    /// The waypoint at the given index, if the path extends that far.
    pub fn waypoint(&self, idx: usize) -> Option<Point2d> {
        self.waypoints.get(idx).copied()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// The initial position and heading of a vehicle starting a path.
#[derive(Clone, Copy, Debug)]
pub struct SpawnPose {
    pub position: Point2d,
    /// The heading in radians.
    pub heading: f64,
}

/// Plans routes over a [RoadNetwork].
#[derive(Clone, Copy)]
pub struct PathPlanner<'a> {
    network: &'a RoadNetwork,
    lanes: &'a LaneConfig,
}

impl<'a> PathPlanner<'a> {
    pub fn new(network: &'a RoadNetwork, lanes: &'a LaneConfig) -> Self {
        Self { network, lanes }
    }

    /// Plans a complete path between two tiles, or `None` if there is no route.
    pub fn plan(&self, start: Tile, goal: Tile, lane: usize) -> Option<Path> {
        let tiles = self.find_tile_path(start, goal);
        if tiles.is_empty() {
            return None;
        }
        let waypoints = self.build_lane_polyline(&tiles, lane);
        Some(Path { tiles, waypoints })
    }

    /// Finds the shortest sequence of legal single-tile moves from `start` to `goal`.
    ///
    /// Returns an empty path if either tile is undrivable or the goal cannot
    /// be reached without breaking a one-way restriction. Equal length routes
    /// are resolved by exploring east, west, south, then north.
    pub fn find_tile_path(&self, start: Tile, goal: Tile) -> Vec<Tile> {
        let net = self.network;
        if !net.is_drivable(start) || !net.is_drivable(goal) {
            return vec![];
        }
        pathfinding::directed::bfs::bfs(&start, |tile| net.successors(*tile), |tile| *tile == goal)
            .unwrap_or_default()
    }

    /// The lateral distance of a lane's centre line from the middle of a tile.
    pub fn lane_offset(&self, tile: Tile, lane: usize) -> f64 {
        let t = self.network.tile_size();
        let base = self.lanes.offset * t;
        match self.network.lanes(tile) {
            0 | 1 => base,
            lanes => {
                let lane = usize::min(lane, lanes as usize - 1);
                base + lane as f64 * self.lanes.spacing * t
            }
        }
    }

    /// Converts a tile path into waypoints along the right-hand lane.
    ///
    /// Each tile contributes its centre, shifted to the right of the direction
    /// of travel. Where the path turns, the corner point is replaced by a
    /// bezier arc from the incoming lane to the outgoing lane.
    pub fn build_lane_polyline(&self, tiles: &[Tile], lane: usize) -> Vec<Point2d> {
        let mut points = Vec::with_capacity(tiles.len());

        for (i, &tile) in tiles.iter().enumerate() {
            let centre = self.network.world_centre(tile);
            let offset = self.lane_offset(tile, lane);

            let dir_in = i.checked_sub(1).and_then(|j| tiles[j].direction_to(tile));
            let dir_out = tiles.get(i + 1).and_then(|next| tile.direction_to(*next));

            match (dir_in, dir_out) {
                (Some(d_in), Some(d_out)) if d_in != d_out => {
                    points.extend(self.turn_curve(centre, offset, d_in, d_out));
                }
                (_, Some(dir)) | (Some(dir), None) => {
                    points.push(centre + rot90(dir.vector()) * offset);
                }
                (None, None) => points.push(centre),
            }
        }

        points
    }

    /// Samples the arc taking a vehicle around the corner of a tile.
    fn turn_curve(
        &self,
        centre: Point2d,
        offset: f64,
        d_in: Direction,
        d_out: Direction,
    ) -> Vec<Point2d> {
        let curve = self.turn_bezier(centre, offset, d_in, d_out);
        curve.sample_evenly(self.lanes.curve_samples)
    }

    /// The bezier curve for a turn. Its ends sit on the incoming and outgoing
    /// lanes, one curve radius before and after the tile centre. Right turns
    /// hug the corner and left turns swing wide, so the handles scale with
    /// the effective radius on each side.
    pub(crate) fn turn_bezier(
        &self,
        centre: Point2d,
        offset: f64,
        d_in: Direction,
        d_out: Direction,
    ) -> CubicBezier2d {
        let (v_in, v_out) = (d_in.vector(), d_out.vector());
        let radius = self.lanes.curve_radius * self.network.tile_size();

        let entry = centre + rot90(v_in) * offset - v_in * radius;
        let exit = centre + rot90(v_out) * offset + v_out * radius;

        let side = cross(v_in, v_out).signum();
        let handle = QUARTER_CIRCLE_HANDLE * f64::max(radius - side * offset, 0.0);
        CubicBezier2d::from_tangents(entry, v_in, exit, v_out, handle)
    }

    /// Where a vehicle starting on the path appears: just behind the start
    /// tile's centre, in its lane, facing the first move.
    pub fn spawn_pose(&self, tiles: &[Tile], lane: usize) -> SpawnPose {
        let Some(&start) = tiles.first() else {
            return SpawnPose {
                position: Point2d::new(0.0, 0.0),
                heading: 0.0,
            };
        };
        let centre = self.network.world_centre(start);
        match tiles.get(1).and_then(|next| start.direction_to(*next)) {
            Some(dir) => {
                let v = dir.vector();
                let back = self.lanes.spawn_distance * self.network.tile_size();
                SpawnPose {
                    position: centre - v * back + rot90(v) * self.lane_offset(start, lane),
                    heading: v.y.atan2(v.x),
                }
            }
            None => SpawnPose {
                position: centre,
                heading: 0.0,
            },
        }
    }
}
