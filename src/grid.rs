//! The static tile grid the vehicles drive on.

use crate::error::{Error, Result};
use crate::math::{Point2d, Vector2d};
use arrayvec::ArrayVec;
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Tile code for an empty (undrivable) tile.
pub const EMPTY: i32 = 0;
/// Tile code for a two-way road with one lane per direction.
pub const TWO_WAY: i32 = 1;
/// Tile code for a two-way road with two lanes per direction.
pub const TWO_WAY_2_LANE: i32 = -10;
/// Tile code for a one-way road heading east.
pub const ONE_WAY_EAST: i32 = -1;
/// Tile code for a one-way road heading west.
pub const ONE_WAY_WEST: i32 = -2;
/// Tile code for a one-way road heading south.
pub const ONE_WAY_SOUTH: i32 = -3;
/// Tile code for a one-way road heading north.
pub const ONE_WAY_NORTH: i32 = -4;

/// Integer coordinates of a tile, as (column, row).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tile {
    pub col: usize,
    pub row: usize,
}

impl Tile {
    pub const fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }

    /// The neighbouring tile in the given direction, if it has non-negative coordinates.
    pub fn step(self, dir: Direction) -> Option<Tile> {
        let (dx, dy) = dir.offset();
        Some(Tile {
            col: self.col.checked_add_signed(dx)?,
            row: self.row.checked_add_signed(dy)?,
        })
    }

    /// The direction of a single step from `self` to `other`, if they are 4-adjacent.
    pub fn direction_to(self, other: Tile) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|dir| self.step(*dir) == Some(other))
    }
}

/// A compass direction. North is towards row zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    East,
    West,
    South,
    North,
}

impl Direction {
    /// All directions, in the order path search explores them.
    pub const ALL: [Direction; 4] = [
        Direction::East,
        Direction::West,
        Direction::South,
        Direction::North,
    ];

    /// The (column, row) offset of one step in this direction.
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
            Direction::South => (0, 1),
            Direction::North => (0, -1),
        }
    }

    /// A unit vector in world space.
    pub fn vector(self) -> Vector2d {
        let (dx, dy) = self.offset();
        Vector2d::new(dx as f64, dy as f64)
    }

    pub fn reverse(self) -> Direction {
        match self {
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::South => Direction::North,
            Direction::North => Direction::South,
        }
    }
}

/// The classification of a single tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileKind {
    Empty,
    /// A road open in every direction, with this many lanes per direction.
    TwoWay { lanes: u8 },
    /// A road that may only be left in the given direction.
    OneWay(Direction),
    /// A spawn/despawn zone belonging to the numbered group.
    Portal(i32),
}

impl TileKind {
    /// Decodes a raw map value.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            EMPTY => TileKind::Empty,
            TWO_WAY => TileKind::TwoWay { lanes: 1 },
            TWO_WAY_2_LANE => TileKind::TwoWay { lanes: 2 },
            ONE_WAY_EAST => TileKind::OneWay(Direction::East),
            ONE_WAY_WEST => TileKind::OneWay(Direction::West),
            ONE_WAY_SOUTH => TileKind::OneWay(Direction::South),
            ONE_WAY_NORTH => TileKind::OneWay(Direction::North),
            id if id > 1 => TileKind::Portal(id),
            _ => return None,
        })
    }

    pub fn is_drivable(self) -> bool {
        self != TileKind::Empty
    }

    /// Whether a vehicle may leave a tile of this kind in the given direction.
    pub fn allows_exit(self, dir: Direction) -> bool {
        match self {
            TileKind::Empty => false,
            TileKind::OneWay(only) => only == dir,
            TileKind::TwoWay { .. } | TileKind::Portal(_) => true,
        }
    }

    /// The number of lanes per direction, used for lane offsets.
    pub fn lanes(self) -> u8 {
        match self {
            TileKind::TwoWay { lanes } => lanes,
            _ => 1,
        }
    }
}

/// The classified tile grid, immutable once built.
///
/// Map values: `0` empty, `1` two-way road, `-10` two-way road with two
/// lanes per direction, `-1`/`-2`/`-3`/`-4` one-way east/west/south/north,
/// and any value greater than one is a portal whose value names its group.
#[derive(Clone, Debug)]
pub struct RoadNetwork {
    cols: usize,
    rows: usize,
    tile_size: f64,
    tiles: Vec<TileKind>,
    portals: BTreeMap<i32, SmallVec<[Tile; 4]>>,
}

impl RoadNetwork {
    /// Classifies a rectangular grid of map values.
    pub fn from_rows(rows: &[Vec<i32>], tile_size: f64) -> Result<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if cols == 0 {
            return Err(Error::EmptyMap);
        }

        let mut tiles = Vec::with_capacity(cols * rows.len());
        let mut portals = BTreeMap::<i32, SmallVec<[Tile; 4]>>::new();
        for (row, values) in rows.iter().enumerate() {
            if values.len() != cols {
                return Err(Error::RaggedMap {
                    row,
                    expected: cols,
                    got: values.len(),
                });
            }
            for (col, &code) in values.iter().enumerate() {
                let kind =
                    TileKind::from_code(code).ok_or(Error::UnknownTileCode { col, row, code })?;
                if let TileKind::Portal(id) = kind {
                    portals.entry(id).or_default().push(Tile::new(col, row));
                }
                tiles.push(kind);
            }
        }

        Ok(Self {
            cols,
            rows: rows.len(),
            tile_size,
            tiles,
            portals,
        })
    }

    /// The number of columns in the grid.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The number of rows in the grid.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The side length of a tile in world units.
    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    /// The kind of the given tile. Tiles outside the grid are empty.
    pub fn kind(&self, tile: Tile) -> TileKind {
        if tile.col < self.cols && tile.row < self.rows {
            self.tiles[tile.row * self.cols + tile.col]
        } else {
            TileKind::Empty
        }
    }

    pub fn is_drivable(&self, tile: Tile) -> bool {
        self.kind(tile).is_drivable()
    }

    /// The directions in which a vehicle may leave the tile.
    pub fn exits(&self, tile: Tile) -> ArrayVec<Direction, 4> {
        let kind = self.kind(tile);
        Direction::ALL
            .into_iter()
            .filter(|dir| kind.allows_exit(*dir))
            .collect()
    }

    /// The number of lanes per direction on the tile.
    pub fn lanes(&self, tile: Tile) -> u8 {
        self.kind(tile).lanes()
    }

    /// Whether a vehicle may drive from `tile` one step in direction `dir`.
    ///
    /// The current tile must permit leaving in `dir`, and the neighbour must
    /// permit leaving back the way the vehicle came.
    pub fn can_move(&self, tile: Tile, dir: Direction) -> bool {
        let Some(next) = tile.step(dir) else {
            return false;
        };
        self.kind(tile).allows_exit(dir) && self.kind(next).allows_exit(dir.reverse())
    }

    /// The legal single-step moves out of a tile, in search order.
    pub fn successors(&self, tile: Tile) -> impl Iterator<Item = Tile> + '_ {
        Direction::ALL
            .into_iter()
            .filter(move |dir| self.can_move(tile, *dir))
            .filter_map(move |dir| tile.step(dir))
    }

    /// The world space centre of a tile.
    pub fn world_centre(&self, tile: Tile) -> Point2d {
        self.world_point(tile.col as f64, tile.row as f64)
    }

    /// The world space centre of a (possibly fractional) tile coordinate.
    pub fn world_point(&self, col: f64, row: f64) -> Point2d {
        let t = self.tile_size;
        Point2d::new(col * t + 0.5 * t, row * t + 0.5 * t)
    }

    /// The portal groups, by ascending group ID.
    pub fn portals(&self) -> impl Iterator<Item = (i32, &[Tile])> + '_ {
        self.portals.iter().map(|(id, tiles)| (*id, tiles.as_slice()))
    }

    /// The tiles forming the given portal group.
    pub fn portal_tiles(&self, id: i32) -> &[Tile] {
        self.portals.get(&id).map(|t| t.as_slice()).unwrap_or(&[])
    }
}
