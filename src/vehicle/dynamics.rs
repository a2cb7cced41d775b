use crate::math::{wrap_angle, Vector2d};

/// A direction of travel quantised to one of nine buckets: the eight compass
/// points and "no direction".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CoarseDir {
    pub dx: i8,
    pub dy: i8,
}

impl CoarseDir {
    pub const ZERO: CoarseDir = CoarseDir { dx: 0, dy: 0 };

    /// Quantises a unit vector, treating components within `dead_zone` of
    /// zero as zero.
    pub fn from_vector(v: Vector2d, dead_zone: f64) -> Self {
        let quantise = |c: f64| {
            if c > dead_zone {
                1
            } else if c < -dead_zone {
                -1
            } else {
                0
            }
        };
        Self {
            dx: quantise(v.x),
            dy: quantise(v.y),
        }
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    pub fn vector(self) -> Vector2d {
        Vector2d::new(self.dx as f64, self.dy as f64)
    }
}

/// Moves `speed` a fraction `rate` of the way towards `desired`.
pub fn blend_speed(speed: f64, desired: f64, rate: f64) -> f64 {
    speed + (desired - speed) * rate
}

/// Turns `heading` towards `target` (both in radians) by the fraction `gain`
/// of the remaining error. The gain is capped at one so a single tick can
/// never turn past the target.
pub fn steer(heading: f64, target: f64, gain: f64) -> f64 {
    let error = wrap_angle(target - heading);
    wrap_angle(heading + error * gain.clamp(0.0, 1.0))
}
