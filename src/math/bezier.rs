use super::curve::ParametricCurve2d;
use super::{Point2d, Vector2d};
use crate::util::Interval;
use cgmath::prelude::*;

/// A cubic bezier curve
#[derive(Copy, Clone, Debug)]
pub struct CubicBezier2d {
    points: [Point2d; 4],
}

impl CubicBezier2d {
    /// Creates a curve from its end points and the tangent "handles" at each end.
    ///
    /// The curve leaves `start` heading along `start_dir` and arrives at `end`
    /// heading along `end_dir`; `handle` is the distance of the inner control
    /// points from their end points.
    pub fn from_tangents(
        start: Point2d,
        start_dir: Vector2d,
        end: Point2d,
        end_dir: Vector2d,
        handle: f64,
    ) -> Self {
        Self {
            points: [start, start + handle * start_dir, end - handle * end_dir, end],
        }
    }

    pub fn start(&self) -> Point2d {
        self.points[0]
    }

    pub fn end(&self) -> Point2d {
        self.points[3]
    }
}

impl ParametricCurve2d for CubicBezier2d {
    fn sample(&self, t: f64) -> Point2d {
        let t1 = 1.0 - t;
        Point2d::from_vec(
            t1 * t1 * t1 * self.points[0].to_vec()
                + 3.0 * t1 * t1 * t * self.points[1].to_vec()
                + 3.0 * t1 * t * t * self.points[2].to_vec()
                + t * t * t * self.points[3].to_vec(),
        )
    }

    fn bounds(&self) -> Interval<f64> {
        Interval { min: 0.0, max: 1.0 }
    }

    fn sample_dt(&self, t: f64) -> Vector2d {
        let t1 = 1.0 - t;
        (-3.0 * t1 * t1) * self.points[0].to_vec()
            + (9.0 * t * t - 12.0 * t + 3.0) * self.points[1].to_vec()
            + (-9.0 * t * t + 6.0 * t) * self.points[2].to_vec()
            + (3.0 * t * t) * self.points[3].to_vec()
    }
}
