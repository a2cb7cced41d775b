use super::{Point2d, Vector2d};
use cgmath::prelude::*;
use std::f64::consts::PI;

/// Rotates a vector 90 degrees clockwise in screen space (+y pointing down).
///
/// For a direction of travel this yields the right-hand side of the vehicle.
pub fn rot90(vec: Vector2d) -> Vector2d {
    Vector2d::new(-vec.y, vec.x)
}

/// The 2D cross product (z-component) of two vectors.
pub fn cross(a: Vector2d, b: Vector2d) -> f64 {
    a.x * b.y - a.y * b.x
}

/// A unit vector pointing along the given heading, in radians.
pub fn heading_vector(heading: f64) -> Vector2d {
    Vector2d::new(heading.cos(), heading.sin())
}

/// Wraps an angle in radians into the range `[-PI, PI)`.
pub fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

/// Whether the points `a`, `b`, `c` are arranged counter-clockwise.
fn ccw(a: Point2d, b: Point2d, c: Point2d) -> bool {
    (c.y - a.y) * (b.x - a.x) > (b.y - a.y) * (c.x - a.x)
}

/// Determines whether the segments `a1-a2` and `b1-b2` properly intersect.
///
/// Collinear and touching configurations are not reported as intersections.
pub fn segments_intersect(a1: Point2d, a2: Point2d, b1: Point2d, b2: Point2d) -> bool {
    ccw(a1, b1, b2) != ccw(a2, b1, b2) && ccw(a1, a2, b1) != ccw(a1, a2, b2)
}

/// Projects `point - origin` onto the unit vector `axis`.
pub fn project_onto(point: Point2d, origin: Point2d, axis: Vector2d) -> f64 {
    (point - origin).dot(axis)
}

/// The distance from `point` to the nearest point on the segment `a-b`.
pub fn distance_to_segment(point: Point2d, a: Point2d, b: Point2d) -> f64 {
    let ab = b - a;
    let len2 = ab.magnitude2();
    let t = if len2 > 0.0 {
        ((point - a).dot(ab) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (point - (a + ab * t)).magnitude()
}
