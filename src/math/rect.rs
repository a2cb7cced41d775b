use super::{segments_intersect, Point2d, Vector2d};
use crate::util::Interval;

/// An axis-aligned rectangle in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: Interval<f64>,
    pub y: Interval<f64>,
}

impl Rect {
    /// Creates a rectangle with the given centre and half extents.
    pub fn from_centre(centre: Point2d, half_x: f64, half_y: f64) -> Self {
        Self {
            x: Interval::disc(centre.x, half_x),
            y: Interval::disc(centre.y, half_y),
        }
    }

    /// The axis-aligned bounds of a `length` by `width` box centred on `centre`
    /// whose long axis points along the unit vector `dir`.
    pub fn bounding_rotated(centre: Point2d, dir: Vector2d, length: f64, width: f64) -> Self {
        let (hl, hw) = (0.5 * length, 0.5 * width);
        let half_x = hl * dir.x.abs() + hw * dir.y.abs();
        let half_y = hl * dir.y.abs() + hw * dir.x.abs();
        Self::from_centre(centre, half_x, half_y)
    }

    /// Returns true if the two rectangles overlap with non-zero area.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x.overlaps(&other.x) && self.y.overlaps(&other.y)
    }

    /// Returns true if the point lies inside or on the rectangle.
    pub fn contains(&self, point: Point2d) -> bool {
        self.x.contains(point.x) && self.y.contains(point.y)
    }

    /// The four corners, in clockwise screen order starting top-left.
    pub fn corners(&self) -> [Point2d; 4] {
        [
            Point2d::new(self.x.min, self.y.min),
            Point2d::new(self.x.max, self.y.min),
            Point2d::new(self.x.max, self.y.max),
            Point2d::new(self.x.min, self.y.max),
        ]
    }

    /// Determines whether the segment from `start` to `end` hits the rectangle,
    /// either by crossing one of its edges or by starting inside it.
    pub fn hit_by_segment(&self, start: Point2d, end: Point2d) -> bool {
        if self.contains(start) {
            return true;
        }
        let c = self.corners();
        (0..4).any(|i| segments_intersect(start, end, c[i], c[(i + 1) % 4]))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rotated_bounds() {
        let east = Rect::bounding_rotated(Point2d::new(0.0, 0.0), Vector2d::new(1.0, 0.0), 36.0, 18.0);
        assert_eq!(east.x, Interval::new(-18.0, 18.0));
        assert_eq!(east.y, Interval::new(-9.0, 9.0));

        let south = Rect::bounding_rotated(Point2d::new(0.0, 0.0), Vector2d::new(0.0, 1.0), 36.0, 18.0);
        assert_eq!(south.x, Interval::new(-9.0, 9.0));
        assert_eq!(south.y, Interval::new(-18.0, 18.0));
    }

    #[test]
    fn segment_hits() {
        let rect = Rect::from_centre(Point2d::new(50.0, 0.0), 10.0, 5.0);
        assert!(rect.hit_by_segment(Point2d::new(0.0, 0.0), Point2d::new(100.0, 0.0)));
        assert!(!rect.hit_by_segment(Point2d::new(0.0, 0.0), Point2d::new(30.0, 0.0)));
        assert!(!rect.hit_by_segment(Point2d::new(0.0, 20.0), Point2d::new(100.0, 20.0)));
        // Starting inside counts as a hit
        assert!(rect.hit_by_segment(Point2d::new(50.0, 0.0), Point2d::new(52.0, 0.0)));
    }

    #[test]
    fn overlap_is_strict() {
        let a = Rect::from_centre(Point2d::new(0.0, 0.0), 5.0, 5.0);
        let b = Rect::from_centre(Point2d::new(10.0, 0.0), 5.0, 5.0);
        let c = Rect::from_centre(Point2d::new(9.0, 3.0), 5.0, 5.0);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
    }
}
