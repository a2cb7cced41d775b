//! Per-frame debug geometry, collected only with the `debug` feature.

use crate::math::{Point2d, Rect};
#[cfg(feature = "debug")]
use serde_json::json;

#[cfg(feature = "debug")]
thread_local!(
    static DEBUG_FRAME: std::cell::RefCell<Vec<serde_json::Value>> = Default::default();
);

#[cfg(feature = "debug")]
fn push(value: serde_json::Value) {
    DEBUG_FRAME.with(|frame| frame.borrow_mut().push(value))
}

#[allow(unused)]
pub fn debug_line(name: &str, p1: Point2d, p2: Point2d) {
    #[cfg(feature = "debug")]
    push(json!({
        "type": "line",
        "name": name,
        "p1": [p1.x, p1.y],
        "p2": [p2.x, p2.y],
    }))
}

#[allow(unused)]
pub fn debug_path(name: &str, points: &[Point2d]) {
    #[cfg(feature = "debug")]
    push(json!({
        "type": "path",
        "name": name,
        "points": points.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>(),
    }))
}

#[allow(unused)]
pub fn debug_rect(name: &str, rect: &Rect) {
    #[cfg(feature = "debug")]
    push(json!({
        "type": "rect",
        "name": name,
        "min": [rect.x.min, rect.y.min],
        "max": [rect.x.max, rect.y.max],
    }))
}

/// Drains the geometry recorded since the last call.
#[cfg(feature = "debug")]
pub fn take_debug_frame() -> serde_json::Value {
    json!(DEBUG_FRAME.with(|frame| frame.take()))
}
