use crate::types::{Point, Value};

// linearly map a number from one range to another
pub fn remap(s: Value, range_in: [Value; 2], range_out: [Value; 2]) -> Value {
    range_out[0] + (s - range_in[0]) * (range_out[1] - range_out[0]) / (range_in[1] - range_in[0])
}

// Map raw noise in [-1, 1] onto an iso-value in [0, 1]
pub fn normalize_noise(v: Value) -> Value {
    remap(v, [-1., 1.], [0., 1.]).clamp(0., 1.)
}

// Linear interpolation
pub fn lerp(a: Value, b: Value, t: Value) -> Value {
    a + (b - a) * t
}

// Linearly interpolate between two points by factor t
pub fn interpolate_points(p0: Point, p1: Point, t: Value) -> Point {
    Point::new(lerp(p0.x, p1.x, t), lerp(p0.y, p1.y, t), lerp(p0.z, p1.z, t))
}

// Edge vertices sit halfway between their corners; field values are ignored
pub fn midpoint(p0: Point, p1: Point) -> Point {
    interpolate_points(p0, p1, 0.5)
}
