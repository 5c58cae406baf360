//! Geometry helpers shared by the skeleton and analyzers.

pub mod content_hash;
pub mod safe_cast;

use crate::constants::EPSILON;

/// Midpoint of two points
pub fn midpoint(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

/// Euclidean distance between two points
pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Angle in degrees between two vectors, in [0, 180]
pub fn angle_between(v1: (f64, f64), v2: (f64, f64)) -> f64 {
    let dot = v1.0 * v2.0 + v1.1 * v2.1;
    let norm = v1.0.hypot(v1.1) * v2.0.hypot(v2.1) + EPSILON;
    (dot / norm).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Angle in degrees at `vertex` formed by `a`-`vertex`-`c`
pub fn angle_at(a: (f64, f64), vertex: (f64, f64), c: (f64, f64)) -> f64 {
    angle_between((a.0 - vertex.0, a.1 - vertex.1), (c.0 - vertex.0, c.1 - vertex.1))
}

/// Unsigned angle of a vector from screen-up (image y grows downward)
pub fn angle_from_up(v: (f64, f64)) -> f64 {
    angle_between(v, (0.0, -1.0))
}

/// Signed angle of a vector from screen-down, positive toward +x
///
/// 0° points straight down, 90° horizontal toward +x, ±180° straight up.
pub fn signed_angle_from_down(v: (f64, f64)) -> f64 {
    if v.0.abs() < EPSILON && v.1.abs() < EPSILON {
        return 0.0;
    }
    v.0.atan2(v.1).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_angle_at_right_angle() {
        let angle = angle_at((1.0, 0.0), (0.0, 0.0), (0.0, 1.0));
        assert_relative_eq!(angle, 90.0, epsilon = 1e-3);
    }

    #[test]
    fn test_angle_at_straight_line() {
        let angle = angle_at((-1.0, 0.0), (0.0, 0.0), (1.0, 0.0));
        assert_relative_eq!(angle, 180.0, epsilon = 1e-3);
    }

    #[test]
    fn test_angle_from_up() {
        assert_relative_eq!(angle_from_up((0.0, -5.0)), 0.0, epsilon = 1e-3);
        assert_relative_eq!(angle_from_up((5.0, 0.0)), 90.0, epsilon = 1e-3);
    }

    #[test]
    fn test_signed_angle_from_down() {
        assert_relative_eq!(signed_angle_from_down((0.0, 1.0)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(signed_angle_from_down((1.0, 0.0)), 90.0, epsilon = 1e-9);
        assert_relative_eq!(signed_angle_from_down((-1.0, 1.0)), -45.0, epsilon = 1e-9);
        assert_eq!(signed_angle_from_down((0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_midpoint_and_distance() {
        assert_eq!(midpoint((0.0, 0.0), (2.0, 4.0)), (1.0, 2.0));
        assert_relative_eq!(distance((0.0, 0.0), (3.0, 4.0)), 5.0);
    }
}
