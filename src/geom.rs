//! Screen-space geometry on top of `glam`. Pixels, y down.

use serde::Serialize;

pub use glam::Vec2;

/// Signed angle in degrees rotating `from` onto `to`; zero when either has no direction.
pub fn signed_angle_deg(from: Vec2, to: Vec2) -> f32 {
    if from == Vec2::ZERO || to == Vec2::ZERO {
        return 0.0;
    }
    from.angle_to(to).to_degrees()
}

/// Axis-aligned rectangle in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            min: Vec2::new(x, y),
            max: Vec2::new(x + width, y + height),
        }
    }

    /// Edges count as inside.
    pub fn contains(&self, p: Vec2) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_angle_quarter_turn() {
        let a = signed_angle_deg(Vec2::X, Vec2::Y);
        assert!((a - 90.0).abs() < 1e-3, "{a}");
        let b = signed_angle_deg(Vec2::X, Vec2::NEG_Y);
        assert!((b + 90.0).abs() < 1e-3, "{b}");
        assert_eq!(signed_angle_deg(Vec2::ZERO, Vec2::X), 0.0);
    }

    #[test]
    fn rect_contains_edges() {
        let r = Rect::new(10.0, 10.0, 20.0, 5.0);
        assert!(r.contains(Vec2::new(10.0, 10.0)));
        assert!(r.contains(Vec2::new(30.0, 15.0)));
        assert!(!r.contains(Vec2::new(30.1, 12.0)));
    }
}
