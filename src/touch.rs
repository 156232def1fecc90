//! The live-pointer record owned by the router.

use serde::Serialize;

use crate::geom::Vec2;
use crate::targets::TargetId;

pub type TouchId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TouchPhase {
    Began,
    Moved,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Touch {
    /// Provider index; reused once the touch ends.
    pub id: TouchId,
    /// Unique per contact for the life of the router.
    pub contact: u64,
    pub start_time: f64,
    pub start_position: Vec2,
    pub start_target: Option<TargetId>,
    /// Started on a surface flagged as GUI.
    pub gui: bool,

    pub position: Vec2,
    pub previous_position: Vec2,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
    /// Pixels per second over the last update.
    pub velocity: Vec2,

    pub last_update_frame: u64,
    pub last_update_time: f64,
}

impl Touch {
    pub(crate) fn new(
        id: TouchId,
        position: Vec2,
        now: f64,
        frame: u64,
        start_target: Option<TargetId>,
        gui: bool,
    ) -> Self {
        Self {
            id,
            contact: 0,
            start_time: now,
            start_position: position,
            start_target,
            gui,
            position,
            previous_position: position,
            width: 0.0,
            height: 0.0,
            angle: 0.0,
            velocity: Vec2::ZERO,
            last_update_frame: frame,
            last_update_time: now,
        }
    }

    pub(crate) fn update(&mut self, position: Vec2, now: f64, frame: u64) {
        let dt = now - self.last_update_time;
        self.previous_position = self.position;
        self.position = position;
        self.velocity = if dt > 0.0 {
            (position - self.previous_position) / dt as f32
        } else {
            Vec2::ZERO
        };
        self.last_update_frame = frame;
        self.last_update_time = now;
    }

    pub(crate) fn set_shape(&mut self, width: f32, height: f32, angle: f32) {
        self.width = width;
        self.height = height;
        self.angle = angle;
    }

    /// Movement since the previous update.
    pub fn delta(&self) -> Vec2 {
        self.position - self.previous_position
    }

    /// Movement since the touch began.
    pub fn displacement(&self) -> Vec2 {
        self.position - self.start_position
    }

    pub fn age(&self, now: f64) -> f64 {
        now - self.start_time
    }

    /// Updated within the last `stale_frames` frames.
    pub fn is_active_at(&self, frame: u64, stale_frames: u64) -> bool {
        frame.saturating_sub(self.last_update_frame) < stale_frames
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TouchEvent {
    pub phase: TouchPhase,
    pub touch: Touch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_tracks_previous_position_and_velocity() {
        let mut t = Touch::new(1, Vec2::new(10.0, 10.0), 1.0, 1, None, false);
        t.update(Vec2::new(20.0, 10.0), 1.5, 2);
        assert_eq!(t.delta(), Vec2::new(10.0, 0.0));
        assert_eq!(t.velocity, Vec2::new(20.0, 0.0));
        assert_eq!(t.displacement(), Vec2::new(10.0, 0.0));

        // same timestamp: no velocity rather than a division by zero
        t.update(Vec2::new(25.0, 10.0), 1.5, 3);
        assert_eq!(t.velocity, Vec2::ZERO);
    }

    #[test]
    fn staleness_uses_the_frame_counter() {
        let t = Touch::new(1, Vec2::ZERO, 0.0, 10, None, false);
        assert!(t.is_active_at(10, 2));
        assert!(t.is_active_at(11, 2));
        assert!(!t.is_active_at(12, 2));
    }
}
