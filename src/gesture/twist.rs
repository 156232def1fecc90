use serde::{Deserialize, Serialize};

use super::driver::{Instance, Recognise};
use super::group::Group;
use super::{FrameCtx, GestureConfig, GestureDetails, GestureKind, GestureState};
use crate::geom::signed_angle_deg;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwistConfig {
    pub max_simultaneous: usize,
    /// 0..1; how far from exactly opposite the two fingers may move.
    pub direction_tolerance: f32,
    /// Degrees of accumulated rotation before the twist starts.
    pub min_rotation: f32,
}

impl Default for TwistConfig {
    fn default() -> Self {
        Self {
            max_simultaneous: 0,
            direction_tolerance: 0.3,
            min_rotation: 1.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct TwistState {
    /// Degrees, counter-clockwise on screen positive.
    pub delta_rotation: f32,
    pub total_rotation: f32,
}

/// Rotation of the line between two touches over their last move, in degrees.
fn frame_rotation(group: &Group) -> f32 {
    let (Some(a), Some(b)) = (group.get(0), group.get(1)) else {
        return 0.0;
    };
    let now = a.position - b.position;
    let before = a.previous_position - b.previous_position;
    // flip y so that positive reads counter-clockwise on a y-down screen
    -signed_angle_deg(before, now)
}

impl Recognise for TwistConfig {
    type Data = TwistState;

    const KIND: GestureKind = GestureKind::Twist;
    const CONTINUOUS: bool = true;

    fn from_config(cfg: &GestureConfig) -> Self {
        cfg.twist.clone()
    }

    fn fingers(&self) -> usize {
        2
    }

    fn max_simultaneous(&self) -> usize {
        self.max_simultaneous
    }

    fn observe(&self, inst: &mut Instance<TwistState>, group: &Group, _ctx: &FrameCtx) {
        let delta = if group.len() == 2 { frame_rotation(group) } else { 0.0 };
        inst.data.delta_rotation = delta;
        inst.data.total_rotation += delta;
    }

    fn can_begin(&self, inst: &Instance<TwistState>, group: &Group, _ctx: &FrameCtx) -> bool {
        group.len() == 2
            && group.all_moving()
            && group.opposite_direction(self.direction_tolerance)
            && inst.data.total_rotation.abs() >= self.min_rotation
    }

    fn recognise(&self, _inst: &Instance<TwistState>, group: &Group, _ctx: &FrameCtx) -> GestureState {
        if group.len() != 2 {
            return GestureState::Ended;
        }
        GestureState::InProgress
    }

    fn details(&self, inst: &Instance<TwistState>) -> GestureDetails {
        GestureDetails::Twist {
            delta_rotation: inst.data.delta_rotation,
            total_rotation: inst.data.total_rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{Rig, phases};
    use super::*;
    use crate::geom::Vec2;
    use crate::gesture::{GestureEvent, GesturePhase};

    fn on_circle(centre: Vec2, radius: f32, deg: f32) -> Vec2 {
        let r = deg.to_radians();
        // y-down screen: counter-clockwise means subtracting from y
        centre + Vec2::new(r.cos() * radius, -r.sin() * radius)
    }

    fn rotate(rig: &mut Rig, step_deg: f32, frames: usize) -> Vec<GestureEvent> {
        let centre = Vec2::new(500.0, 500.0);
        rig.input.press(0, on_circle(centre, 60.0, 0.0));
        rig.input.press(1, on_circle(centre, 60.0, 180.0));
        rig.tick(0.0);
        let mut out = vec![];
        for f in 1..=frames {
            let deg = step_deg * f as f32;
            rig.input.move_to(0, on_circle(centre, 60.0, deg));
            rig.input.move_to(1, on_circle(centre, 60.0, deg + 180.0));
            out.extend(rig.tick(f as f64 / 60.0));
        }
        out
    }

    #[test]
    fn counter_clockwise_turn_reports_positive_rotation() {
        let mut rig = Rig::with(TwistConfig::default());
        let events = rotate(&mut rig, 5.0, 4);
        assert_eq!(
            phases(&events, GestureKind::Twist),
            vec![GesturePhase::Started, GesturePhase::Updated, GesturePhase::Updated, GesturePhase::Updated]
        );
        let GestureDetails::Twist { total_rotation, delta_rotation } = events[3].details else {
            panic!("not a twist");
        };
        assert!((delta_rotation - 5.0).abs() < 0.01, "{delta_rotation}");
        assert!((total_rotation - 20.0).abs() < 0.05, "{total_rotation}");

        rig.input.release(0);
        assert_eq!(phases(&rig.tick(0.1), GestureKind::Twist), vec![GesturePhase::Completed]);
    }

    #[test]
    fn clockwise_turn_is_negative() {
        let mut rig = Rig::with(TwistConfig::default());
        let events = rotate(&mut rig, -5.0, 1);
        let GestureDetails::Twist { total_rotation, .. } = events[0].details else {
            panic!("not a twist");
        };
        assert!(total_rotation < -4.9);
    }

    #[test]
    fn sub_threshold_rotation_waits() {
        let mut rig = Rig::with(TwistConfig {
            min_rotation: 12.0,
            ..TwistConfig::default()
        });
        let events = rotate(&mut rig, 5.0, 2);
        assert!(events.is_empty());
        assert_eq!(rig.engine.active(GestureKind::Twist), 1);
    }
}
