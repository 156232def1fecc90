use serde::{Deserialize, Serialize};

use super::driver::{Instance, Recognise};
use super::group::Group;
use super::{FrameCtx, GestureConfig, GestureDetails, GestureKind, GestureState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongPressConfig {
    pub fingers: usize,
    pub max_simultaneous: usize,
    /// Seconds the touches must be held.
    pub duration: f64,
    /// Screen units the touches may wander.
    pub move_tolerance: f32,
}

impl Default for LongPressConfig {
    fn default() -> Self {
        Self {
            fingers: 1,
            max_simultaneous: 0,
            duration: 1.0,
            move_tolerance: 0.01,
        }
    }
}

impl Recognise for LongPressConfig {
    type Data = ();

    const KIND: GestureKind = GestureKind::LongPress;
    const CONTINUOUS: bool = false;

    fn from_config(cfg: &GestureConfig) -> Self {
        cfg.long_press.clone()
    }

    fn fingers(&self) -> usize {
        self.fingers
    }

    fn max_simultaneous(&self) -> usize {
        self.max_simultaneous
    }

    fn supports_clustering(&self) -> bool {
        false
    }

    fn recognise(&self, inst: &Instance<()>, group: &Group, ctx: &FrameCtx) -> GestureState {
        if group.len() != self.fingers {
            return GestureState::Failed;
        }
        // movement is judged before time so a drifting hold never completes
        if ctx.to_units(group.avg_displacement().length()) > self.move_tolerance {
            return GestureState::Failed;
        }
        if inst.elapsed(ctx.now) >= self.duration {
            return GestureState::Ended;
        }
        GestureState::InProgress
    }

    fn details(&self, _inst: &Instance<()>) -> GestureDetails {
        GestureDetails::LongPress
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{Rig, phases};
    use super::*;
    use crate::geom::Vec2;
    use crate::gesture::GesturePhase;

    #[test]
    fn steady_hold_completes_after_duration() {
        let mut rig = Rig::with(LongPressConfig::default());
        rig.input.press(0, Vec2::new(200.0, 200.0));
        for t in [0.0, 0.25, 0.5, 0.75] {
            assert!(rig.tick(t).is_empty());
        }
        // small jitter stays inside 10 px
        rig.input.move_to(0, Vec2::new(204.0, 203.0));
        assert_eq!(
            phases(&rig.tick(1.0), GestureKind::LongPress),
            vec![GesturePhase::Completed]
        );
        assert_eq!(rig.engine.active(GestureKind::LongPress), 0);
        assert!(rig.tick(1.5).is_empty());
    }

    #[test]
    fn early_release_or_drift_fails() {
        let mut rig = Rig::with(LongPressConfig::default());
        rig.input.press(0, Vec2::new(200.0, 200.0));
        rig.input.press(1, Vec2::new(800.0, 800.0));
        rig.tick(0.0);
        rig.input.release(0);
        rig.input.move_to(1, Vec2::new(830.0, 800.0));
        assert_eq!(
            phases(&rig.tick(0.5), GestureKind::LongPress),
            vec![GesturePhase::Failed, GesturePhase::Failed]
        );
    }

    #[test]
    fn two_finger_hold_watches_every_touch() {
        let mut rig = Rig::with(LongPressConfig {
            fingers: 2,
            ..LongPressConfig::default()
        });
        rig.input.press(0, Vec2::new(200.0, 200.0));
        rig.tick(0.0);
        rig.input.press(1, Vec2::new(900.0, 900.0));
        assert!(rig.tick(0.1).is_empty());
        assert_eq!(rig.engine.active(GestureKind::LongPress), 1);
        assert_eq!(
            phases(&rig.tick(1.0), GestureKind::LongPress),
            vec![GesturePhase::Completed]
        );
    }
}
