use serde::{Deserialize, Serialize};

use super::driver::{Instance, Recognise};
use super::group::Group;
use super::{FrameCtx, GestureConfig, GestureDetails, GestureKind, GestureState};
use crate::geom::Vec2;

/// Fingers lifted part way through a multi-tap fail it after this long.
const PARTIAL_LIFT_GRACE: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    pub fingers: usize,
    pub max_simultaneous: usize,
    pub required_taps: u32,
    /// Screen units the touches may wander while down.
    pub move_tolerance: f32,
    /// Seconds for the whole gesture; zero disables.
    pub max_duration: f64,
    /// Seconds allowed between taps of a multi-tap; zero disables.
    pub max_delay_between_taps: f64,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            fingers: 1,
            max_simultaneous: 0,
            required_taps: 1,
            move_tolerance: 0.02,
            max_duration: 0.5,
            max_delay_between_taps: 0.2,
        }
    }
}

#[derive(Debug, Default)]
pub struct TapState {
    pub taps: u32,
    pub down: bool,
    pub last_down: f64,
    pub last_tap: f64,
}

impl TapConfig {
    fn timed_out(&self, inst: &Instance<TapState>, now: f64) -> bool {
        if self.max_duration > 0.0 && inst.elapsed(now) > self.max_duration {
            return true;
        }
        self.required_taps > 1
            && self.max_delay_between_taps > 0.0
            && now - inst.data.last_tap > self.max_delay_between_taps
    }

    fn strayed(&self, inst: &Instance<TapState>, group: &Group, ctx: &FrameCtx) -> bool {
        let centre = group.avg_position().unwrap_or(inst.start_position);
        ctx.to_units((centre - inst.start_position).length()) >= self.move_tolerance
    }

    fn single(&self, inst: &Instance<TapState>, group: &Group, ctx: &FrameCtx) -> GestureState {
        if group.len() != self.fingers {
            return if group.is_empty() {
                GestureState::Ended
            } else {
                GestureState::Failed
            };
        }
        if self.timed_out(inst, ctx.now) || self.strayed(inst, group, ctx) {
            return GestureState::Failed;
        }
        GestureState::InProgress
    }

    fn multi(&self, inst: &Instance<TapState>, group: &Group, ctx: &FrameCtx) -> GestureState {
        let st = &inst.data;
        if !st.down && !group.is_empty() && ctx.now - st.last_down > PARTIAL_LIFT_GRACE {
            return GestureState::Failed;
        }
        if self.timed_out(inst, ctx.now) {
            return GestureState::Failed;
        }
        if st.down {
            if self.strayed(inst, group, ctx) {
                return GestureState::Failed;
            }
        } else if st.taps >= self.required_taps {
            return GestureState::Ended;
        }
        GestureState::InProgress
    }
}

impl Recognise for TapConfig {
    type Data = TapState;

    const KIND: GestureKind = GestureKind::Tap;
    const CONTINUOUS: bool = false;

    fn from_config(cfg: &GestureConfig) -> Self {
        cfg.tap.clone()
    }

    fn fingers(&self) -> usize {
        self.fingers
    }

    fn max_simultaneous(&self) -> usize {
        self.max_simultaneous
    }

    fn init(&self, inst: &mut Instance<TapState>, _group: &Group, ctx: &FrameCtx) {
        inst.data.last_down = ctx.now;
        inst.data.last_tap = ctx.now;
    }

    fn observe(&self, inst: &mut Instance<TapState>, group: &Group, ctx: &FrameCtx) {
        let was_down = inst.data.down;
        inst.data.down = group.len() == self.fingers;
        if inst.data.down {
            inst.data.last_down = ctx.now;
        } else if was_down && group.is_empty() {
            inst.data.last_tap = ctx.now;
            inst.data.taps += 1;
        }
    }

    fn recognise(&self, inst: &Instance<TapState>, group: &Group, ctx: &FrameCtx) -> GestureState {
        if self.required_taps > 1 {
            self.multi(inst, group, ctx)
        } else {
            self.single(inst, group, ctx)
        }
    }

    fn details(&self, inst: &Instance<TapState>) -> GestureDetails {
        GestureDetails::Tap {
            taps: inst.data.taps,
        }
    }

    fn adopt_distance(&self, inst: &Instance<TapState>, at: Vec2, ctx: &FrameCtx) -> Option<f32> {
        if inst.state != GestureState::InProgress || inst.data.down {
            return None;
        }
        let d = (inst.position - at).length();
        (ctx.to_units(d) < self.move_tolerance).then_some(d)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{Rig, phases};
    use super::*;
    use crate::gesture::GesturePhase;

    const HERE: Vec2 = Vec2::new(300.0, 300.0);

    #[test]
    fn quick_release_in_place_completes() {
        let mut rig = Rig::with(TapConfig::default());
        rig.input.press(0, HERE);
        assert!(rig.tick(0.0).is_empty());
        assert_eq!(rig.engine.active(GestureKind::Tap), 1);

        rig.input.release(0);
        let events = rig.tick(0.1);
        assert_eq!(phases(&events, GestureKind::Tap), vec![GesturePhase::Completed]);
        assert_eq!(events[0].details, GestureDetails::Tap { taps: 1 });
        assert_eq!(rig.engine.active(GestureKind::Tap), 0);
    }

    #[test]
    fn moving_before_release_fails_once() {
        let mut rig = Rig::with(TapConfig::default());
        rig.input.press(0, HERE);
        rig.tick(0.0);
        // 30 px on a 1000 px screen is beyond 0.02
        rig.input.move_to(0, HERE + Vec2::new(30.0, 0.0));
        let events = rig.tick(0.05);
        assert_eq!(phases(&events, GestureKind::Tap), vec![GesturePhase::Failed]);

        rig.input.release(0);
        assert!(rig.tick(0.1).is_empty());
    }

    #[test]
    fn holding_too_long_fails() {
        let mut rig = Rig::with(TapConfig::default());
        rig.input.press(0, HERE);
        rig.tick(0.0);
        assert!(rig.tick(0.3).is_empty());
        assert_eq!(phases(&rig.tick(0.6), GestureKind::Tap), vec![GesturePhase::Failed]);
    }

    #[test]
    fn double_tap_adopts_the_second_contact() {
        let mut rig = Rig::with(TapConfig {
            required_taps: 2,
            ..TapConfig::default()
        });
        rig.input.press(0, HERE);
        rig.tick(0.0);
        rig.input.release(0);
        assert!(rig.tick(0.05).is_empty());
        assert_eq!(rig.engine.active(GestureKind::Tap), 1);

        rig.input.press(1, HERE + Vec2::new(5.0, 0.0));
        assert!(rig.tick(0.1).is_empty());
        assert_eq!(rig.engine.active(GestureKind::Tap), 1);

        rig.input.release(1);
        let events = rig.tick(0.15);
        assert_eq!(phases(&events, GestureKind::Tap), vec![GesturePhase::Completed]);
        assert_eq!(events[0].details, GestureDetails::Tap { taps: 2 });
    }

    #[test]
    fn unrelated_contact_on_a_reused_slot_leaves_a_waiting_tap_alone() {
        for far_slot in [1, 0] {
            let mut rig = Rig::with(TapConfig {
                required_taps: 2,
                max_duration: 0.0,
                max_delay_between_taps: 1.0,
                ..TapConfig::default()
            });
            rig.input.press(0, HERE);
            rig.tick(0.0);
            rig.input.release(0);
            rig.tick(0.05);

            rig.input.press(far_slot, Vec2::new(900.0, 900.0));
            assert!(rig.tick(0.1).is_empty(), "slot {far_slot}");
            rig.input.release(far_slot);
            assert!(rig.tick(0.15).is_empty(), "slot {far_slot}");

            rig.input.press(0, HERE + Vec2::new(5.0, 0.0));
            assert!(rig.tick(0.2).is_empty(), "slot {far_slot}");
            rig.input.release(0);
            let outcome: Vec<_> = rig
                .tick(0.25)
                .iter()
                .map(|e| (e.instance, e.phase, e.details.clone()))
                .collect();
            assert_eq!(
                outcome,
                vec![(1, GesturePhase::Completed, GestureDetails::Tap { taps: 2 })],
                "slot {far_slot}"
            );
        }
    }

    #[test]
    fn double_tap_times_out_between_taps() {
        let mut rig = Rig::with(TapConfig {
            required_taps: 2,
            ..TapConfig::default()
        });
        rig.input.press(0, HERE);
        rig.tick(0.0);
        rig.input.release(0);
        rig.tick(0.05);
        assert_eq!(phases(&rig.tick(0.3), GestureKind::Tap), vec![GesturePhase::Failed]);
    }

    #[test]
    fn max_simultaneous_caps_new_instances() {
        let mut rig = Rig::with(TapConfig {
            max_simultaneous: 1,
            ..TapConfig::default()
        });
        rig.input.press(0, HERE);
        rig.input.press(1, Vec2::new(900.0, 900.0));
        rig.tick(0.0);
        assert_eq!(rig.engine.active(GestureKind::Tap), 1);

        rig.input.release(0);
        rig.input.release(1);
        let events = rig.tick(0.1);
        assert_eq!(phases(&events, GestureKind::Tap), vec![GesturePhase::Completed]);

        // the cap frees up once the instance is gone
        rig.input.press(1, Vec2::new(900.0, 900.0));
        rig.tick(0.2);
        assert_eq!(rig.engine.active(GestureKind::Tap), 1);
    }

    #[test]
    fn two_finger_tap_uses_the_cluster() {
        let mut rig = Rig::with(TapConfig {
            fingers: 2,
            ..TapConfig::default()
        });
        rig.input.press(0, HERE);
        rig.input.press(1, HERE + Vec2::new(40.0, 0.0));
        rig.tick(0.0);
        assert_eq!(rig.engine.active(GestureKind::Tap), 1);

        rig.input.release(0);
        rig.input.release(1);
        let events = rig.tick(0.1);
        assert_eq!(phases(&events, GestureKind::Tap), vec![GesturePhase::Completed]);
        assert_eq!(events[0].position, HERE + Vec2::new(20.0, 0.0));
    }
}
