use serde::{Deserialize, Serialize};

use super::driver::{Instance, Recognise};
use super::group::Group;
use super::{FrameCtx, GestureConfig, GestureDetails, GestureKind, GestureState};

const SAME_DIRECTION_TOLERANCE: f32 = 0.35;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragConfig {
    pub fingers: usize,
    pub max_simultaneous: usize,
    /// Screen units the touches must travel before a drag starts.
    pub move_tolerance: f32,
    /// Multi-finger drags end when the fingers stop moving together.
    pub same_direction: bool,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            fingers: 1,
            max_simultaneous: 0,
            move_tolerance: 0.01,
            same_direction: false,
        }
    }
}

impl DragConfig {
    fn diverging(&self, group: &Group) -> bool {
        self.fingers >= 2
            && self.same_direction
            && !group.same_direction(SAME_DIRECTION_TOLERANCE)
    }
}

impl Recognise for DragConfig {
    type Data = ();

    const KIND: GestureKind = GestureKind::Drag;
    const CONTINUOUS: bool = true;

    fn from_config(cfg: &GestureConfig) -> Self {
        cfg.drag.clone()
    }

    fn fingers(&self) -> usize {
        self.fingers
    }

    fn max_simultaneous(&self) -> usize {
        self.max_simultaneous
    }

    fn can_begin(&self, _inst: &Instance<()>, group: &Group, ctx: &FrameCtx) -> bool {
        group.len() == self.fingers
            && ctx.to_units(group.avg_displacement().length()) > self.move_tolerance
            && group.all_moving()
            && !self.diverging(group)
    }

    fn recognise(&self, _inst: &Instance<()>, group: &Group, _ctx: &FrameCtx) -> GestureState {
        if group.len() != self.fingers {
            return GestureState::Ended;
        }
        if !group.all_moving() {
            return GestureState::Recognised;
        }
        if self.diverging(group) {
            return GestureState::Ended;
        }
        GestureState::InProgress
    }

    fn details(&self, inst: &Instance<()>) -> GestureDetails {
        GestureDetails::Drag {
            delta: inst.position - inst.previous_position,
            moved: inst.moved(),
        }
    }
}
