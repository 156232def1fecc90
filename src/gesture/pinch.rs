use serde::{Deserialize, Serialize};

use super::driver::{Instance, Recognise};
use super::group::Group;
use super::{FrameCtx, GestureConfig, GestureDetails, GestureKind, GestureState};

/// Gap changes at or below this many pixels do not count as pinching.
const GAP_NOISE_PX: f32 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinchConfig {
    pub max_simultaneous: usize,
    /// 0..1; how far from exactly opposite the two fingers may move.
    pub direction_tolerance: f32,
    /// Screen units the gap must change by before the pinch starts.
    pub min_distance: f32,
}

impl Default for PinchConfig {
    fn default() -> Self {
        Self {
            max_simultaneous: 0,
            direction_tolerance: 0.3,
            min_distance: 0.2,
        }
    }
}

#[derive(Debug, Default)]
pub struct PinchState {
    /// Pixels between the two fingers.
    pub start_gap: f32,
    pub gap: f32,
    pub last_gap: f32,
}

fn gap(group: &Group) -> Option<f32> {
    Some((group.get(1)?.position - group.get(0)?.position).length())
}

impl Recognise for PinchConfig {
    type Data = PinchState;

    const KIND: GestureKind = GestureKind::Pinch;
    const CONTINUOUS: bool = true;

    fn from_config(cfg: &GestureConfig) -> Self {
        cfg.pinch.clone()
    }

    fn fingers(&self) -> usize {
        2
    }

    fn max_simultaneous(&self) -> usize {
        self.max_simultaneous
    }

    fn init(&self, inst: &mut Instance<PinchState>, group: &Group, _ctx: &FrameCtx) {
        let g = gap(group).unwrap_or(0.0);
        inst.data = PinchState {
            start_gap: g,
            gap: g,
            last_gap: g,
        };
    }

    fn observe(&self, inst: &mut Instance<PinchState>, group: &Group, _ctx: &FrameCtx) {
        inst.data.last_gap = inst.data.gap;
        if let Some(g) = gap(group) {
            inst.data.gap = g;
        }
    }

    fn can_begin(&self, inst: &Instance<PinchState>, group: &Group, ctx: &FrameCtx) -> bool {
        group.len() == 2
            && group.all_moving()
            && group.opposite_direction(self.direction_tolerance)
            && ctx.to_units((inst.data.gap - inst.data.start_gap).abs()) >= self.min_distance
    }

    fn recognise(&self, inst: &Instance<PinchState>, group: &Group, _ctx: &FrameCtx) -> GestureState {
        match group.len() {
            0 | 1 => return GestureState::Ended,
            2 => {}
            _ => return GestureState::Failed,
        }
        if !group.all_moving() {
            return GestureState::Recognised;
        }
        let delta = inst.data.gap - inst.data.last_gap;
        if delta.abs() > GAP_NOISE_PX && !group.opposite_direction(self.direction_tolerance) {
            return GestureState::Ended;
        }
        GestureState::InProgress
    }

    fn details(&self, inst: &Instance<PinchState>) -> GestureDetails {
        GestureDetails::Pinch {
            start_gap: inst.data.start_gap,
            gap: inst.data.gap,
            delta_gap: inst.data.gap - inst.data.last_gap,
        }
    }
}
