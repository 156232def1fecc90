use serde::{Deserialize, Serialize};
use std::ops::BitOr;

use super::driver::{Instance, Recognise};
use super::group::{Group, MOVE_NOISE_PX};
use super::{FrameCtx, GestureConfig, GestureDetails, GestureKind, GestureState};
use crate::geom::{Vec2, signed_angle_deg};

const SAME_DIRECTION_TOLERANCE: f32 = 0.35;
/// Velocity smoothing per second of frame time.
const VELOCITY_SMOOTHING: f64 = 10.0;

/// Heading of a swipe. Screen y grows downward, so `Up` is toward the top edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeDirection {
    Right,
    UpperRight,
    Up,
    UpperLeft,
    Left,
    LowerLeft,
    Down,
    LowerRight,
}

impl SwipeDirection {
    /// Counter-clockwise from `Right`, 45 degrees apart.
    pub const COMPASS: [SwipeDirection; 8] = [
        SwipeDirection::Right,
        SwipeDirection::UpperRight,
        SwipeDirection::Up,
        SwipeDirection::UpperLeft,
        SwipeDirection::Left,
        SwipeDirection::LowerLeft,
        SwipeDirection::Down,
        SwipeDirection::LowerRight,
    ];

    /// Nearest compass direction, if the heading lies within `tolerance` (0..1 of the
    /// 22.5 degree half-sector) of it.
    pub fn from_vector(v: Vec2, tolerance: f32) -> Option<SwipeDirection> {
        if v == Vec2::ZERO {
            return None;
        }
        let max_delta = (tolerance.clamp(0.0, 1.0) * 22.5).max(0.0001);
        let mut angle = Vec2::new(v.x, -v.y).to_angle().to_degrees();
        if angle < -22.5 {
            angle += 360.0;
        }
        let sector = ((angle + 22.5) / 45.0).floor().clamp(0.0, 7.0) as usize;
        let reference = sector as f32 * 45.0;
        ((angle - reference).abs() <= max_delta).then(|| Self::COMPASS[sector])
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }

    fn name(self) -> &'static str {
        match self {
            SwipeDirection::Right => "right",
            SwipeDirection::UpperRight => "upper_right",
            SwipeDirection::Up => "up",
            SwipeDirection::UpperLeft => "upper_left",
            SwipeDirection::Left => "left",
            SwipeDirection::LowerLeft => "lower_left",
            SwipeDirection::Down => "down",
            SwipeDirection::LowerRight => "lower_right",
        }
    }
}

/// A set of swipe directions, written in profiles as a list of direction or group names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct SwipeDirections(u8);

impl SwipeDirections {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0xff);
    pub const HORIZONTAL: Self = Self(1 << SwipeDirection::Right as u8 | 1 << SwipeDirection::Left as u8);
    pub const VERTICAL: Self = Self(1 << SwipeDirection::Up as u8 | 1 << SwipeDirection::Down as u8);
    pub const CROSS: Self = Self(Self::HORIZONTAL.0 | Self::VERTICAL.0);
    pub const DIAGONALS: Self = Self(!Self::CROSS.0);

    pub fn contains(self, dir: SwipeDirection) -> bool {
        self.0 & dir.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn by_name(name: &str) -> Option<Self> {
        let group = match name {
            "all" => Self::ALL,
            "none" => Self::NONE,
            "horizontal" => Self::HORIZONTAL,
            "vertical" => Self::VERTICAL,
            "cross" => Self::CROSS,
            "diagonals" => Self::DIAGONALS,
            other => {
                let dir = SwipeDirection::COMPASS.into_iter().find(|d| d.name() == other)?;
                return Some(dir.into());
            }
        };
        Some(group)
    }
}

impl From<SwipeDirection> for SwipeDirections {
    fn from(dir: SwipeDirection) -> Self {
        Self(dir.bit())
    }
}

impl BitOr for SwipeDirections {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl TryFrom<Vec<String>> for SwipeDirections {
    type Error = String;

    fn try_from(names: Vec<String>) -> Result<Self, String> {
        names.iter().try_fold(Self::NONE, |acc, n| {
            Self::by_name(n)
                .map(|d| acc | d)
                .ok_or_else(|| format!("unknown swipe direction '{n}'"))
        })
    }
}

impl From<SwipeDirections> for Vec<String> {
    fn from(dirs: SwipeDirections) -> Self {
        if dirs == SwipeDirections::ALL {
            return vec!["all".into()];
        }
        SwipeDirection::COMPASS
            .into_iter()
            .filter(|d| dirs.contains(*d))
            .map(|d| d.name().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwipeConfig {
    pub fingers: usize,
    pub max_simultaneous: usize,
    /// Screen units the swipe must cover.
    pub min_distance: f32,
    /// Screen units beyond which it fails; ignored unless above `min_distance`.
    pub max_distance: f32,
    /// Screen units per second.
    pub min_velocity: f32,
    /// Degrees the heading may drift from where it started.
    pub max_deviation: f32,
    pub valid_directions: SwipeDirections,
}

impl Default for SwipeConfig {
    fn default() -> Self {
        Self {
            fingers: 1,
            max_simultaneous: 0,
            min_distance: 0.01,
            max_distance: 0.0,
            min_velocity: 0.1,
            max_deviation: 25.0,
            valid_directions: SwipeDirections::ALL,
        }
    }
}

#[derive(Debug, Default)]
pub struct SwipeState {
    /// Smoothed pixels per second.
    pub velocity: f32,
    pub direction: Option<SwipeDirection>,
    pub deviation: f32,
    heading: Option<Vec2>,
}

impl Recognise for SwipeConfig {
    type Data = SwipeState;

    const KIND: GestureKind = GestureKind::Swipe;
    const CONTINUOUS: bool = false;

    fn from_config(cfg: &GestureConfig) -> Self {
        cfg.swipe.clone()
    }

    fn fingers(&self) -> usize {
        self.fingers
    }

    fn max_simultaneous(&self) -> usize {
        self.max_simultaneous
    }

    fn observe(&self, inst: &mut Instance<SwipeState>, _group: &Group, ctx: &FrameCtx) {
        let moved = inst.moved();
        let st = &mut inst.data;
        if ctx.dt > 0.0 {
            let raw = (inst.position - inst.previous_position).length() / ctx.dt as f32;
            let t = (ctx.dt * VELOCITY_SMOOTHING).min(1.0) as f32;
            st.velocity += (raw - st.velocity) * t;
        }
        if moved != Vec2::ZERO {
            let heading = *st.heading.get_or_insert(moved);
            st.deviation = signed_angle_deg(heading, moved);
        }
        st.direction = SwipeDirection::from_vector(moved, 1.0);
    }

    fn can_begin(&self, _inst: &Instance<SwipeState>, group: &Group, _ctx: &FrameCtx) -> bool {
        group.len() == self.fingers
            && group.avg_displacement().length() >= MOVE_NOISE_PX
            && group.all_moving()
            && group.same_direction(SAME_DIRECTION_TOLERANCE)
    }

    fn recognise(&self, inst: &Instance<SwipeState>, group: &Group, ctx: &FrameCtx) -> GestureState {
        let distance = ctx.to_units(inst.moved().length());
        if group.len() > self.fingers {
            return GestureState::Failed;
        }
        if group.len() < self.fingers {
            let valid = inst
                .data
                .direction
                .is_some_and(|d| self.valid_directions.contains(d));
            return if distance >= self.min_distance && valid {
                GestureState::Ended
            } else {
                GestureState::Failed
            };
        }
        if self.max_distance > self.min_distance && distance > self.max_distance {
            return GestureState::Failed;
        }
        if distance > self.min_distance && ctx.to_units(inst.data.velocity) < self.min_velocity {
            return GestureState::Failed;
        }
        if distance > self.min_distance * 2.0 && inst.data.deviation.abs() > self.max_deviation {
            return GestureState::Failed;
        }
        GestureState::InProgress
    }

    fn details(&self, inst: &Instance<SwipeState>) -> GestureDetails {
        GestureDetails::Swipe {
            moved: inst.moved(),
            direction: inst.data.direction,
            velocity: inst.data.velocity,
            deviation: inst.data.deviation,
        }
    }
}
