//! Per-frame input samplers polled by the router.

pub mod manual;
pub mod mouse;
pub mod touchscreen;
pub mod tuio;

use anyhow::{Result, anyhow};
use serde::Deserialize;

use crate::geom::Vec2;

pub use manual::ManualInput;
pub use mouse::MouseInput;
pub use touchscreen::TouchscreenInput;
pub use tuio::TuioInput;

/// State of one provider index for the current frame. Positions are screen pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSample {
    pub down: bool,
    pub position: Vec2,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
}

impl InputSample {
    pub const UP: InputSample = InputSample {
        down: false,
        position: Vec2::ZERO,
        width: 0.0,
        height: 0.0,
        angle: 0.0,
    };

    pub fn down_at(position: Vec2) -> Self {
        Self {
            down: true,
            position,
            ..Self::UP
        }
    }
}

pub trait InputProvider {
    fn name(&self) -> &str;

    /// Upper bound on concurrently reported inputs; the router samples `0..max_inputs()`.
    fn max_inputs(&self) -> usize;

    /// Pulls whatever the source produced since the last frame. Called once per tick.
    fn begin_frame(&mut self) {}

    fn sample(&mut self, index: usize) -> InputSample;
}

impl<P: InputProvider + ?Sized> InputProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn max_inputs(&self) -> usize {
        (**self).max_inputs()
    }
    fn begin_frame(&mut self) {
        (**self).begin_frame()
    }
    fn sample(&mut self, index: usize) -> InputSample {
        (**self).sample(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    Tuio,
    Touch,
    Mouse,
}

impl std::str::FromStr for InputSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tuio" => Ok(InputSource::Tuio),
            "touch" => Ok(InputSource::Touch),
            "mouse" => Ok(InputSource::Mouse),
            other => Err(anyhow!("unknown input source '{other}' (tuio|touch|mouse)")),
        }
    }
}
