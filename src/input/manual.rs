use super::{InputProvider, InputSample};
use crate::geom::Vec2;

/// Samples set programmatically; used by embedders and tests.
#[derive(Debug, Clone)]
pub struct ManualInput {
    slots: Vec<InputSample>,
}

impl ManualInput {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![InputSample::UP; capacity],
        }
    }

    pub fn set(&mut self, index: usize, sample: InputSample) {
        if let Some(s) = self.slots.get_mut(index) {
            *s = sample;
        }
    }

    pub fn press(&mut self, index: usize, position: Vec2) {
        self.set(index, InputSample::down_at(position));
    }

    /// Moves a held input; an input that is up stays up.
    pub fn move_to(&mut self, index: usize, position: Vec2) {
        if let Some(s) = self.slots.get_mut(index) {
            s.position = position;
        }
    }

    pub fn release(&mut self, index: usize) {
        if let Some(s) = self.slots.get_mut(index) {
            s.down = false;
        }
    }
}

impl InputProvider for ManualInput {
    fn name(&self) -> &str {
        "manual"
    }

    fn max_inputs(&self) -> usize {
        self.slots.len()
    }

    fn sample(&mut self, index: usize) -> InputSample {
        self.slots.get(index).copied().unwrap_or(InputSample::UP)
    }
}
