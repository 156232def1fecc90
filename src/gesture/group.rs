//! The set of touches one gesture instance looks at in a frame.

use crate::geom::Vec2;
use crate::touch::{Touch, TouchId};

/// Frame-to-frame movement at or below this many pixels counts as still.
pub const MOVE_NOISE_PX: f32 = 1.0;

#[derive(Debug, Clone, Default)]
pub struct Group<'a> {
    touches: Vec<&'a Touch>,
}

impl<'a> Group<'a> {
    /// Oldest touch first; ties broken by id.
    pub fn new(mut touches: Vec<&'a Touch>) -> Self {
        touches.sort_by(|a, b| a.start_time.total_cmp(&b.start_time).then(a.id.cmp(&b.id)));
        Self { touches }
    }

    pub fn len(&self) -> usize {
        self.touches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.touches.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a Touch> {
        self.touches.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Touch> + '_ {
        self.touches.iter().copied()
    }

    pub fn ids(&self) -> Vec<TouchId> {
        self.touches.iter().map(|t| t.id).collect()
    }

    pub fn oldest(&self) -> Option<&'a Touch> {
        self.touches.first().copied()
    }

    pub fn avg_position(&self) -> Option<Vec2> {
        self.mean(|t| t.position)
    }

    /// Mean movement since each touch began; zero for an empty group.
    pub fn avg_displacement(&self) -> Vec2 {
        self.mean(|t| t.displacement()).unwrap_or(Vec2::ZERO)
    }

    /// Every touch moved beyond the noise floor since the previous frame.
    pub fn all_moving(&self) -> bool {
        !self.touches.is_empty()
            && self
                .touches
                .iter()
                .all(|t| t.delta().length_squared() > MOVE_NOISE_PX * MOVE_NOISE_PX)
    }

    /// Each touch's overall heading agrees with the oldest one's.
    /// Groups of fewer than two always agree.
    pub fn same_direction(&self, tolerance: f32) -> bool {
        let Some(first) = self.oldest() else {
            return true;
        };
        let min_dot = (1.0 - tolerance).max(0.1);
        let reference = first.displacement().normalize_or_zero();
        self.touches[1..]
            .iter()
            .all(|t| reference.dot(t.displacement().normalize_or_zero()) >= min_dot)
    }

    /// Exactly two touches whose last movements point away from each other.
    pub fn opposite_direction(&self, tolerance: f32) -> bool {
        let [a, b] = self.touches.as_slice() else {
            return false;
        };
        a.delta().normalize_or_zero().dot(b.delta().normalize_or_zero()) < -1.0 + tolerance.clamp(0.0, 1.0)
    }

    fn mean(&self, f: impl Fn(&Touch) -> Vec2) -> Option<Vec2> {
        if self.touches.is_empty() {
            return None;
        }
        let sum = self.touches.iter().fold(Vec2::ZERO, |acc, t| acc + f(t));
        Some(sum / self.touches.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(id: TouchId, start: f64, from: Vec2, prev: Vec2, now: Vec2) -> Touch {
        let mut t = Touch::new(id, from, start, 0, None, false);
        t.update(prev, start + 0.1, 1);
        t.update(now, start + 0.2, 2);
        t
    }

    #[test]
    fn orders_oldest_first_and_averages() {
        let a = touch(7, 1.0, Vec2::ZERO, Vec2::ZERO, Vec2::new(10.0, 0.0));
        let b = touch(3, 0.5, Vec2::ZERO, Vec2::ZERO, Vec2::new(30.0, 0.0));
        let g = Group::new(vec![&a, &b]);
        assert_eq!(g.ids(), vec![3, 7]);
        assert_eq!(g.avg_position(), Some(Vec2::new(20.0, 0.0)));
        assert_eq!(g.avg_displacement(), Vec2::new(20.0, 0.0));
        assert!(Group::default().avg_position().is_none());
    }

    #[test]
    fn movement_predicates() {
        let right = touch(1, 0.0, Vec2::ZERO, Vec2::new(5.0, 0.0), Vec2::new(10.0, 0.0));
        let right_too = touch(2, 0.0, Vec2::ZERO, Vec2::new(5.0, 1.0), Vec2::new(10.0, 1.0));
        let left = touch(3, 0.0, Vec2::ZERO, Vec2::new(-5.0, 0.0), Vec2::new(-10.0, 0.0));
        let still = touch(4, 0.0, Vec2::ZERO, Vec2::new(5.0, 0.0), Vec2::new(5.5, 0.0));

        let same = Group::new(vec![&right, &right_too]);
        assert!(same.all_moving());
        assert!(same.same_direction(0.35));
        assert!(!same.opposite_direction(0.3));

        let apart = Group::new(vec![&right, &left]);
        assert!(!apart.same_direction(0.35));
        assert!(apart.opposite_direction(0.3));

        assert!(!Group::new(vec![&right, &still]).all_moving());
        assert!(!Group::default().all_moving());
        assert!(!Group::new(vec![&right, &left, &right_too]).opposite_direction(1.0));
    }
}
