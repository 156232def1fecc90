//! Exposes the shared TUIO cursor table as provider indices.

use log::trace;

use super::{InputProvider, InputSample};
use crate::geom::Vec2;
use crate::tuio::{CursorKind, SharedTuioTable, TuioTable, snapshot};

pub const MAX_TUIO_INPUTS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Free,
    /// Session vanished this frame; kept unassignable so the index reads as up once.
    Released,
    Bound(CursorKind, i32),
}

pub struct TuioInput {
    table: SharedTuioTable,
    screen: Vec2,
    slots: Vec<Slot>,
    frame: TuioTable,
}

impl TuioInput {
    pub fn new(table: SharedTuioTable, screen_width: f32, screen_height: f32) -> Self {
        Self {
            table,
            screen: Vec2::new(screen_width, screen_height),
            slots: vec![Slot::Free; MAX_TUIO_INPUTS],
            frame: TuioTable::default(),
        }
    }

    /// Index currently mapped to a session, if any.
    pub fn index_of(&self, kind: CursorKind, session: i32) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| *s == Slot::Bound(kind, session))
    }

    fn remap(&mut self) {
        for slot in &mut self.slots {
            match *slot {
                Slot::Released => *slot = Slot::Free,
                Slot::Bound(k, s) if !self.frame.cursors.contains_key(&(k, s)) => {
                    trace!("tuio input: session {s} released");
                    *slot = Slot::Released;
                }
                _ => {}
            }
        }
        for &(kind, session) in self.frame.cursors.keys() {
            if self.slots.contains(&Slot::Bound(kind, session)) {
                continue;
            }
            match self.slots.iter().position(|s| *s == Slot::Free) {
                Some(i) => self.slots[i] = Slot::Bound(kind, session),
                // more live sessions than indices; this one waits for a free slot
                None => break,
            }
        }
    }
}

impl InputProvider for TuioInput {
    fn name(&self) -> &str {
        "tuio"
    }

    fn max_inputs(&self) -> usize {
        MAX_TUIO_INPUTS
    }

    fn begin_frame(&mut self) {
        self.frame = snapshot(&self.table);
        self.remap();
    }

    fn sample(&mut self, index: usize) -> InputSample {
        let Some(Slot::Bound(kind, session)) = self.slots.get(index).copied() else {
            return InputSample::UP;
        };
        let Some(c) = self.frame.cursors.get(&(kind, session)) else {
            return InputSample::UP;
        };
        InputSample {
            down: true,
            position: Vec2::new(c.position.x * self.screen.x, c.position.y * self.screen.y),
            width: c.width * self.screen.x,
            height: c.height * self.screen.y,
            angle: c.angle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuio::TuioCursor;

    fn put(table: &SharedTuioTable, session: i32, x: f32, y: f32) {
        let c = TuioCursor::new(CursorKind::Cursor, session, Vec2::new(x, y));
        table
            .lock()
            .unwrap()
            .cursors
            .insert((CursorKind::Cursor, session), c);
    }

    fn remove(table: &SharedTuioTable, session: i32) {
        table
            .lock()
            .unwrap()
            .cursors
            .remove(&(CursorKind::Cursor, session));
    }

    #[test]
    fn sessions_map_to_stable_indices_and_scale_to_screen() {
        let table = SharedTuioTable::default();
        let mut input = TuioInput::new(table.clone(), 1000.0, 500.0);
        put(&table, 10, 0.5, 0.5);
        put(&table, 11, 0.25, 0.5);
        input.begin_frame();
        assert_eq!(input.index_of(CursorKind::Cursor, 10), Some(0));
        assert_eq!(input.index_of(CursorKind::Cursor, 11), Some(1));
        assert_eq!(input.sample(1).position, Vec2::new(250.0, 250.0));

        remove(&table, 10);
        put(&table, 12, 0.9, 0.9);
        input.begin_frame();
        // index 0 reads as up for a frame before it can be reused
        assert!(!input.sample(0).down);
        assert_eq!(input.index_of(CursorKind::Cursor, 12), Some(2));
        assert!(input.sample(1).down);

        put(&table, 13, 0.75, 0.25);
        input.begin_frame();
        assert_eq!(input.index_of(CursorKind::Cursor, 13), Some(0));
        assert_eq!(input.sample(0).position, Vec2::new(750.0, 125.0));
    }
}
