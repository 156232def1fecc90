//! Applies `alive`/`set`/`fseq` framing to a shared cursor table.

use log::{debug, trace, warn};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, PoisonError},
};

use super::cursor::{CursorKind, TuioCommand, TuioCursor, TuioError};
use crate::osc::OscMessage;

/// A backwards `fseq` jump larger than this is taken as a tracker restart.
const FSEQ_RESTART_JUMP: i32 = 100;

/// The published set of live cursors. Replaced atomically under its lock on each frame.
#[derive(Debug, Clone, Default)]
pub struct TuioTable {
    pub cursors: BTreeMap<(CursorKind, i32), TuioCursor>,
    /// Number of frames applied so far, across both profiles.
    pub frames: u64,
}

pub type SharedTuioTable = Arc<Mutex<TuioTable>>;

/// Copies the table; the lock is held only for the clone.
pub fn snapshot(table: &SharedTuioTable) -> TuioTable {
    table.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Outcome of one applied frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TuioFrame {
    pub kind: Option<CursorKind>,
    pub fseq: i32,
    pub added: Vec<TuioCursor>,
    pub updated: Vec<TuioCursor>,
    pub held: Vec<i32>,
    pub removed: Vec<TuioCursor>,
}

#[derive(Debug, Default)]
struct ProfileState {
    /// Alive list of the last accepted frame.
    alive: Vec<i32>,
    /// Alive list of the frame being received; applied once its `fseq` is accepted.
    staged_alive: Option<Vec<i32>>,
    pending: HashMap<i32, TuioCursor>,
    current: BTreeMap<i32, TuioCursor>,
    last_fseq: Option<i32>,
    source: Option<String>,
}

pub struct TuioTracker {
    profiles: HashMap<CursorKind, ProfileState>,
    shared: SharedTuioTable,
}

impl Default for TuioTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TuioTracker {
    pub fn new() -> Self {
        Self::with_table(SharedTuioTable::default())
    }

    pub fn with_table(shared: SharedTuioTable) -> Self {
        Self {
            profiles: CursorKind::ALL
                .into_iter()
                .map(|k| (k, ProfileState::default()))
                .collect(),
            shared,
        }
    }

    pub fn table(&self) -> SharedTuioTable {
        self.shared.clone()
    }

    /// Feeds one TUIO message. Returns the diff when the message completed a frame.
    pub fn handle(&mut self, msg: &OscMessage) -> Result<Option<TuioFrame>, TuioError> {
        let Some(kind) = CursorKind::from_address(&msg.addr) else {
            return Ok(None);
        };
        let command = TuioCommand::parse(kind, msg)?;
        let st = self.profiles.entry(kind).or_default();
        match command {
            TuioCommand::Source(s) => {
                if st.source.as_deref() != Some(s.as_str()) {
                    debug!("tuio: {} source {s}", kind.address());
                    st.source = Some(s);
                }
                Ok(None)
            }
            TuioCommand::Alive(ids) => {
                st.staged_alive = Some(ids);
                Ok(None)
            }
            TuioCommand::Set(cursor) => {
                let alive = st.staged_alive.as_ref().unwrap_or(&st.alive);
                if !alive.contains(&cursor.session) {
                    debug!(
                        "tuio: {} set for session {} which is not alive, ignored",
                        kind.address(),
                        cursor.session
                    );
                    return Ok(None);
                }
                st.pending.insert(cursor.session, cursor);
                Ok(None)
            }
            TuioCommand::Fseq(fseq) => {
                if is_late(st.last_fseq, fseq) {
                    warn!(
                        "tuio: {} late frame {fseq} (last {:?}) discarded",
                        kind.address(),
                        st.last_fseq
                    );
                    st.staged_alive = None;
                    st.pending.clear();
                    return Ok(None);
                }
                if fseq != -1 {
                    st.last_fseq = Some(fseq);
                }
                if let Some(alive) = st.staged_alive.take() {
                    st.alive = alive;
                }
                let frame = diff_frame(kind, fseq, st);
                self.publish(kind, &frame);
                Ok(Some(frame))
            }
        }
    }

    fn publish(&self, kind: CursorKind, frame: &TuioFrame) {
        let mut table = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        for c in &frame.removed {
            table.cursors.remove(&(kind, c.session));
        }
        for c in frame.updated.iter().chain(&frame.added) {
            table.cursors.insert((kind, c.session), c.clone());
        }
        table.frames += 1;
    }
}

fn is_late(last: Option<i32>, fseq: i32) -> bool {
    match last {
        None => false,
        Some(_) if fseq == -1 => false,
        Some(last) => fseq < last && last - fseq <= FSEQ_RESTART_JUMP,
    }
}

fn diff_frame(kind: CursorKind, fseq: i32, st: &mut ProfileState) -> TuioFrame {
    let mut frame = TuioFrame {
        kind: Some(kind),
        fseq,
        ..TuioFrame::default()
    };

    let gone: Vec<i32> = st
        .current
        .keys()
        .copied()
        .filter(|id| !st.alive.contains(id))
        .collect();
    for id in gone {
        if let Some(c) = st.current.remove(&id) {
            frame.removed.push(c);
        }
    }

    for id in &st.alive {
        let known = st.current.contains_key(id);
        match st.pending.remove(id) {
            None if known => frame.held.push(*id),
            // alive but never described; wait for its first set
            None => {}
            Some(new) if st.current.get(id) == Some(&new) => frame.held.push(*id),
            Some(new) => {
                st.current.insert(*id, new.clone());
                if known {
                    frame.updated.push(new);
                } else {
                    frame.added.push(new);
                }
            }
        }
    }
    st.pending.clear();

    trace!(
        "tuio: {} fseq {fseq}: +{} ~{} ={} -{}",
        kind.address(),
        frame.added.len(),
        frame.updated.len(),
        frame.held.len(),
        frame.removed.len()
    );
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Vec2;

    fn cur(session: i32, x: f32, y: f32) -> TuioCursor {
        TuioCursor::new(CursorKind::Cursor, session, Vec2::new(x, y))
    }

    fn feed(t: &mut TuioTracker, msgs: Vec<OscMessage>) -> Option<TuioFrame> {
        let mut last = None;
        for m in msgs {
            if let Some(f) = t.handle(&m).unwrap() {
                last = Some(f);
            }
        }
        last
    }

    fn ids(cs: &[TuioCursor]) -> Vec<i32> {
        cs.iter().map(|c| c.session).collect()
    }

    #[test]
    fn added_updated_held_removed_across_frames() {
        let k = CursorKind::Cursor;
        let mut t = TuioTracker::new();

        let f1 = feed(
            &mut t,
            vec![
                TuioCommand::alive_message(k, &[1, 2]),
                cur(1, 0.1, 0.1).to_set_message(),
                cur(2, 0.5, 0.5).to_set_message(),
                TuioCommand::fseq_message(k, 1),
            ],
        )
        .unwrap();
        assert_eq!(ids(&f1.added), vec![1, 2]);
        assert!(f1.updated.is_empty() && f1.removed.is_empty());

        let f2 = feed(
            &mut t,
            vec![
                TuioCommand::alive_message(k, &[1, 2]),
                cur(1, 0.2, 0.1).to_set_message(),
                TuioCommand::fseq_message(k, 2),
            ],
        )
        .unwrap();
        assert_eq!(ids(&f2.updated), vec![1]);
        assert_eq!(f2.held, vec![2]);
        assert!(f2.added.is_empty() && f2.removed.is_empty());

        let f3 = feed(
            &mut t,
            vec![
                TuioCommand::alive_message(k, &[1]),
                TuioCommand::fseq_message(k, 3),
            ],
        )
        .unwrap();
        assert_eq!(ids(&f3.removed), vec![2]);
        assert_eq!(f3.held, vec![1]);
        assert!(f3.added.is_empty() && f3.updated.is_empty());

        let table = snapshot(&t.table());
        assert_eq!(table.frames, 3);
        assert_eq!(table.cursors.len(), 1);
        assert_eq!(table.cursors[&(k, 1)].position, Vec2::new(0.2, 0.1));
    }

    #[test]
    fn identical_set_counts_as_held() {
        let k = CursorKind::Cursor;
        let mut t = TuioTracker::new();
        let frame = |fseq| {
            vec![
                TuioCommand::alive_message(k, &[5]),
                cur(5, 0.3, 0.3).to_set_message(),
                TuioCommand::fseq_message(k, fseq),
            ]
        };
        feed(&mut t, frame(1));
        let f = feed(&mut t, frame(2)).unwrap();
        assert_eq!(f.held, vec![5]);
        assert!(f.updated.is_empty());
    }

    #[test]
    fn late_frames_are_dropped_but_restarts_are_not() {
        let k = CursorKind::Cursor;
        let mut t = TuioTracker::new();
        feed(
            &mut t,
            vec![
                TuioCommand::alive_message(k, &[1]),
                cur(1, 0.1, 0.1).to_set_message(),
                TuioCommand::fseq_message(k, 500),
            ],
        );
        let late = feed(
            &mut t,
            vec![
                cur(1, 0.9, 0.9).to_set_message(),
                TuioCommand::fseq_message(k, 450),
            ],
        );
        assert!(late.is_none());
        assert_eq!(
            snapshot(&t.table()).cursors[&(k, 1)].position,
            Vec2::new(0.1, 0.1)
        );

        let restart = feed(
            &mut t,
            vec![
                cur(1, 0.4, 0.4).to_set_message(),
                TuioCommand::fseq_message(k, 2),
            ],
        )
        .unwrap();
        assert_eq!(ids(&restart.updated), vec![1]);
    }

    #[test]
    fn late_alive_list_does_not_leak_into_the_next_frame() {
        let k = CursorKind::Cursor;
        let mut t = TuioTracker::new();
        feed(
            &mut t,
            vec![
                TuioCommand::alive_message(k, &[1, 2]),
                cur(1, 0.1, 0.1).to_set_message(),
                cur(2, 0.5, 0.5).to_set_message(),
                TuioCommand::fseq_message(k, 10),
            ],
        );
        let late = feed(
            &mut t,
            vec![
                TuioCommand::alive_message(k, &[1]),
                TuioCommand::fseq_message(k, 8),
            ],
        );
        assert!(late.is_none());

        let next = feed(
            &mut t,
            vec![
                cur(2, 0.6, 0.5).to_set_message(),
                TuioCommand::fseq_message(k, 11),
            ],
        )
        .unwrap();
        assert!(next.removed.is_empty());
        assert_eq!(ids(&next.updated), vec![2]);
        assert_eq!(next.held, vec![1]);
        assert_eq!(snapshot(&t.table()).cursors.len(), 2);
    }

    #[test]
    fn set_for_dead_session_is_ignored_and_profiles_are_separate() {
        let mut t = TuioTracker::new();
        let mut blob = TuioCursor::new(CursorKind::Blob, 1, Vec2::new(0.5, 0.5));
        blob.width = 0.05;
        let f = feed(
            &mut t,
            vec![
                TuioCommand::alive_message(CursorKind::Cursor, &[1]),
                cur(1, 0.1, 0.1).to_set_message(),
                cur(7, 0.1, 0.1).to_set_message(),
                TuioCommand::fseq_message(CursorKind::Cursor, 1),
                TuioCommand::alive_message(CursorKind::Blob, &[1]),
                blob.to_set_message(),
                TuioCommand::fseq_message(CursorKind::Blob, 1),
            ],
        )
        .unwrap();
        assert_eq!(f.kind, Some(CursorKind::Blob));

        let table = snapshot(&t.table());
        let keys: Vec<_> = table.cursors.keys().copied().collect();
        assert_eq!(keys, vec![(CursorKind::Cursor, 1), (CursorKind::Blob, 1)]);
    }

    #[test]
    fn malformed_tuio_is_reported() {
        let mut t = TuioTracker::new();
        let bad = OscMessage::new("/tuio/2Dcur", vec![]);
        assert!(t.handle(&bad).is_err());
        let other = OscMessage::new("/ghpr/game/ready", vec![]);
        assert_eq!(t.handle(&other), Ok(None));
    }
}
