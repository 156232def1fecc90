pub mod cursor;
pub mod tracking;

pub use cursor::{CursorKind, TuioCommand, TuioCursor, TuioError};
pub use tracking::{SharedTuioTable, TuioFrame, TuioTable, TuioTracker, snapshot};

use log::{trace, warn};
use std::sync::{Arc, Mutex, PoisonError};

use crate::osc::OscReceiver;

/// Routes both TUIO profiles from `receiver` into a new tracker and returns the table it publishes.
pub fn attach(receiver: &OscReceiver) -> SharedTuioTable {
    let tracker = TuioTracker::new();
    let table = tracker.table();
    let tracker = Arc::new(Mutex::new(tracker));
    for kind in CursorKind::ALL {
        let t = tracker.clone();
        receiver.on(kind.address(), move |msg| {
            let mut t = t.lock().unwrap_or_else(PoisonError::into_inner);
            match t.handle(msg) {
                Ok(Some(frame)) => trace!(
                    "tuio frame {}: {} added, {} removed",
                    frame.fseq,
                    frame.added.len(),
                    frame.removed.len()
                ),
                Ok(None) => {}
                Err(e) => warn!("tuio: {e}"),
            }
            Ok(())
        });
    }
    table
}
