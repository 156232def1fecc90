//! Isolated listener invocation and snapshot-iterated subscriber lists.

use anyhow::Result;
use log::error;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Runs one listener; an `Err` or a panic is logged and swallowed.
///
/// Returns `true` when the listener completed without error.
pub fn safe_call<F>(what: &str, f: F) -> bool
where
    F: FnOnce() -> Result<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("{what}: listener failed: {e:#}");
            false
        }
        Err(payload) => {
            error!("{what}: listener panicked: {}", panic_str(&payload));
            false
        }
    }
}

pub fn panic_str<'s>(payload: &'s Box<dyn std::any::Any + Send + 'static>) -> &'s str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Ordered subscriber list of shared handles (`Rc` or `Arc`). Dispatch goes through
/// [`Subscribers::snapshot`] so a listener may subscribe or unsubscribe others mid-dispatch.
pub struct Subscribers<P> {
    next: u64,
    items: Vec<(SubscriptionId, P)>,
}

impl<P> Default for Subscribers<P> {
    fn default() -> Self {
        Self {
            next: 0,
            items: Vec::new(),
        }
    }
}

impl<P: Clone> Subscribers<P> {
    pub fn add(&mut self, listener: P) -> SubscriptionId {
        self.next += 1;
        let id = SubscriptionId(self.next);
        self.items.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.items.len();
        self.items.retain(|(i, _)| *i != id);
        self.items.len() != before
    }

    pub fn snapshot(&self) -> Vec<P> {
        self.items.iter().map(|(_, l)| l.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
