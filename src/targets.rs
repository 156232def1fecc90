//! Interactive surfaces and the listeners attached to them.

use anyhow::Result;
use serde::Serialize;
use std::rc::Rc;

use crate::geom::{Rect, Vec2};
use crate::gesture::{GestureEvent, GestureKind};
use crate::touch::TouchEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TargetId(pub u32);

pub trait TouchListener {
    fn on_touch(&self, event: &TouchEvent) -> Result<()>;
}

impl<F: Fn(&TouchEvent) -> Result<()>> TouchListener for F {
    fn on_touch(&self, event: &TouchEvent) -> Result<()> {
        self(event)
    }
}

pub trait GestureListener {
    fn on_gesture(&self, event: &GestureEvent) -> Result<()>;
}

impl<F: Fn(&GestureEvent) -> Result<()>> GestureListener for F {
    fn on_gesture(&self, event: &GestureEvent) -> Result<()> {
        self(event)
    }
}

#[derive(Clone)]
pub enum Capability {
    Touch(Rc<dyn TouchListener>),
    Gesture(GestureKind, Rc<dyn GestureListener>),
}

pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub rect: Rect,
    /// Smaller is nearer the viewer.
    pub depth: f32,
    pub gui: bool,
    capabilities: Vec<Capability>,
}

impl Target {
    pub fn touch_listeners(&self) -> Vec<Rc<dyn TouchListener>> {
        self.capabilities
            .iter()
            .filter_map(|c| match c {
                Capability::Touch(l) => Some(l.clone()),
                Capability::Gesture(..) => None,
            })
            .collect()
    }

    pub fn gesture_listeners(&self, kind: GestureKind) -> Vec<Rc<dyn GestureListener>> {
        self.capabilities
            .iter()
            .filter_map(|c| match c {
                Capability::Gesture(k, l) if *k == kind => Some(l.clone()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
    next: u32,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, rect: Rect, depth: f32, gui: bool) -> TargetId {
        self.next += 1;
        let id = TargetId(self.next);
        self.targets.push(Target {
            id,
            name: name.to_string(),
            rect,
            depth,
            gui,
            capabilities: Vec::new(),
        });
        id
    }

    pub fn remove(&mut self, id: TargetId) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| t.id != id);
        self.targets.len() != before
    }

    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// Attaches a capability; `false` if the target does not exist.
    pub fn attach(&mut self, id: TargetId, capability: Capability) -> bool {
        match self.targets.iter_mut().find(|t| t.id == id) {
            Some(t) => {
                t.capabilities.push(capability);
                true
            }
            None => false,
        }
    }

    pub fn on_touch<F>(&mut self, id: TargetId, listener: F) -> bool
    where
        F: Fn(&TouchEvent) -> Result<()> + 'static,
    {
        self.attach(id, Capability::Touch(Rc::new(listener)))
    }

    pub fn on_gesture<F>(&mut self, id: TargetId, kind: GestureKind, listener: F) -> bool
    where
        F: Fn(&GestureEvent) -> Result<()> + 'static,
    {
        self.attach(id, Capability::Gesture(kind, Rc::new(listener)))
    }

    /// Nearest surface containing `p`; equal depths go to the earliest registered.
    pub fn hit_test(&self, p: Vec2) -> Option<&Target> {
        self.targets
            .iter()
            .filter(|t| t.rect.contains(p))
            .fold(None, |best: Option<&Target>, t| match best {
                Some(b) if b.depth <= t.depth => Some(b),
                _ => Some(t),
            })
    }

    pub fn gesture_listeners(
        &self,
        id: Option<TargetId>,
        kind: GestureKind,
    ) -> Vec<Rc<dyn GestureListener>> {
        id.and_then(|id| self.get(id))
            .map(|t| t.gesture_listeners(kind))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_surface_wins() {
        let mut reg = TargetRegistry::new();
        let back = reg.register("table", Rect::new(0.0, 0.0, 100.0, 100.0), 10.0, false);
        let front = reg.register("button", Rect::new(40.0, 40.0, 20.0, 20.0), 1.0, true);
        let twin = reg.register("button-twin", Rect::new(40.0, 40.0, 20.0, 20.0), 1.0, true);

        assert_eq!(reg.hit_test(Vec2::new(50.0, 50.0)).map(|t| t.id), Some(front));
        assert_eq!(reg.hit_test(Vec2::new(5.0, 5.0)).map(|t| t.id), Some(back));
        assert!(reg.hit_test(Vec2::new(500.0, 5.0)).is_none());

        assert!(reg.remove(front));
        assert_eq!(reg.hit_test(Vec2::new(50.0, 50.0)).map(|t| t.id), Some(twin));
    }

    #[test]
    fn capabilities_filter_by_kind() {
        let mut reg = TargetRegistry::new();
        let id = reg.register("t", Rect::new(0.0, 0.0, 1.0, 1.0), 0.0, false);
        assert!(reg.on_touch(id, |_| Ok(())));
        assert!(reg.on_gesture(id, GestureKind::Tap, |_| Ok(())));
        assert!(!reg.on_touch(TargetId(99), |_| Ok(())));

        let t = reg.get(id).unwrap();
        assert_eq!(t.touch_listeners().len(), 1);
        assert_eq!(t.gesture_listeners(GestureKind::Tap).len(), 1);
        assert!(t.gesture_listeners(GestureKind::Drag).is_empty());
    }
}
