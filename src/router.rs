//! Per-frame touch driver: polls a provider, keeps the touch table, notifies listeners.

use log::{debug, trace};
use std::{collections::BTreeMap, rc::Rc};

use crate::dispatch::{SubscriptionId, Subscribers, safe_call};
use crate::input::{InputProvider, InputSample};
use crate::targets::{TargetRegistry, TouchListener};
use crate::touch::{Touch, TouchEvent, TouchId, TouchPhase};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterConfig {
    /// A touch not updated for this many frames is ended.
    pub stale_frames: u64,
    /// Keep touches that start on GUI surfaces out of global notifications.
    pub separate_gui_input: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            stale_frames: 2,
            separate_gui_input: true,
        }
    }
}

/// What changed since the previous tick, in dispatch order.
#[derive(Debug, Clone, Default)]
pub struct FrameTransitions {
    pub events: Vec<TouchEvent>,
}

impl FrameTransitions {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn of_phase(&self, phase: TouchPhase) -> impl Iterator<Item = &Touch> {
        self.events
            .iter()
            .filter(move |e| e.phase == phase)
            .map(|e| &e.touch)
    }
}

struct Tracked {
    touch: Touch,
    listeners: Vec<Rc<dyn TouchListener>>,
}

pub struct TouchRouter {
    cfg: RouterConfig,
    touches: BTreeMap<TouchId, Tracked>,
    frame: u64,
    contacts: u64,
    observers: Subscribers<Rc<dyn TouchListener>>,
    pending: FrameTransitions,
}

impl TouchRouter {
    pub fn new(cfg: RouterConfig) -> Self {
        Self {
            cfg,
            touches: BTreeMap::new(),
            frame: 0,
            contacts: 0,
            observers: Subscribers::default(),
            pending: FrameTransitions::default(),
        }
    }

    pub fn config(&self) -> RouterConfig {
        self.cfg
    }

    pub fn set_config(&mut self, cfg: RouterConfig) {
        self.cfg = cfg;
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Global observer for touches that count as world input.
    pub fn observe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&TouchEvent) -> anyhow::Result<()> + 'static,
    {
        self.observers.add(Rc::new(listener))
    }

    pub fn unobserve(&mut self, id: SubscriptionId) -> bool {
        self.observers.remove(id)
    }

    pub fn touches(&self) -> impl Iterator<Item = &Touch> {
        self.touches.values().map(|t| &t.touch)
    }

    pub fn touch(&self, id: TouchId) -> Option<&Touch> {
        self.touches.get(&id).map(|t| &t.touch)
    }

    pub fn len(&self) -> usize {
        self.touches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.touches.is_empty()
    }

    /// Whether global notifications and gestures see this touch.
    pub fn is_world(&self, touch: &Touch) -> bool {
        !(self.cfg.separate_gui_input && touch.gui)
    }

    /// Advances one frame: polls every provider index, then ends touches that went stale.
    pub fn tick<P: InputProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        targets: &TargetRegistry,
        now: f64,
    ) -> FrameTransitions {
        self.frame += 1;
        provider.begin_frame();
        for index in 0..provider.max_inputs() {
            let sample = provider.sample(index);
            let id = index as TouchId;
            match (self.touches.contains_key(&id), sample.down) {
                (true, true) => self.moved(id, &sample, now),
                (false, true) => self.began(id, &sample, targets, now),
                (true, false) => self.ended(id, now),
                (false, false) => {}
            }
        }

        let stale: Vec<TouchId> = self
            .touches
            .values()
            .filter(|t| !t.touch.is_active_at(self.frame, self.cfg.stale_frames))
            .map(|t| t.touch.id)
            .collect();
        for id in stale {
            debug!("touch {id}: no update for {} frames, ending", self.cfg.stale_frames);
            self.ended(id, now);
        }

        std::mem::take(&mut self.pending)
    }

    /// Entry point for sources that report phases themselves. Transitions land in the
    /// next `tick` result. Returns the phase actually applied.
    pub fn apply_phase(
        &mut self,
        id: TouchId,
        phase: TouchPhase,
        sample: &InputSample,
        targets: &TargetRegistry,
        now: f64,
    ) -> Option<TouchPhase> {
        let live = self.touches.contains_key(&id);
        match phase {
            TouchPhase::Began => {
                if live {
                    debug!("touch {id}: began while live, ending the previous contact");
                    self.ended(id, now);
                }
                self.began(id, sample, targets, now);
                Some(TouchPhase::Began)
            }
            TouchPhase::Moved if !live => {
                debug!("touch {id}: moved before began, treating as began");
                self.began(id, sample, targets, now);
                Some(TouchPhase::Began)
            }
            TouchPhase::Moved => {
                self.moved(id, sample, now);
                Some(TouchPhase::Moved)
            }
            TouchPhase::Ended if !live => {
                debug!("touch {id}: ended without began, dropped");
                None
            }
            TouchPhase::Ended => {
                self.ended(id, now);
                Some(TouchPhase::Ended)
            }
        }
    }

    /// Ends every live touch; used on shutdown.
    pub fn end_all(&mut self, now: f64) -> FrameTransitions {
        let ids: Vec<TouchId> = self.touches.keys().copied().collect();
        for id in ids {
            self.ended(id, now);
        }
        std::mem::take(&mut self.pending)
    }

    fn began(&mut self, id: TouchId, sample: &InputSample, targets: &TargetRegistry, now: f64) {
        let hit = targets.hit_test(sample.position);
        let mut touch = Touch::new(
            id,
            sample.position,
            now,
            self.frame,
            hit.map(|t| t.id),
            hit.is_some_and(|t| t.gui),
        );
        self.contacts += 1;
        touch.contact = self.contacts;
        touch.set_shape(sample.width, sample.height, sample.angle);
        let listeners = hit.map(|t| t.touch_listeners()).unwrap_or_default();
        trace!(
            "touch {id}: began at ({:.1}, {:.1}) on {:?}",
            sample.position.x,
            sample.position.y,
            hit.map(|t| t.name.as_str())
        );
        self.touches.insert(id, Tracked { touch, listeners });
        self.notify(id, TouchPhase::Began);
    }

    fn moved(&mut self, id: TouchId, sample: &InputSample, now: f64) {
        let frame = self.frame;
        let Some(t) = self.touches.get_mut(&id) else {
            return;
        };
        t.touch.update(sample.position, now, frame);
        t.touch.set_shape(sample.width, sample.height, sample.angle);
        self.notify(id, TouchPhase::Moved);
    }

    fn ended(&mut self, id: TouchId, now: f64) {
        if let Some(t) = self.touches.get_mut(&id) {
            t.touch.last_update_time = now;
        }
        // listeners see Ended while the record still exists, never after
        self.notify(id, TouchPhase::Ended);
        self.touches.remove(&id);
        trace!("touch {id}: ended");
    }

    fn notify(&mut self, id: TouchId, phase: TouchPhase) {
        let Some(t) = self.touches.get(&id) else {
            return;
        };
        let event = TouchEvent {
            phase,
            touch: t.touch.clone(),
        };
        let what = format!("touch {id} {phase:?}");
        for l in &t.listeners {
            safe_call(&what, || l.on_touch(&event));
        }
        if self.is_world(&t.touch) {
            for l in self.observers.snapshot() {
                safe_call(&what, || l.on_touch(&event));
            }
        }
        self.pending.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Rect, Vec2};
    use crate::input::ManualInput;
    use anyhow::anyhow;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<(TouchId, TouchPhase)>>>;

    fn recorder(log: &Log) -> impl Fn(&TouchEvent) -> anyhow::Result<()> + 'static {
        let log = log.clone();
        move |e| {
            log.borrow_mut().push((e.touch.id, e.phase));
            Ok(())
        }
    }

    #[test]
    fn lifecycle_is_began_moved_ended() {
        let targets = TargetRegistry::new();
        let mut input = ManualInput::new(4);
        let mut router = TouchRouter::new(RouterConfig::default());
        let log: Log = Default::default();
        router.observe(recorder(&log));

        input.press(1, Vec2::new(10.0, 10.0));
        router.tick(&mut input, &targets, 0.0);
        input.move_to(1, Vec2::new(12.0, 10.0));
        router.tick(&mut input, &targets, 0.1);
        assert_eq!(router.touch(1).map(|t| t.delta()), Some(Vec2::new(2.0, 0.0)));
        input.release(1);
        let tr = router.tick(&mut input, &targets, 0.2);
        assert_eq!(tr.of_phase(TouchPhase::Ended).count(), 1);
        assert!(router.touch(1).is_none());

        assert_eq!(
            *log.borrow(),
            vec![
                (1, TouchPhase::Began),
                (1, TouchPhase::Moved),
                (1, TouchPhase::Ended)
            ]
        );
    }

    #[test]
    fn out_of_order_phases_are_repaired() {
        let targets = TargetRegistry::new();
        let mut router = TouchRouter::new(RouterConfig::default());
        let log: Log = Default::default();
        router.observe(recorder(&log));
        let s = InputSample::down_at(Vec2::new(1.0, 1.0));

        assert_eq!(router.apply_phase(5, TouchPhase::Ended, &s, &targets, 0.0), None);
        assert_eq!(
            router.apply_phase(5, TouchPhase::Moved, &s, &targets, 0.0),
            Some(TouchPhase::Began)
        );
        assert_eq!(
            router.apply_phase(5, TouchPhase::Began, &s, &targets, 0.1),
            Some(TouchPhase::Began)
        );
        assert_eq!(
            router.apply_phase(5, TouchPhase::Ended, &s, &targets, 0.2),
            Some(TouchPhase::Ended)
        );
        assert_eq!(
            *log.borrow(),
            vec![
                (5, TouchPhase::Began),
                (5, TouchPhase::Ended),
                (5, TouchPhase::Began),
                (5, TouchPhase::Ended)
            ]
        );
    }

    #[test]
    fn phase_driven_touch_goes_stale() {
        let targets = TargetRegistry::new();
        let mut input = ManualInput::new(0);
        let mut router = TouchRouter::new(RouterConfig::default());
        let s = InputSample::down_at(Vec2::ZERO);
        router.apply_phase(42, TouchPhase::Began, &s, &targets, 0.0);

        let tr = router.tick(&mut input, &targets, 0.0);
        assert_eq!(tr.of_phase(TouchPhase::Began).count(), 1);
        assert_eq!(router.len(), 1);

        let tr = router.tick(&mut input, &targets, 0.1);
        assert_eq!(tr.of_phase(TouchPhase::Ended).count(), 1);
        assert!(router.is_empty());
    }

    #[test]
    fn failing_target_listener_does_not_block_others() {
        let mut targets = TargetRegistry::new();
        let id = targets.register("pad", Rect::new(0.0, 0.0, 50.0, 50.0), 0.0, false);
        let log: Log = Default::default();
        targets.on_touch(id, |_| Err(anyhow!("bad listener")));
        targets.on_touch(id, |_| panic!("worse listener"));
        targets.on_touch(id, recorder(&log));

        let mut router = TouchRouter::new(RouterConfig::default());
        let global: Log = Default::default();
        router.observe(recorder(&global));

        let mut input = ManualInput::new(1);
        input.press(0, Vec2::new(10.0, 10.0));
        router.tick(&mut input, &targets, 0.0);
        assert_eq!(router.touch(0).and_then(|t| t.start_target), Some(id));
        assert_eq!(*log.borrow(), vec![(0, TouchPhase::Began)]);
        assert_eq!(*global.borrow(), vec![(0, TouchPhase::Began)]);
    }

    #[test]
    fn gui_touches_stay_out_of_global_notifications() {
        let mut targets = TargetRegistry::new();
        let button = targets.register("button", Rect::new(0.0, 0.0, 10.0, 10.0), 0.0, true);
        let local: Log = Default::default();
        targets.on_touch(button, recorder(&local));

        let mut router = TouchRouter::new(RouterConfig::default());
        let global: Log = Default::default();
        router.observe(recorder(&global));

        let mut input = ManualInput::new(2);
        input.press(0, Vec2::new(5.0, 5.0));
        input.press(1, Vec2::new(50.0, 50.0));
        router.tick(&mut input, &targets, 0.0);

        assert_eq!(*local.borrow(), vec![(0, TouchPhase::Began)]);
        assert_eq!(*global.borrow(), vec![(1, TouchPhase::Began)]);
        assert!(!router.is_world(router.touch(0).unwrap()));

        router.set_config(RouterConfig {
            separate_gui_input: false,
            ..router.config()
        });
        assert!(router.is_world(router.touch(0).unwrap()));
    }

    #[test]
    fn start_target_sticks_when_the_touch_leaves_it() {
        let mut targets = TargetRegistry::new();
        let pad = targets.register("pad", Rect::new(0.0, 0.0, 10.0, 10.0), 0.0, false);
        let log: Log = Default::default();
        targets.on_touch(pad, recorder(&log));

        let mut router = TouchRouter::new(RouterConfig::default());
        let mut input = ManualInput::new(1);
        input.press(0, Vec2::new(5.0, 5.0));
        router.tick(&mut input, &targets, 0.0);
        input.move_to(0, Vec2::new(500.0, 500.0));
        router.tick(&mut input, &targets, 0.1);
        input.release(0);
        router.tick(&mut input, &targets, 0.2);

        assert_eq!(log.borrow().len(), 3);
    }
}
