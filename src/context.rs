//! One owned bundle of router, targets, clusters and gestures, ticked once per frame.

use log::{debug, info};
use serde::Serialize;

use crate::cluster::{ClusterConfig, ClusterManager};
use crate::gesture::{FrameCtx, GestureConfig, GestureEngine, GestureEvent};
use crate::input::{InputProvider, InputSample};
use crate::router::{FrameTransitions, RouterConfig, TouchRouter};
use crate::targets::TargetRegistry;
use crate::touch::{Touch, TouchEvent, TouchId, TouchPhase};

#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    pub screen_width: f32,
    pub screen_height: f32,
    pub router: RouterConfig,
    pub cluster: ClusterConfig,
    pub gestures: GestureConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            screen_width: 1920.0,
            screen_height: 1080.0,
            router: RouterConfig::default(),
            cluster: ClusterConfig::default(),
            gestures: GestureConfig::default(),
        }
    }
}

/// What one frame produced, in dispatch order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    pub touches: Vec<TouchEvent>,
    pub gestures: Vec<GestureEvent>,
}

impl FrameReport {
    pub fn is_empty(&self) -> bool {
        self.touches.is_empty() && self.gestures.is_empty()
    }
}

pub struct InputContext {
    router: TouchRouter,
    targets: TargetRegistry,
    clusters: ClusterManager,
    gestures: GestureEngine,
    screen_height: f32,
    last_now: Option<f64>,
}

impl InputContext {
    pub fn new(cfg: &ContextConfig) -> Self {
        info!(
            "input context: {}x{} screen, {} stale frames",
            cfg.screen_width, cfg.screen_height, cfg.router.stale_frames
        );
        Self {
            router: TouchRouter::new(cfg.router),
            targets: TargetRegistry::new(),
            clusters: ClusterManager::new(cfg.cluster, cfg.screen_height),
            gestures: GestureEngine::new(&cfg.gestures),
            screen_height: cfg.screen_height.max(1.0),
            last_now: None,
        }
    }

    /// Re-applies tunables between frames; live touches and gestures carry on.
    pub fn apply(&mut self, cfg: &ContextConfig) {
        self.router.set_config(cfg.router);
        self.clusters.set_config(cfg.cluster, cfg.screen_height);
        self.gestures.configure(&cfg.gestures);
        self.screen_height = cfg.screen_height.max(1.0);
        debug!("input context: configuration re-applied");
    }

    pub fn router(&self) -> &TouchRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut TouchRouter {
        &mut self.router
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut TargetRegistry {
        &mut self.targets
    }

    pub fn clusters(&self) -> &ClusterManager {
        &self.clusters
    }

    pub fn gestures(&self) -> &GestureEngine {
        &self.gestures
    }

    pub fn gestures_mut(&mut self) -> &mut GestureEngine {
        &mut self.gestures
    }

    pub fn touches(&self) -> impl Iterator<Item = &Touch> {
        self.router.touches()
    }

    pub fn touch(&self, id: TouchId) -> Option<&Touch> {
        self.router.touch(id)
    }

    /// Feeds a phase-reporting source; the effects land in the next [`InputContext::tick`].
    pub fn apply_phase(
        &mut self,
        id: TouchId,
        phase: TouchPhase,
        sample: &InputSample,
        now: f64,
    ) -> Option<TouchPhase> {
        self.router
            .apply_phase(id, phase, sample, &self.targets, now)
    }

    /// One frame: poll the provider, update clusters, run every recogniser.
    pub fn tick<P: InputProvider + ?Sized>(&mut self, provider: &mut P, now: f64) -> FrameReport {
        let dt = self.last_now.map_or(0.0, |last| (now - last).max(0.0));
        self.last_now = Some(now);
        let transitions = self.router.tick(provider, &self.targets, now);
        self.process(transitions, now, dt)
    }

    /// Ends every live touch and drops unfinished gestures without reporting them.
    pub fn shutdown(&mut self, now: f64) -> FrameReport {
        let transitions = self.router.end_all(now);
        self.clusters.clear();
        self.gestures.clear();
        info!("input context: {} touches ended at shutdown", transitions.events.len());
        FrameReport {
            frame: self.router.frame(),
            touches: transitions.events,
            gestures: Vec::new(),
        }
    }

    fn process(&mut self, transitions: FrameTransitions, now: f64, dt: f64) -> FrameReport {
        for e in &transitions.events {
            match e.phase {
                TouchPhase::Began => {
                    self.clusters.on_touch_began(&e.touch, &self.router);
                }
                TouchPhase::Ended => {
                    self.clusters.on_touch_ended(e.touch.id);
                }
                TouchPhase::Moved => {}
            }
        }

        let ctx = FrameCtx {
            now,
            dt,
            router: &self.router,
            clusters: &self.clusters,
            targets: &self.targets,
            units: 1.0 / self.screen_height,
        };
        for began in transitions.of_phase(TouchPhase::Began) {
            // a touch that began and ended within one frame has nothing to recognise
            let Some(t) = self.router.touch(began.id) else {
                continue;
            };
            if self.router.is_world(t) {
                self.gestures.touch_began(t, &ctx);
            }
        }
        let gestures = self.gestures.step(&ctx);

        FrameReport {
            frame: self.router.frame(),
            touches: transitions.events,
            gestures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Rect, Vec2};
    use crate::gesture::{GestureKind, GesturePhase};
    use crate::input::ManualInput;
    use std::{cell::RefCell, rc::Rc};

    fn context() -> InputContext {
        InputContext::new(&ContextConfig {
            screen_width: 1000.0,
            screen_height: 1000.0,
            ..ContextConfig::default()
        })
    }

    #[test]
    fn tap_flows_through_the_whole_frame() {
        let mut cx = context();
        let mut input = ManualInput::new(4);
        let taps = Rc::new(RefCell::new(0));
        let t = taps.clone();
        cx.gestures_mut().subscribe(GestureKind::Tap, move |e| {
            assert_eq!(e.phase, GesturePhase::Completed);
            *t.borrow_mut() += 1;
            Ok(())
        });

        input.press(0, Vec2::new(100.0, 100.0));
        let r = cx.tick(&mut input, 0.0);
        assert_eq!(r.frame, 1);
        assert_eq!(r.touches.len(), 1);
        assert_eq!(cx.clusters().len(), 1);

        input.release(0);
        let r = cx.tick(&mut input, 0.1);
        let kinds: Vec<_> = r.gestures.iter().map(|g| (g.kind, g.phase)).collect();
        // the same press is also a long press that was let go too early
        assert_eq!(
            kinds,
            vec![
                (GestureKind::Tap, GesturePhase::Completed),
                (GestureKind::LongPress, GesturePhase::Failed)
            ]
        );
        assert_eq!(*taps.borrow(), 1);
        assert!(cx.clusters().is_empty());
    }

    #[test]
    fn shutdown_ends_touches_quietly() {
        let mut cx = context();
        let pad = cx
            .targets_mut()
            .register("pad", Rect::new(0.0, 0.0, 500.0, 500.0), 0.0, false);
        let ended = Rc::new(RefCell::new(0));
        let e = ended.clone();
        cx.targets_mut().on_touch(pad, move |ev| {
            if ev.phase == TouchPhase::Ended {
                *e.borrow_mut() += 1;
            }
            Ok(())
        });
        let mut input = ManualInput::new(2);
        input.press(0, Vec2::new(10.0, 10.0));
        input.press(1, Vec2::new(20.0, 20.0));
        cx.tick(&mut input, 0.0);

        let r = cx.shutdown(0.1);
        assert_eq!(r.touches.len(), 2);
        assert!(r.gestures.is_empty());
        assert_eq!(*ended.borrow(), 2);
        assert_eq!(cx.touches().count(), 0);
        assert_eq!(cx.gestures().active(GestureKind::Tap), 0);
    }

    #[test]
    fn apply_keeps_live_touches() {
        let mut cx = context();
        let mut input = ManualInput::new(1);
        input.press(0, Vec2::new(10.0, 10.0));
        cx.tick(&mut input, 0.0);
        let mut cfg = ContextConfig::default();
        cfg.router.stale_frames = 5;
        cx.apply(&cfg);
        assert_eq!(cx.router().config().stale_frames, 5);
        assert!(cx.touch(0).is_some());
    }
}
