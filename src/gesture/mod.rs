//! Gesture recognition over the router's touches.
//!
//! Every recogniser runs the same state machine (see [`driver`]); the per-gesture
//! modules only decide when a gesture may begin and what state it moves to each frame.
//! Events go first to gesture listeners on the target the gesture started over, then
//! to global subscribers for that gesture kind.

pub mod driver;
pub mod group;

mod drag;
mod long_press;
mod pinch;
mod swipe;
mod tap;
mod twist;

pub use drag::DragConfig;
pub use driver::{Binding, Instance, Recognise, Recogniser, RecogniserDriver};
pub use group::Group;
pub use long_press::LongPressConfig;
pub use pinch::PinchConfig;
pub use swipe::{SwipeConfig, SwipeDirection, SwipeDirections};
pub use tap::TapConfig;
pub use twist::TwistConfig;

use log::debug;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, rc::Rc};

use crate::cluster::ClusterManager;
use crate::dispatch::{SubscriptionId, Subscribers, safe_call};
use crate::geom::Vec2;
use crate::router::TouchRouter;
use crate::targets::{GestureListener, TargetId, TargetRegistry};
use crate::touch::{Touch, TouchId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Tap,
    Drag,
    Swipe,
    Pinch,
    Twist,
    LongPress,
}

impl GestureKind {
    pub const ALL: [GestureKind; 6] = [
        GestureKind::Tap,
        GestureKind::Drag,
        GestureKind::Swipe,
        GestureKind::Pinch,
        GestureKind::Twist,
        GestureKind::LongPress,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GesturePhase {
    Started,
    Updated,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GestureState {
    Ready,
    Started,
    InProgress,
    /// Continuous gestures only: recognised but idle this frame.
    Recognised,
    Ended,
    Failed,
}

impl GestureState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GestureState::Ended | GestureState::Failed)
    }
}

/// Gesture-specific measurements carried on every event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GestureDetails {
    Tap {
        taps: u32,
    },
    Drag {
        /// Movement of the group centre since the previous frame, in pixels.
        delta: Vec2,
        /// Movement since the gesture started, in pixels.
        moved: Vec2,
    },
    Swipe {
        moved: Vec2,
        direction: Option<SwipeDirection>,
        /// Smoothed pixels per second.
        velocity: f32,
        /// Degrees away from the initial heading.
        deviation: f32,
    },
    Pinch {
        start_gap: f32,
        gap: f32,
        delta_gap: f32,
    },
    Twist {
        /// Degrees this frame.
        delta_rotation: f32,
        total_rotation: f32,
    },
    LongPress,
}

#[derive(Debug, Clone, Serialize)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub phase: GesturePhase,
    pub instance: u64,
    pub position: Vec2,
    pub start_position: Vec2,
    pub start_time: f64,
    pub elapsed: f64,
    pub touch_ids: Vec<TouchId>,
    pub start_target: Option<TargetId>,
    pub details: GestureDetails,
}

/// Everything a recogniser may look at during one frame.
pub struct FrameCtx<'a> {
    pub now: f64,
    /// Seconds since the previous frame; zero on the first.
    pub dt: f64,
    pub router: &'a TouchRouter,
    pub clusters: &'a ClusterManager,
    pub targets: &'a TargetRegistry,
    /// Screen units per pixel (1 / screen height).
    pub units: f32,
}

impl FrameCtx<'_> {
    /// Pixel length converted to screen units.
    pub fn to_units(&self, pixels: f32) -> f32 {
        pixels * self.units
    }
}

/// Tunables for every recogniser, one profile section each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub tap: TapConfig,
    pub drag: DragConfig,
    pub swipe: SwipeConfig,
    pub pinch: PinchConfig,
    pub twist: TwistConfig,
    pub long_press: LongPressConfig,
}

pub struct GestureEngine {
    recognisers: Vec<Box<dyn RecogniserDriver>>,
    subscribers: HashMap<GestureKind, Subscribers<Rc<dyn GestureListener>>>,
}

impl GestureEngine {
    /// Engine with no recognisers; add them with [`GestureEngine::add`].
    pub fn empty() -> Self {
        Self {
            recognisers: Vec::new(),
            subscribers: HashMap::new(),
        }
    }

    /// Engine running every built-in recogniser.
    pub fn new(cfg: &GestureConfig) -> Self {
        let mut engine = Self::empty();
        engine.add(cfg.tap.clone());
        engine.add(cfg.drag.clone());
        engine.add(cfg.swipe.clone());
        engine.add(cfg.pinch.clone());
        engine.add(cfg.twist.clone());
        engine.add(cfg.long_press.clone());
        engine
    }

    pub fn add<R: Recognise + 'static>(&mut self, rules: R) {
        self.recognisers.push(Box::new(Recogniser::new(rules)));
    }

    /// Applies new tunables; live instances keep running under the new rules.
    pub fn configure(&mut self, cfg: &GestureConfig) {
        for r in self.recognisers.iter_mut() {
            r.configure(cfg);
        }
        debug!("gestures: tunables applied");
    }

    pub fn subscribe<F>(&mut self, kind: GestureKind, listener: F) -> SubscriptionId
    where
        F: Fn(&GestureEvent) -> anyhow::Result<()> + 'static,
    {
        self.subscribers
            .entry(kind)
            .or_default()
            .add(Rc::new(listener))
    }

    pub fn unsubscribe(&mut self, kind: GestureKind, id: SubscriptionId) -> bool {
        self.subscribers
            .get_mut(&kind)
            .is_some_and(|s| s.remove(id))
    }

    /// Live instances of one kind, in any state.
    pub fn active(&self, kind: GestureKind) -> usize {
        self.recognisers
            .iter()
            .filter(|r| r.kind() == kind)
            .map(|r| r.active())
            .sum()
    }

    pub fn touch_began(&mut self, touch: &Touch, ctx: &FrameCtx) {
        for r in self.recognisers.iter_mut() {
            r.touch_began(touch, ctx);
        }
    }

    /// Runs one frame of every recogniser and delivers the resulting events.
    pub fn step(&mut self, ctx: &FrameCtx) -> Vec<GestureEvent> {
        let mut events = Vec::new();
        for r in self.recognisers.iter_mut() {
            r.step(ctx, &mut events);
        }
        for e in &events {
            self.deliver(e, ctx.targets);
        }
        events
    }

    pub fn clear(&mut self) {
        for r in self.recognisers.iter_mut() {
            r.clear();
        }
    }

    fn deliver(&self, event: &GestureEvent, targets: &TargetRegistry) {
        let what = format!("{:?} {:?} #{}", event.kind, event.phase, event.instance);
        for l in targets.gesture_listeners(event.start_target, event.kind) {
            safe_call(&what, || l.on_gesture(event));
        }
        if let Some(subs) = self.subscribers.get(&event.kind) {
            for l in subs.snapshot() {
                safe_call(&what, || l.on_gesture(event));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Frame rig shared by the recogniser tests.

    use super::*;
    use crate::cluster::ClusterConfig;
    use crate::input::ManualInput;
    use crate::router::RouterConfig;
    use crate::touch::TouchPhase;

    pub struct Rig {
        pub input: ManualInput,
        pub router: TouchRouter,
        pub targets: TargetRegistry,
        pub clusters: ClusterManager,
        pub engine: GestureEngine,
        pub screen_height: f32,
        last: Option<f64>,
    }

    impl Rig {
        pub fn new(engine: GestureEngine) -> Self {
            Self {
                input: ManualInput::new(8),
                router: TouchRouter::new(RouterConfig::default()),
                targets: TargetRegistry::new(),
                clusters: ClusterManager::new(ClusterConfig::default(), 1000.0),
                engine,
                screen_height: 1000.0,
                last: None,
            }
        }

        pub fn with<R: Recognise + 'static>(rules: R) -> Self {
            let mut engine = GestureEngine::empty();
            engine.add(rules);
            Self::new(engine)
        }

        pub fn tick(&mut self, now: f64) -> Vec<GestureEvent> {
            let dt = self.last.map_or(0.0, |l| now - l);
            self.last = Some(now);
            let tr = self.router.tick(&mut self.input, &self.targets, now);
            for e in &tr.events {
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
            for t in tr.of_phase(TouchPhase::Began) {
                if self.router.is_world(t) {
                    self.engine.touch_began(t, &ctx);
                }
            }
            self.engine.step(&ctx)
        }
    }

    pub fn phases(events: &[GestureEvent], kind: GestureKind) -> Vec<GesturePhase> {
        events
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.phase)
            .collect()
    }
}
