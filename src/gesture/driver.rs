//! The state machine every recogniser shares.
//!
//! A [`Recognise`] implementation only supplies the gesture-specific rules; the
//! [`Recogniser`] wrapper decides which touches an instance sees, creates and retires
//! instances and turns state changes into events:
//!
//! ```text
//! Ready --can_begin--> Started --> InProgress --recognise--> InProgress | Recognised | Ended | Failed
//! ```
//!
//! Continuous gestures emit `Started` on the frame they begin and `Updated` on every later
//! `InProgress` frame. Every gesture emits `Completed` on `Ended` and `Failed` on `Failed`,
//! after which the instance is dropped in the same frame.

use log::{debug, trace};
use std::collections::BTreeSet;

use super::group::Group;
use super::{FrameCtx, GestureConfig, GestureDetails, GestureEvent, GestureKind, GesturePhase, GestureState};
use crate::cluster::ClusterId;
use crate::geom::Vec2;
use crate::targets::TargetId;
use crate::touch::{Touch, TouchId};

/// What an instance draws its touches from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// One contact; a later touch on the same provider index is someone else.
    Touch { id: TouchId, contact: u64 },
    Cluster(ClusterId),
    AllTouches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    PerFinger,
    Clusters,
    AllTouches,
}

#[derive(Debug, Clone)]
pub struct Instance<D> {
    pub id: u64,
    pub binding: Binding,
    pub state: GestureState,
    pub start_time: f64,
    pub start_position: Vec2,
    pub start_target: Option<TargetId>,
    /// Centre of the current touches; holds its last value when they are gone.
    pub position: Vec2,
    pub previous_position: Vec2,
    pub touch_count: usize,
    pub touch_ids: Vec<TouchId>,
    pub data: D,
}

impl<D> Instance<D> {
    pub fn elapsed(&self, now: f64) -> f64 {
        now - self.start_time
    }

    pub fn moved(&self) -> Vec2 {
        self.position - self.start_position
    }

    fn refresh(&mut self, group: &Group) {
        self.previous_position = self.position;
        if let Some(p) = group.avg_position() {
            self.position = p;
        }
        self.touch_count = group.len();
        self.touch_ids = group.ids();
    }
}

/// Rules of one gesture type.
pub trait Recognise {
    type Data: Default;

    const KIND: GestureKind;
    /// Continuous gestures report start and updates; discrete ones only the outcome.
    const CONTINUOUS: bool;

    fn from_config(cfg: &GestureConfig) -> Self
    where
        Self: Sized;

    fn fingers(&self) -> usize;

    /// Cap on live instances; zero for no cap.
    fn max_simultaneous(&self) -> usize {
        0
    }

    fn supports_clustering(&self) -> bool {
        true
    }

    /// Once, when the instance is created.
    fn init(&self, _inst: &mut Instance<Self::Data>, _group: &Group, _ctx: &FrameCtx) {}

    /// Every frame, before any state decision.
    fn observe(&self, _inst: &mut Instance<Self::Data>, _group: &Group, _ctx: &FrameCtx) {}

    fn can_begin(&self, _inst: &Instance<Self::Data>, group: &Group, _ctx: &FrameCtx) -> bool {
        group.len() == self.fingers()
    }

    fn recognise(&self, inst: &Instance<Self::Data>, group: &Group, ctx: &FrameCtx) -> GestureState;

    fn details(&self, inst: &Instance<Self::Data>) -> GestureDetails;

    /// Distance in pixels at which `inst` would take over touches starting at `at`,
    /// or `None` if it will not. The nearest willing instance wins.
    fn adopt_distance(&self, _inst: &Instance<Self::Data>, _at: Vec2, _ctx: &FrameCtx) -> Option<f32> {
        None
    }
}

/// Object-safe face of a [`Recogniser`] so the engine can hold mixed kinds.
pub trait RecogniserDriver {
    fn kind(&self) -> GestureKind;
    fn active(&self) -> usize;
    fn configure(&mut self, cfg: &GestureConfig);
    fn touch_began(&mut self, touch: &Touch, ctx: &FrameCtx);
    fn step(&mut self, ctx: &FrameCtx, out: &mut Vec<GestureEvent>);
    fn clear(&mut self);
}

pub struct Recogniser<R: Recognise> {
    rules: R,
    instances: Vec<Instance<R::Data>>,
    /// Clusters whose gesture already finished; they do not start another.
    spent: BTreeSet<ClusterId>,
    next: u64,
}

impl<R: Recognise> Recogniser<R> {
    pub fn new(rules: R) -> Self {
        Self {
            rules,
            instances: Vec::new(),
            spent: BTreeSet::new(),
            next: 0,
        }
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn instances(&self) -> &[Instance<R::Data>] {
        &self.instances
    }

    fn mode(&self) -> Mode {
        if self.rules.fingers() < 2 {
            Mode::PerFinger
        } else if self.rules.supports_clustering() {
            Mode::Clusters
        } else {
            Mode::AllTouches
        }
    }

    fn try_adopt(&mut self, at: Vec2, binding: Binding, ctx: &FrameCtx) -> bool {
        let rules = &self.rules;
        let nearest = self
            .instances
            .iter_mut()
            .filter_map(|i| rules.adopt_distance(i, at, ctx).map(|d| (i, d)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match nearest {
            Some((inst, _)) => {
                debug!("{:?} #{}: rebound {:?} -> {:?}", R::KIND, inst.id, inst.binding, binding);
                inst.binding = binding;
                true
            }
            None => false,
        }
    }

    fn create(&mut self, binding: Binding, ctx: &FrameCtx) {
        let max = self.rules.max_simultaneous();
        if max > 0 && self.instances.len() >= max {
            debug!("{:?}: {max} instances live, not starting another", R::KIND);
            return;
        }
        let group = group_for(binding, ctx);
        let at = group.avg_position().unwrap_or(Vec2::ZERO);
        self.next += 1;
        let mut inst = Instance {
            id: self.next,
            binding,
            state: GestureState::Ready,
            start_time: ctx.now,
            start_position: at,
            start_target: group.oldest().and_then(|t| t.start_target),
            position: at,
            previous_position: at,
            touch_count: group.len(),
            touch_ids: group.ids(),
            data: R::Data::default(),
        };
        self.rules.init(&mut inst, &group, ctx);
        trace!("{:?} #{}: created for {binding:?}", R::KIND, inst.id);
        self.instances.push(inst);
    }

    fn scan_clusters(&mut self, ctx: &FrameCtx) {
        self.spent.retain(|c| ctx.clusters.cluster(*c).is_some());
        let fingers = self.rules.fingers();
        for cluster in ctx.clusters.clusters() {
            let binding = Binding::Cluster(cluster.id);
            if self.spent.contains(&cluster.id) || self.instances.iter().any(|i| i.binding == binding) {
                continue;
            }
            let group = group_for(binding, ctx);
            if group.len() != fingers {
                continue;
            }
            let at = group.avg_position().unwrap_or(Vec2::ZERO);
            if !self.try_adopt(at, binding, ctx) {
                self.create(binding, ctx);
            }
        }
    }
}

fn group_for<'a>(binding: Binding, ctx: &FrameCtx<'a>) -> Group<'a> {
    let router = ctx.router;
    let world = |t: &&Touch| router.is_world(t);
    let touches = match binding {
        Binding::Touch { id, contact } => router
            .touch(id)
            .filter(|t| t.contact == contact)
            .filter(world)
            .into_iter()
            .collect(),
        Binding::Cluster(id) => ctx
            .clusters
            .cluster(id)
            .map(|c| {
                c.members
                    .iter()
                    .filter_map(|m| router.touch(*m))
                    .filter(world)
                    .collect()
            })
            .unwrap_or_default(),
        Binding::AllTouches => router.touches().filter(world).collect(),
    };
    Group::new(touches)
}

fn event<R: Recognise>(rules: &R, inst: &Instance<R::Data>, phase: GesturePhase, now: f64) -> GestureEvent {
    GestureEvent {
        kind: R::KIND,
        phase,
        instance: inst.id,
        position: inst.position,
        start_position: inst.start_position,
        start_time: inst.start_time,
        elapsed: inst.elapsed(now),
        touch_ids: inst.touch_ids.clone(),
        start_target: inst.start_target,
        details: rules.details(inst),
    }
}

impl<R: Recognise> RecogniserDriver for Recogniser<R> {
    fn kind(&self) -> GestureKind {
        R::KIND
    }

    fn active(&self) -> usize {
        self.instances.len()
    }

    fn configure(&mut self, cfg: &GestureConfig) {
        self.rules = R::from_config(cfg);
    }

    fn touch_began(&mut self, touch: &Touch, ctx: &FrameCtx) {
        match self.mode() {
            Mode::PerFinger => {
                let binding = Binding::Touch {
                    id: touch.id,
                    contact: touch.contact,
                };
                if !self.try_adopt(touch.position, binding, ctx) {
                    self.create(binding, ctx);
                }
            }
            Mode::AllTouches if self.instances.is_empty() => self.create(Binding::AllTouches, ctx),
            Mode::AllTouches | Mode::Clusters => {}
        }
    }

    fn step(&mut self, ctx: &FrameCtx, out: &mut Vec<GestureEvent>) {
        if self.mode() == Mode::Clusters {
            self.scan_clusters(ctx);
        }

        let rules = &self.rules;
        let mut finished = Vec::new();
        for inst in self.instances.iter_mut() {
            let group = group_for(inst.binding, ctx);
            inst.refresh(&group);
            rules.observe(inst, &group, ctx);

            if inst.state == GestureState::Ready {
                if rules.can_begin(inst, &group, ctx) {
                    inst.state = GestureState::Started;
                    trace!("{:?} #{}: started", R::KIND, inst.id);
                    if R::CONTINUOUS {
                        out.push(event(rules, inst, GesturePhase::Started, ctx.now));
                    }
                } else {
                    if group.is_empty() {
                        finished.push(inst.id);
                    }
                    continue;
                }
            }

            let began_now = inst.state == GestureState::Started;
            if began_now {
                inst.state = GestureState::InProgress;
            }

            let next = rules.recognise(inst, &group, ctx);
            if next != inst.state {
                trace!("{:?} #{}: {:?} -> {next:?}", R::KIND, inst.id, inst.state);
            }
            inst.state = next;
            match next {
                GestureState::Ended => out.push(event(rules, inst, GesturePhase::Completed, ctx.now)),
                GestureState::Failed => out.push(event(rules, inst, GesturePhase::Failed, ctx.now)),
                GestureState::InProgress if R::CONTINUOUS && !began_now => {
                    out.push(event(rules, inst, GesturePhase::Updated, ctx.now))
                }
                _ => {}
            }
            if next.is_terminal() {
                finished.push(inst.id);
                if let Binding::Cluster(c) = inst.binding {
                    self.spent.insert(c);
                }
            }
        }
        self.instances.retain(|i| !finished.contains(&i.id));
    }

    fn clear(&mut self) {
        self.instances.clear();
        self.spent.clear();
    }
}
