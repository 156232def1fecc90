//! Groups touches that start close together in space and time.

use log::trace;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::geom::Vec2;
use crate::router::TouchRouter;
use crate::touch::{Touch, TouchId};

pub type ClusterId = u32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterConfig {
    /// Join distance in screen units (pixels / screen height).
    pub radius: f32,
    /// Seconds after a cluster formed during which touches may still join it.
    pub time_tolerance: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            radius: 0.2,
            time_tolerance: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub created_at: f64,
    pub members: BTreeSet<TouchId>,
}

#[derive(Debug)]
pub struct ClusterManager {
    cfg: ClusterConfig,
    screen_height: f32,
    clusters: BTreeMap<ClusterId, Cluster>,
    membership: HashMap<TouchId, ClusterId>,
    next: ClusterId,
}

impl ClusterManager {
    pub fn new(cfg: ClusterConfig, screen_height: f32) -> Self {
        Self {
            cfg,
            screen_height: screen_height.max(1.0),
            clusters: BTreeMap::new(),
            membership: HashMap::new(),
            next: 0,
        }
    }

    pub fn set_config(&mut self, cfg: ClusterConfig, screen_height: f32) {
        self.cfg = cfg;
        self.screen_height = screen_height.max(1.0);
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    pub fn cluster_of(&self, touch: TouchId) -> Option<ClusterId> {
        self.membership.get(&touch).copied()
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Mean current position of the members still known to the router.
    pub fn centroid(&self, id: ClusterId, router: &TouchRouter) -> Option<Vec2> {
        let c = self.clusters.get(&id)?;
        let positions: Vec<Vec2> = c
            .members
            .iter()
            .filter_map(|t| router.touch(*t))
            .map(|t| t.position)
            .collect();
        if positions.is_empty() {
            return None;
        }
        let sum = positions.iter().fold(Vec2::ZERO, |acc, p| acc + *p);
        Some(sum / positions.len() as f32)
    }

    /// Assigns a new touch to the nearest eligible cluster or a fresh one.
    pub fn on_touch_began(&mut self, touch: &Touch, router: &TouchRouter) -> ClusterId {
        if let Some(existing) = self.cluster_of(touch.id) {
            return existing;
        }
        let radius_sq = self.cfg.radius * self.cfg.radius;
        let mut best: Option<(ClusterId, f32)> = None;
        for c in self.clusters.values() {
            if touch.start_time - c.created_at > self.cfg.time_tolerance {
                continue;
            }
            let Some(centre) = self.centroid(c.id, router) else {
                continue;
            };
            let d_sq = ((touch.position - centre) / self.screen_height).length_squared();
            if d_sq < radius_sq && best.is_none_or(|(_, b)| d_sq < b) {
                best = Some((c.id, d_sq));
            }
        }

        let id = match best {
            Some((id, _)) => id,
            None => {
                self.next += 1;
                let id = self.next;
                self.clusters.insert(
                    id,
                    Cluster {
                        id,
                        created_at: touch.start_time,
                        members: BTreeSet::new(),
                    },
                );
                id
            }
        };
        if let Some(c) = self.clusters.get_mut(&id) {
            c.members.insert(touch.id);
        }
        self.membership.insert(touch.id, id);
        trace!("cluster {id}: touch {} joined", touch.id);
        id
    }

    /// Removes an ended touch. Returns its cluster and whether that cluster was retired.
    pub fn on_touch_ended(&mut self, touch: TouchId) -> Option<(ClusterId, bool)> {
        let id = self.membership.remove(&touch)?;
        let c = self.clusters.get_mut(&id)?;
        c.members.remove(&touch);
        let retired = c.members.is_empty();
        if retired {
            self.clusters.remove(&id);
            trace!("cluster {id}: retired");
        }
        Some((id, retired))
    }

    pub fn clear(&mut self) {
        self.clusters.clear();
        self.membership.clear();
    }
}
