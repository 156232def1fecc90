//! Linux multitouch panels through evdev (protocol B slots).

use evdev::{AbsoluteAxisCode, Device, EventType, SynchronizationCode};
use log::{info, warn};

use super::{InputProvider, InputSample};
use crate::geom::Vec2;

pub const MAX_TOUCH_SLOTS: usize = 10;

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
}

pub fn discover_multitouch() -> Vec<DeviceInfo> {
    discover(|dev| {
        let has_abs = dev.supported_events().contains(EventType::ABSOLUTE);
        let has_mt = dev.supported_absolute_axes().is_some_and(|a| {
            a.contains(AbsoluteAxisCode::ABS_MT_SLOT)
                && a.contains(AbsoluteAxisCode::ABS_MT_POSITION_X)
                && a.contains(AbsoluteAxisCode::ABS_MT_POSITION_Y)
        });
        has_abs && has_mt
    })
}

/// Opens every `/dev/input/event*` node and keeps the ones `accept` likes.
pub(crate) fn discover(accept: impl Fn(&Device) -> bool) -> Vec<DeviceInfo> {
    let mut out = vec![];
    let Ok(rd) = std::fs::read_dir("/dev/input") else {
        return out;
    };
    for e in rd.flatten() {
        let p = e.path();
        let is_event = p
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.starts_with("event"));
        if !is_event {
            continue;
        }
        if let Ok(dev) = Device::open(&p) {
            if accept(&dev) {
                out.push(DeviceInfo {
                    path: p.display().to_string(),
                    name: dev.name().unwrap_or("unknown").to_string(),
                });
            }
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

#[derive(Debug, Clone, Default)]
struct SlotState {
    tracking_id: i32, // -1 = inactive
    x_norm: f32,
    y_norm: f32,
    major_norm: f32,
    minor_norm: f32,
    /// Tracking id last reported down through `sample`; -1 when reported up.
    reported_id: i32,
}

/// Slot bookkeeping fed by raw ABS_MT events, published on SYN_REPORT.
#[derive(Debug)]
pub struct SlotTracker {
    slots: Vec<SlotState>,
    published: Vec<SlotState>,
    cur_slot: usize,
    x_min: i32,
    x_max: i32,
    y_min: i32,
    y_max: i32,
}

impl Default for SlotTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotTracker {
    pub fn new() -> Self {
        let idle = SlotState {
            tracking_id: -1,
            reported_id: -1,
            ..SlotState::default()
        };
        Self {
            slots: vec![idle.clone(); MAX_TOUCH_SLOTS],
            published: vec![idle; MAX_TOUCH_SLOTS],
            cur_slot: 0,
            x_min: 0,
            x_max: 4096,
            y_min: 0,
            y_max: 4096,
        }
    }

    pub fn set_norm_ranges(&mut self, x_min: i32, x_max: i32, y_min: i32, y_max: i32) {
        self.x_min = x_min;
        self.x_max = x_max.max(x_min + 1);
        self.y_min = y_min;
        self.y_max = y_max.max(y_min + 1);
    }

    pub fn on_slot(&mut self, slot: i32) {
        self.cur_slot = slot.clamp(0, MAX_TOUCH_SLOTS as i32 - 1) as usize;
    }

    pub fn on_tracking_id(&mut self, tracking_id: i32) {
        let s = &mut self.slots[self.cur_slot];
        s.tracking_id = tracking_id.max(-1);
    }

    pub fn on_pos_x(&mut self, raw: i32) {
        let nx = norm(raw, self.x_min, self.x_max);
        self.slots[self.cur_slot].x_norm = nx;
    }

    pub fn on_pos_y(&mut self, raw: i32) {
        let ny = norm(raw, self.y_min, self.y_max);
        self.slots[self.cur_slot].y_norm = ny;
    }

    pub fn on_touch_major(&mut self, raw: i32) {
        let span = (self.x_max - self.x_min) as f32;
        self.slots[self.cur_slot].major_norm = raw.max(0) as f32 / span;
    }

    pub fn on_touch_minor(&mut self, raw: i32) {
        let span = (self.y_max - self.y_min) as f32;
        self.slots[self.cur_slot].minor_norm = raw.max(0) as f32 / span;
    }

    pub fn on_syn_report(&mut self) {
        for (p, s) in self.published.iter_mut().zip(&self.slots) {
            let reported_id = p.reported_id;
            *p = s.clone();
            p.reported_id = reported_id;
        }
    }

    pub fn active_count(&self) -> usize {
        self.published.iter().filter(|s| s.tracking_id >= 0).count()
    }

    /// Reads one slot. A slot whose tracking id changed between two reads reports
    /// up once, so the new contact starts as a fresh touch.
    pub fn read(&mut self, slot: usize, screen: Vec2) -> InputSample {
        let Some(s) = self.published.get_mut(slot) else {
            return InputSample::UP;
        };
        if s.tracking_id < 0 {
            s.reported_id = -1;
            return InputSample::UP;
        }
        if s.reported_id >= 0 && s.reported_id != s.tracking_id {
            s.reported_id = -1;
            return InputSample::UP;
        }
        s.reported_id = s.tracking_id;
        InputSample {
            down: true,
            position: Vec2::new(s.x_norm * screen.x, s.y_norm * screen.y),
            width: s.major_norm * screen.x,
            height: s.minor_norm * screen.y,
            angle: 0.0,
        }
    }
}

fn norm(raw: i32, min: i32, max: i32) -> f32 {
    ((raw - min) as f32 / (max - min) as f32).clamp(0.0, 1.0)
}

pub struct TouchscreenInput {
    devs: Vec<Device>,
    tracker: SlotTracker,
    screen: Vec2,
}

impl TouchscreenInput {
    /// Opens every detected multitouch device; with none available the provider stays idle.
    pub fn open(screen_width: f32, screen_height: f32) -> Self {
        let mut devs = vec![];
        let mut tracker = SlotTracker::new();
        for d in discover_multitouch() {
            match Device::open(&d.path) {
                Ok(mut dev) => {
                    if let Err(e) = dev.set_nonblocking(true) {
                        warn!("touch: {} cannot be made non-blocking: {e}", d.path);
                        continue;
                    }
                    if devs.is_empty() {
                        apply_ranges(&dev, &mut tracker);
                    }
                    info!("touch: using {} ({})", d.name, d.path);
                    devs.push(dev);
                }
                Err(e) => warn!("touch: failed to open {}: {e}", d.path),
            }
        }
        if devs.is_empty() {
            warn!("touch: no multitouch devices detected; provider idle");
        }
        Self {
            devs,
            tracker,
            screen: Vec2::new(screen_width, screen_height),
        }
    }
}

fn apply_ranges(dev: &Device, tracker: &mut SlotTracker) {
    let Ok(infos) = dev.get_absinfo() else {
        return;
    };
    let (mut x, mut y) = ((0, 4096), (0, 4096));
    for (code, info) in infos {
        if code == AbsoluteAxisCode::ABS_MT_POSITION_X {
            x = (info.minimum(), info.maximum());
        } else if code == AbsoluteAxisCode::ABS_MT_POSITION_Y {
            y = (info.minimum(), info.maximum());
        }
    }
    tracker.set_norm_ranges(x.0, x.1, y.0, y.1);
}

impl InputProvider for TouchscreenInput {
    fn name(&self) -> &str {
        "touch"
    }

    fn max_inputs(&self) -> usize {
        MAX_TOUCH_SLOTS
    }

    fn begin_frame(&mut self) {
        for dev in self.devs.iter_mut() {
            let Ok(events) = dev.fetch_events() else {
                continue;
            };
            for ev in events {
                if ev.event_type() == EventType::ABSOLUTE {
                    match ev.code() {
                        c if c == AbsoluteAxisCode::ABS_MT_SLOT.0 => self.tracker.on_slot(ev.value()),
                        c if c == AbsoluteAxisCode::ABS_MT_TRACKING_ID.0 => {
                            self.tracker.on_tracking_id(ev.value())
                        }
                        c if c == AbsoluteAxisCode::ABS_MT_POSITION_X.0 => {
                            self.tracker.on_pos_x(ev.value())
                        }
                        c if c == AbsoluteAxisCode::ABS_MT_POSITION_Y.0 => {
                            self.tracker.on_pos_y(ev.value())
                        }
                        c if c == AbsoluteAxisCode::ABS_MT_TOUCH_MAJOR.0 => {
                            self.tracker.on_touch_major(ev.value())
                        }
                        c if c == AbsoluteAxisCode::ABS_MT_TOUCH_MINOR.0 => {
                            self.tracker.on_touch_minor(ev.value())
                        }
                        _ => {}
                    }
                } else if ev.event_type() == EventType::SYNCHRONIZATION
                    && ev.code() == SynchronizationCode::SYN_REPORT.0
                {
                    self.tracker.on_syn_report();
                }
            }
        }
    }

    fn sample(&mut self, index: usize) -> InputSample {
        self.tracker.read(index, self.screen)
    }
}
