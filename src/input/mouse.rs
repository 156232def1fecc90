//! Pointer device through evdev; each of the three buttons is its own input at the cursor.

use evdev::{Device, EventType, KeyCode, RelativeAxisCode};
use log::{info, warn};

use super::touchscreen::{DeviceInfo, discover};
use super::{InputProvider, InputSample};
use crate::geom::Vec2;

const BUTTONS: [KeyCode; 3] = [KeyCode::BTN_LEFT, KeyCode::BTN_RIGHT, KeyCode::BTN_MIDDLE];

pub fn discover_pointers() -> Vec<DeviceInfo> {
    discover(|dev| {
        let rel = dev
            .supported_relative_axes()
            .is_some_and(|a| a.contains(RelativeAxisCode::REL_X) && a.contains(RelativeAxisCode::REL_Y));
        let keys = dev
            .supported_keys()
            .is_some_and(|k| k.contains(KeyCode::BTN_LEFT));
        rel && keys
    })
}

/// Cursor and button state, separate from the device so it can be driven directly.
#[derive(Debug, Clone)]
pub struct PointerState {
    pub position: Vec2,
    pub buttons: [bool; 3],
    screen: Vec2,
}

impl PointerState {
    pub fn new(screen: Vec2) -> Self {
        Self {
            position: screen / 2.0,
            buttons: [false; 3],
            screen,
        }
    }

    pub fn on_rel(&mut self, axis: u16, delta: i32) {
        if axis == RelativeAxisCode::REL_X.0 {
            self.position.x = (self.position.x + delta as f32).clamp(0.0, self.screen.x);
        } else if axis == RelativeAxisCode::REL_Y.0 {
            self.position.y = (self.position.y + delta as f32).clamp(0.0, self.screen.y);
        }
    }

    pub fn on_key(&mut self, code: u16, value: i32) {
        if let Some(i) = BUTTONS.iter().position(|b| b.0 == code) {
            // 0 release, 1 press, 2 autorepeat
            self.buttons[i] = value != 0;
        }
    }

    pub fn sample(&self, index: usize) -> InputSample {
        match self.buttons.get(index) {
            Some(true) => InputSample::down_at(self.position),
            _ => InputSample::UP,
        }
    }
}

pub struct MouseInput {
    devs: Vec<Device>,
    state: PointerState,
}

impl MouseInput {
    pub fn open(screen_width: f32, screen_height: f32) -> Self {
        let mut devs = vec![];
        for d in discover_pointers() {
            match Device::open(&d.path) {
                Ok(mut dev) => {
                    if let Err(e) = dev.set_nonblocking(true) {
                        warn!("mouse: {} cannot be made non-blocking: {e}", d.path);
                        continue;
                    }
                    info!("mouse: using {} ({})", d.name, d.path);
                    devs.push(dev);
                }
                Err(e) => warn!("mouse: failed to open {}: {e}", d.path),
            }
        }
        if devs.is_empty() {
            warn!("mouse: no pointer devices detected; provider idle");
        }
        Self {
            devs,
            state: PointerState::new(Vec2::new(screen_width, screen_height)),
        }
    }
}

impl InputProvider for MouseInput {
    fn name(&self) -> &str {
        "mouse"
    }

    fn max_inputs(&self) -> usize {
        BUTTONS.len()
    }

    fn begin_frame(&mut self) {
        for dev in self.devs.iter_mut() {
            let Ok(events) = dev.fetch_events() else {
                continue;
            };
            for ev in events {
                if ev.event_type() == EventType::RELATIVE {
                    self.state.on_rel(ev.code(), ev.value());
                } else if ev.event_type() == EventType::KEY {
                    self.state.on_key(ev.code(), ev.value());
                }
            }
        }
    }

    fn sample(&mut self, index: usize) -> InputSample {
        self.state.sample(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buttons_are_coincident_inputs_and_motion_clamps() {
        let mut p = PointerState::new(Vec2::new(800.0, 600.0));
        assert_eq!(p.position, Vec2::new(400.0, 300.0));

        p.on_rel(RelativeAxisCode::REL_X.0, 1000);
        p.on_rel(RelativeAxisCode::REL_Y.0, -50);
        assert_eq!(p.position, Vec2::new(800.0, 250.0));

        p.on_key(KeyCode::BTN_LEFT.0, 1);
        p.on_key(KeyCode::BTN_MIDDLE.0, 1);
        assert!(p.sample(0).down);
        assert!(!p.sample(1).down);
        assert_eq!(p.sample(2).position, p.sample(0).position);

        p.on_key(KeyCode::BTN_LEFT.0, 0);
        assert!(!p.sample(0).down);
        assert!(!p.sample(3).down);
    }
}
