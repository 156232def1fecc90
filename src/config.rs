use anyhow::{Context, Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::{
    fs,
    io::Write,
    net::{IpAddr, SocketAddr},
    ops::RangeInclusive,
    path::{Path, PathBuf},
    sync::mpsc,
};

use crate::cluster::ClusterConfig;
use crate::context::ContextConfig;
use crate::gesture::GestureConfig;
use crate::input::InputSource;
use crate::router::RouterConfig;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InputSection {
    pub source: InputSource,
    /// UDP port for OSC/TUIO.
    pub port: u16,
    /// Only datagrams from this address (or loopback) are handled; empty accepts any sender.
    pub allowed_sender: String,
    /// Where outbound application messages go.
    pub remote: String,
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            source: InputSource::Tuio,
            port: 3336,
            allowed_sender: String::new(),
            remote: "127.0.0.1:3335".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScreenSection {
    pub width: f32,
    pub height: f32,
}

impl Default for ScreenSection {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameSection {
    pub rate_hz: f64,
    pub stale_frames: u64,
}

impl Default for FrameSection {
    fn default() -> Self {
        Self {
            rate_hz: 60.0,
            stale_frames: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    pub separate_gui_input: bool,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            separate_gui_input: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    pub radius: f32,
    pub time_tolerance: f64,
}

impl Default for ClusterSection {
    fn default() -> Self {
        let d = ClusterConfig::default();
        Self {
            radius: d.radius,
            time_tolerance: d.time_tolerance,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub meta: Meta,
    pub input: InputSection,
    pub screen: ScreenSection,
    pub frame: FrameSection,
    pub router: RouterSection,
    pub cluster: ClusterSection,

    // `[tap]`, `[drag]`, ... sit at the top level of the file
    #[serde(flatten)]
    pub gestures: GestureConfig,
}

/// Command-line values that win over the profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub port: Option<u16>,
    pub source: Option<InputSource>,
    pub allowed_sender: Option<String>,
}

impl Profile {
    pub fn from_toml(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt)?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn context_config(&self) -> ContextConfig {
        ContextConfig {
            screen_width: self.screen.width,
            screen_height: self.screen.height,
            router: RouterConfig {
                stale_frames: self.frame.stale_frames,
                separate_gui_input: self.router.separate_gui_input,
            },
            cluster: ClusterConfig {
                radius: self.cluster.radius,
                time_tolerance: self.cluster.time_tolerance,
            },
            gestures: self.gestures.clone(),
        }
    }

    pub fn apply(&mut self, o: &Overrides) {
        if let Some(port) = o.port {
            self.input.port = port;
        }
        if let Some(source) = o.source {
            self.input.source = source;
        }
        if let Some(allow) = &o.allowed_sender {
            self.input.allowed_sender = allow.clone();
        }
    }

    pub fn allowed_sender(&self) -> Result<Option<IpAddr>> {
        let s = self.input.allowed_sender.trim();
        if s.is_empty() {
            return Ok(None);
        }
        s.parse()
            .map(Some)
            .map_err(|e| anyhow!("input.allowed_sender '{s}': {e}"))
    }

    pub fn remote(&self) -> Result<SocketAddr> {
        self.input
            .remote
            .parse()
            .map_err(|e| anyhow!("input.remote '{}': {e}", self.input.remote))
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("no home directory"))?;
    Ok(dirs.home_dir().join(".config").join("ghopper"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::load_in(config_dir()?)
    }

    /// Same as [`DaemonConfigState::load_or_install_default`] rooted at `cfgdir`.
    pub fn load_in(cfgdir: PathBuf) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)
            .with_context(|| format!("creating {}", profdir.display()))?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn active_path(&self) -> PathBuf {
        self.profiles_dir.join(format!("{}.toml", self.active_name))
    }

    /// Re-reads the active profile; on error the previous one stays in place.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let devices: Vec<String> = crate::input::touchscreen::discover_multitouch()
            .into_iter()
            .map(|d| format!("{} ({})", d.name, d.path))
            .collect();
        let pointers: Vec<String> = crate::input::mouse::discover_pointers()
            .into_iter()
            .map(|d| format!("{} ({})", d.name, d.path))
            .collect();
        serde_json::json!({
            "input_group_member": check_in_input_group(),
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "source": format!("{:?}", self.profile.input.source).to_lowercase(),
            "port": self.profile.input.port,
            "remote": self.profile.input.remote,
            "touch_devices": devices,
            "pointer_devices": pointers,
            "hints": {
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input",
                "tuio": "point the tracker at udp://<this host>:<port>"
            }
        })
    }
}

fn load_profile(dir: &Path, name: &str) -> Result<Profile> {
    let path = dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::from_toml(&txt).map_err(|e| anyhow!("failed to parse {}: {e:#}", path.display()))
}

const FRAME_RATE_HZ: RangeInclusive<f64> = 1.0..=1000.0;

fn non_negative(what: &str, v: f64) -> Result<()> {
    if v < 0.0 || v.is_nan() {
        return Err(anyhow!("{what} must not be negative"));
    }
    Ok(())
}

fn validate_profile(p: &Profile) -> Result<()> {
    if !FRAME_RATE_HZ.contains(&p.frame.rate_hz) {
        return Err(anyhow!(
            "frame.rate_hz must be between {} and {}",
            FRAME_RATE_HZ.start(),
            FRAME_RATE_HZ.end()
        ));
    }
    if p.frame.stale_frames == 0 {
        return Err(anyhow!("frame.stale_frames must be at least 1"));
    }
    if !(p.screen.width > 0.0 && p.screen.height > 0.0) {
        return Err(anyhow!("screen.width and screen.height must be positive"));
    }
    non_negative("cluster.radius", p.cluster.radius.into())?;
    non_negative("cluster.time_tolerance", p.cluster.time_tolerance)?;

    let g = &p.gestures;
    for (what, fingers) in [
        ("tap.fingers", g.tap.fingers),
        ("drag.fingers", g.drag.fingers),
        ("swipe.fingers", g.swipe.fingers),
        ("long_press.fingers", g.long_press.fingers),
    ] {
        if fingers == 0 {
            return Err(anyhow!("{what} must be at least 1"));
        }
    }
    if g.tap.required_taps == 0 {
        return Err(anyhow!("tap.required_taps must be at least 1"));
    }
    non_negative("tap.move_tolerance", g.tap.move_tolerance.into())?;
    non_negative("tap.max_duration", g.tap.max_duration)?;
    non_negative("tap.max_delay_between_taps", g.tap.max_delay_between_taps)?;
    non_negative("drag.move_tolerance", g.drag.move_tolerance.into())?;
    non_negative("swipe.min_distance", g.swipe.min_distance.into())?;
    non_negative("swipe.max_distance", g.swipe.max_distance.into())?;
    non_negative("swipe.min_velocity", g.swipe.min_velocity.into())?;
    non_negative("swipe.max_deviation", g.swipe.max_deviation.into())?;
    non_negative("pinch.direction_tolerance", g.pinch.direction_tolerance.into())?;
    non_negative("pinch.min_distance", g.pinch.min_distance.into())?;
    non_negative("twist.direction_tolerance", g.twist.direction_tolerance.into())?;
    non_negative("twist.min_rotation", g.twist.min_rotation.into())?;
    non_negative("long_press.move_tolerance", g.long_press.move_tolerance.into())?;
    if !(g.long_press.duration > 0.0) {
        return Err(anyhow!("long_press.duration must be positive"));
    }
    if g.swipe.valid_directions.is_empty() {
        warn!("swipe.valid_directions is empty; no swipe will ever complete");
    }
    Ok(())
}

/// Flags edits to the profiles directory or the active pointer.
pub struct ProfileWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<notify::Result<notify::Event>>,
}

impl ProfileWatcher {
    pub fn new(state: &DaemonConfigState) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx)?;
        watcher.watch(&state.profiles_dir, RecursiveMode::NonRecursive)?;
        watcher.watch(&state.active_ptr, RecursiveMode::NonRecursive)?;
        info!("watching {} for profile edits", state.profiles_dir.display());
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// True when anything relevant changed since the last call.
    pub fn changed(&self) -> bool {
        let mut changed = false;
        while let Ok(ev) = self.rx.try_recv() {
            match ev {
                Ok(ev) if matches!(ev.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                    changed = true;
                }
                Ok(_) => {}
                Err(e) => warn!("profile watch: {e}"),
            }
        }
        changed
    }
}

/// Picks up a switched pointer or edited profile; the last good profile stays on failure.
pub fn refresh(state: &mut DaemonConfigState) -> bool {
    let pointed = fs::read_to_string(&state.active_ptr)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| state.active_name.clone());
    let result = if pointed != state.active_name {
        state.set_active(&pointed)
    } else {
        state.reload()
    };
    match result {
        Ok(()) => {
            info!("profile '{}' reloaded", state.active_name);
            true
        }
        Err(e) => {
            warn!("profile reload failed, keeping the previous one: {e:#}");
            false
        }
    }
}

pub(crate) fn check_in_input_group() -> bool {
    let Ok(s) = fs::read_to_string("/etc/group") else {
        return false;
    };
    let user = whoami::username();
    s.lines()
        .filter(|line| line.starts_with("input:"))
        .any(|line| {
            line.split(':')
                .nth(3)
                .unwrap_or("")
                .split(',')
                .any(|u| u == user)
        })
}
