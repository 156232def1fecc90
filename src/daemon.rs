//! The long-running listener: OSC thread, fixed-rate frame loop, JSON lines on stdout.

use anyhow::Result;
use log::{debug, error, info, warn};
use serde::Serialize;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    io::{self, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crate::app::{self, AppEvent, AppInbox};
use crate::config::{self, DaemonConfigState, Overrides, Profile, ProfileWatcher};
use crate::context::{FrameReport, InputContext};
use crate::gesture::GestureEvent;
use crate::input::{InputProvider, InputSource, MouseInput, TouchscreenInput, TuioInput};
use crate::osc::{OscReceiver, OscSender, PacketSink, UdpSink};
use crate::tuio::{self, TuioTracker};

/// One stdout line.
#[derive(Debug, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum OutputLine<'a> {
    Gesture(&'a GestureEvent),
    App(&'a AppEvent),
}

pub fn write_line<W: Write>(out: &mut W, line: &OutputLine) -> Result<()> {
    serde_json::to_writer(&mut *out, line)?;
    out.write_all(b"\n")?;
    Ok(())
}

pub struct Runtime<S: PacketSink = UdpSink> {
    context: InputContext,
    provider: Box<dyn InputProvider>,
    inbox: AppInbox,
    sender: OscSender<S>,
    receiver: Option<OscReceiver>,
}

impl Runtime<UdpSink> {
    /// Binds the OSC port and opens the configured input source.
    pub fn start(profile: &Profile) -> Result<Self> {
        let allowed = profile.allowed_sender()?;
        let remote = profile.remote()?;
        let receiver = match OscReceiver::bind(profile.input.port, allowed) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!("osc: cannot bind port {}: {e}; network input disabled", profile.input.port);
                None
            }
        };
        let (table, inbox) = match &receiver {
            Some(r) => (tuio::attach(r), AppInbox::attach(r)),
            None => (TuioTracker::new().table(), AppInbox::default()),
        };

        let (w, h) = (profile.screen.width, profile.screen.height);
        let provider: Box<dyn InputProvider> = match profile.input.source {
            InputSource::Tuio => Box::new(TuioInput::new(table, w, h)),
            InputSource::Touch => Box::new(TouchscreenInput::open(w, h)),
            InputSource::Mouse => Box::new(MouseInput::open(w, h)),
        };
        info!("daemon: input source '{}'", provider.name());

        let mut rt = Self::with_parts(profile, provider, inbox, OscSender::connect(remote));
        rt.receiver = receiver;
        Ok(rt)
    }
}

impl<S: PacketSink> Runtime<S> {
    pub fn with_parts(
        profile: &Profile,
        provider: Box<dyn InputProvider>,
        inbox: AppInbox,
        mut sender: OscSender<S>,
    ) -> Self {
        sender.send(&app::game_init(), Instant::now());
        Self {
            context: InputContext::new(&profile.context_config()),
            provider,
            inbox,
            sender,
            receiver: None,
        }
    }

    pub fn context(&self) -> &InputContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut InputContext {
        &mut self.context
    }

    pub fn sender(&self) -> &OscSender<S> {
        &self.sender
    }

    /// Application messages first, then the input frame, then the sender's retry tick.
    /// A `ready` from the host is answered with `game/show`.
    pub fn frame<W: Write>(&mut self, now: f64, out: &mut W) -> Result<FrameReport> {
        for ev in self.inbox.drain() {
            if ev == AppEvent::Ready {
                self.sender.send(&app::game_show(), Instant::now());
            }
            write_line(out, &OutputLine::App(&ev))?;
        }
        let report = self.context.tick(&mut self.provider, now);
        for g in &report.gestures {
            write_line(out, &OutputLine::Gesture(g))?;
        }
        out.flush()?;
        self.sender.poll(Instant::now());
        Ok(report)
    }

    /// Tunables only; the source and port are fixed for the life of the process.
    pub fn apply(&mut self, profile: &Profile) {
        self.context.apply(&profile.context_config());
    }

    pub fn shutdown(&mut self, now: f64) -> FrameReport {
        if let Some(mut r) = self.receiver.take() {
            r.stop();
        }
        self.sender.send(&app::game_end(), Instant::now());
        let flushed = self.sender.flush();
        if self.sender.backlog_len() > 0 {
            warn!("daemon: {} outbound messages dropped at shutdown", self.sender.backlog_len());
        }
        debug!("daemon: flushed {flushed} outbound messages");
        self.context.shutdown(now)
    }
}

pub fn run_listen(profile_name: Option<&str>, overrides: &Overrides) -> Result<()> {
    let mut state = DaemonConfigState::load_or_install_default()?;
    if let Some(name) = profile_name {
        state.set_active(name)?;
    }
    info!("daemon: active profile '{}'", state.active_name);
    let mut profile = state.profile.clone();
    profile.apply(overrides);

    let stop = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register(sig, stop.clone())?;
    }
    let watcher = match ProfileWatcher::new(&state) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("profile hot reload disabled: {e}");
            None
        }
    };

    let mut rt = Runtime::start(&profile)?;
    let mut period = Duration::from_secs_f64(1.0 / profile.frame.rate_hz);
    let started = Instant::now();
    let stdout = io::stdout();

    while !stop.load(Ordering::SeqCst) {
        let tick_start = Instant::now();
        if watcher.as_ref().is_some_and(ProfileWatcher::changed) && config::refresh(&mut state) {
            let mut next = state.profile.clone();
            next.apply(overrides);
            if next.input != profile.input {
                warn!("daemon: [input] changes take effect after a restart");
            }
            rt.apply(&next);
            period = Duration::from_secs_f64(1.0 / next.frame.rate_hz);
            profile = next;
        }

        let now = started.elapsed().as_secs_f64();
        if let Err(e) = rt.frame(now, &mut stdout.lock()) {
            // stdout went away; nothing left to report to
            error!("daemon: output failed: {e}");
            break;
        }
        if let Some(rest) = period.checked_sub(tick_start.elapsed()) {
            thread::sleep(rest);
        }
    }

    info!("daemon: shutting down");
    rt.shutdown(started.elapsed().as_secs_f64());
    Ok(())
}
