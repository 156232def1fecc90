//! Application messages that share the OSC transport with TUIO.
//!
//! Inbound `/ghpr/...` messages are queued on the network thread and routed by longest
//! matching prefix when the frame loop drains them. Outbound messages name their sender
//! (`"game"`) as the first argument.

use log::{debug, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::osc::{OscMessage, OscReceiver, OscType};

pub const API_ROOT: &str = "/ghpr/";
pub const PLAYER_PREFIX: &str = "/ghpr/player/";
pub const GAME_PREFIX: &str = "/ghpr/game/";
pub const BEZEL_PREFIX: &str = "/ghpr/bezel/";

/// Who outbound messages say they come from.
pub const SENDER_NAME: &str = "game";

#[derive(Debug, Error, PartialEq)]
pub enum AppError {
    #[error("no route for {0}")]
    NoRoute(String),
    #[error("{addr}: unknown method '{method}'")]
    UnknownMethod { addr: String, method: String },
    #[error("{0}: player id is not an integer")]
    BadPlayerId(String),
    #[error("{addr}: argument {index} should be {expected}")]
    BadArgument {
        addr: String,
        index: usize,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AppEvent {
    PlayerAdded {
        player: i32,
        angle: i32,
        first_name: String,
        last_name: String,
        color: i32,
    },
    PlayerRemoved {
        player: i32,
    },
    Ready,
    Paused,
    Unpaused,
    ScreenOffset {
        x: i32,
        y: i32,
    },
    /// Passed through untouched; `path` is the address after the bezel prefix.
    Bezel {
        path: String,
        args: Vec<OscType>,
    },
}

type Route = fn(&OscMessage, &str) -> Result<AppEvent, AppError>;

const ROUTES: [(&str, Route); 3] = [
    (PLAYER_PREFIX, player_event as Route),
    (GAME_PREFIX, game_event as Route),
    (BEZEL_PREFIX, bezel_event as Route),
];

/// Routes one message to the handler with the longest matching prefix.
pub fn route(msg: &OscMessage) -> Result<AppEvent, AppError> {
    let (prefix, handler) = ROUTES
        .iter()
        .filter(|(p, _)| msg.addr.starts_with(p))
        .max_by_key(|(p, _)| p.len())
        .ok_or_else(|| AppError::NoRoute(msg.addr.clone()))?;
    handler(msg, &msg.addr[prefix.len()..])
}

fn int_arg(msg: &OscMessage, index: usize) -> Result<i32, AppError> {
    msg.args
        .get(index)
        .and_then(OscType::as_int)
        .ok_or_else(|| AppError::BadArgument {
            addr: msg.addr.clone(),
            index,
            expected: "an int",
        })
}

fn str_arg(msg: &OscMessage, index: usize) -> Result<String, AppError> {
    msg.args
        .get(index)
        .and_then(OscType::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::BadArgument {
            addr: msg.addr.clone(),
            index,
            expected: "a string",
        })
}

fn unknown(msg: &OscMessage, method: &str) -> AppError {
    AppError::UnknownMethod {
        addr: msg.addr.clone(),
        method: method.to_string(),
    }
}

// `/ghpr/player/<id>/<method>`; argument 0 names the sender.
fn player_event(msg: &OscMessage, rest: &str) -> Result<AppEvent, AppError> {
    let mut parts = rest.split('/');
    let player: i32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| AppError::BadPlayerId(msg.addr.clone()))?;
    match parts.next().unwrap_or("") {
        "add" => Ok(AppEvent::PlayerAdded {
            player,
            angle: int_arg(msg, 1)?,
            first_name: str_arg(msg, 2)?,
            last_name: str_arg(msg, 3)?,
            color: int_arg(msg, 4)?,
        }),
        "remove" => Ok(AppEvent::PlayerRemoved { player }),
        other => Err(unknown(msg, other)),
    }
}

fn game_event(msg: &OscMessage, rest: &str) -> Result<AppEvent, AppError> {
    match rest.split('/').next().unwrap_or("") {
        "ready" => Ok(AppEvent::Ready),
        "pause" => Ok(AppEvent::Paused),
        "unpause" => Ok(AppEvent::Unpaused),
        "offset" => Ok(AppEvent::ScreenOffset {
            x: int_arg(msg, 1)?,
            y: int_arg(msg, 2)?,
        }),
        other => Err(unknown(msg, other)),
    }
}

fn bezel_event(msg: &OscMessage, rest: &str) -> Result<AppEvent, AppError> {
    Ok(AppEvent::Bezel {
        path: rest.to_string(),
        args: msg.args.clone(),
    })
}

/// Messages received off-thread, waiting for the frame loop.
#[derive(Clone, Default)]
pub struct AppInbox {
    queue: Arc<Mutex<Vec<OscMessage>>>,
}

impl AppInbox {
    /// Queues every `/ghpr/` message `receiver` sees.
    pub fn attach(receiver: &OscReceiver) -> Self {
        let inbox = Self::default();
        let queue = inbox.queue.clone();
        receiver.on_any(move |msg| {
            if msg.addr.starts_with(API_ROOT) {
                queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(msg.clone());
            }
            Ok(())
        });
        inbox
    }

    pub fn push(&self, msg: OscMessage) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(msg);
    }

    /// Takes everything queued so far and routes it outside the lock.
    pub fn drain(&self) -> Vec<AppEvent> {
        let pending = std::mem::take(&mut *self.queue.lock().unwrap_or_else(PoisonError::into_inner));
        pending
            .iter()
            .filter_map(|m| match route(m) {
                Ok(ev) => {
                    debug!("app: {} -> {ev:?}", m.addr);
                    Some(ev)
                }
                Err(e) => {
                    warn!("app: {e}");
                    None
                }
            })
            .collect()
    }
}

/// `/ghpr/game/<method>` with the sender name prepended to `args`.
pub fn game_message(method: &str, args: Vec<OscType>) -> OscMessage {
    let mut all = Vec::with_capacity(args.len() + 1);
    all.push(OscType::from(SENDER_NAME));
    all.extend(args);
    OscMessage::new(format!("{GAME_PREFIX}{method}"), all)
}

/// The game is up and wants its players and offset.
pub fn game_init() -> OscMessage {
    game_message("init", vec![])
}

/// Reply to the host's `ready`: setup is done, bring the game to the front.
pub fn game_show() -> OscMessage {
    game_message("show", vec![])
}

/// The game is finished and may be closed.
pub fn game_end() -> OscMessage {
    game_message("end", vec![])
}
