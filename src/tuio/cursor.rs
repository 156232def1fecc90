//! TUIO 1.1 `/tuio/2Dcur` and `/tuio/2Dblb` message shapes.

use serde::Serialize;
use thiserror::Error;

use crate::geom::Vec2;
use crate::osc::{OscMessage, OscType};

#[derive(Debug, Error, PartialEq)]
pub enum TuioError {
    #[error("{0}: message has no command")]
    MissingCommand(&'static str),
    #[error("{addr}: unknown command '{command}'")]
    UnknownCommand { addr: &'static str, command: String },
    #[error("{addr} {command}: expected {expected} arguments, got {got}")]
    Arity {
        addr: &'static str,
        command: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{addr}: argument {index} should be {expected}")]
    BadArgument {
        addr: &'static str,
        index: usize,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorKind {
    Cursor,
    Blob,
}

impl CursorKind {
    pub const ALL: [CursorKind; 2] = [CursorKind::Cursor, CursorKind::Blob];

    pub fn address(self) -> &'static str {
        match self {
            CursorKind::Cursor => "/tuio/2Dcur",
            CursorKind::Blob => "/tuio/2Dblb",
        }
    }

    pub fn from_address(addr: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.address() == addr)
    }

    /// Arguments after `set` and the session id.
    fn set_arity(self) -> usize {
        match self {
            CursorKind::Cursor => 5,
            CursorKind::Blob => 11,
        }
    }
}

/// One cursor or blob state as carried by a `set` message. Coordinates are normalised 0..1.
///
/// Equality is exact on every field; the tracker uses it to tell a held cursor from an
/// updated one, so sub-ulp jitter from a tracker counts as an update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuioCursor {
    pub kind: CursorKind,
    pub session: i32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub accel: f32,
    pub angle: f32,
    pub width: f32,
    pub height: f32,
    pub area: f32,
    pub rotation_speed: f32,
    pub rotation_accel: f32,
}

impl TuioCursor {
    pub fn new(kind: CursorKind, session: i32, position: Vec2) -> Self {
        Self {
            kind,
            session,
            position,
            velocity: Vec2::ZERO,
            accel: 0.0,
            angle: 0.0,
            width: 0.0,
            height: 0.0,
            area: 0.0,
            rotation_speed: 0.0,
            rotation_accel: 0.0,
        }
    }

    /// Parses the arguments that follow `set`.
    pub fn from_set_args(kind: CursorKind, args: &[OscType]) -> Result<Self, TuioError> {
        let addr = kind.address();
        let expected = 1 + kind.set_arity();
        if args.len() != expected {
            return Err(TuioError::Arity {
                addr,
                command: "set",
                expected,
                got: args.len(),
            });
        }
        let session = args[0].as_int().ok_or(TuioError::BadArgument {
            addr,
            index: 1,
            expected: "int session id",
        })?;
        let f = |i: usize| {
            args[i].as_float().ok_or(TuioError::BadArgument {
                addr,
                index: i + 1,
                expected: "float",
            })
        };

        let mut c = TuioCursor::new(kind, session, Vec2::new(f(1)?, f(2)?));
        match kind {
            CursorKind::Cursor => {
                c.velocity = Vec2::new(f(3)?, f(4)?);
                c.accel = f(5)?;
            }
            CursorKind::Blob => {
                c.angle = f(3)?;
                c.width = f(4)?;
                c.height = f(5)?;
                c.area = f(6)?;
                c.velocity = Vec2::new(f(7)?, f(8)?);
                c.rotation_speed = f(9)?;
                c.accel = f(10)?;
                c.rotation_accel = f(11)?;
            }
        }
        Ok(c)
    }

    pub fn to_set_message(&self) -> OscMessage {
        let mut args: Vec<OscType> = vec![
            "set".into(),
            OscType::Int(self.session),
            OscType::Float(self.position.x),
            OscType::Float(self.position.y),
        ];
        match self.kind {
            CursorKind::Cursor => args.extend([
                OscType::Float(self.velocity.x),
                OscType::Float(self.velocity.y),
                OscType::Float(self.accel),
            ]),
            CursorKind::Blob => args.extend([
                OscType::Float(self.angle),
                OscType::Float(self.width),
                OscType::Float(self.height),
                OscType::Float(self.area),
                OscType::Float(self.velocity.x),
                OscType::Float(self.velocity.y),
                OscType::Float(self.rotation_speed),
                OscType::Float(self.accel),
                OscType::Float(self.rotation_accel),
            ]),
        }
        OscMessage::new(self.kind.address(), args)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TuioCommand {
    Source(String),
    Alive(Vec<i32>),
    Set(TuioCursor),
    Fseq(i32),
}

impl TuioCommand {
    pub fn parse(kind: CursorKind, msg: &OscMessage) -> Result<Self, TuioError> {
        let addr = kind.address();
        let Some(command) = msg.args.first().and_then(OscType::as_str) else {
            return Err(TuioError::MissingCommand(addr));
        };
        let rest = &msg.args[1..];
        match command {
            "source" => match rest {
                [OscType::String(s)] => Ok(TuioCommand::Source(s.clone())),
                _ => Err(TuioError::Arity {
                    addr,
                    command: "source",
                    expected: 1,
                    got: rest.len(),
                }),
            },
            "alive" => rest
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    a.as_int().ok_or(TuioError::BadArgument {
                        addr,
                        index: i + 1,
                        expected: "int session id",
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(TuioCommand::Alive),
            "set" => TuioCursor::from_set_args(kind, rest).map(TuioCommand::Set),
            "fseq" => match rest {
                [OscType::Int(n)] => Ok(TuioCommand::Fseq(*n)),
                [_] => Err(TuioError::BadArgument {
                    addr,
                    index: 1,
                    expected: "int frame id",
                }),
                _ => Err(TuioError::Arity {
                    addr,
                    command: "fseq",
                    expected: 1,
                    got: rest.len(),
                }),
            },
            other => Err(TuioError::UnknownCommand {
                addr,
                command: other.to_string(),
            }),
        }
    }

    pub fn alive_message(kind: CursorKind, sessions: &[i32]) -> OscMessage {
        let mut args: Vec<OscType> = vec!["alive".into()];
        args.extend(sessions.iter().map(|s| OscType::Int(*s)));
        OscMessage::new(kind.address(), args)
    }

    pub fn fseq_message(kind: CursorKind, fseq: i32) -> OscMessage {
        OscMessage::new(kind.address(), vec!["fseq".into(), OscType::Int(fseq)])
    }
}
