//! OSC 1.0 packet encoding and decoding (messages, bundles, `i f s b` arguments).

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OscError {
    #[error("empty packet")]
    Empty,
    #[error("packet must start with '/' or '#', got 0x{0:02x}")]
    BadPacketStart(u8),
    #[error("packet truncated at offset {0}")]
    Truncated(usize),
    #[error("unsupported type tag '{0}'")]
    UnsupportedTag(char),
    #[error("string at offset {0} is not terminated or not utf-8")]
    BadString(usize),
    #[error("malformed bundle: {0}")]
    BadBundle(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OscType {
    Int(i32),
    Float(f32),
    String(String),
    Blob(Vec<u8>),
}

impl OscType {
    pub fn tag(&self) -> char {
        match self {
            OscType::Int(_) => 'i',
            OscType::Float(_) => 'f',
            OscType::String(_) => 's',
            OscType::Blob(_) => 'b',
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            OscType::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value; ints are widened since some trackers send them for coordinates.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            OscType::Float(v) => Some(*v),
            OscType::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscType::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for OscType {
    fn from(v: i32) -> Self {
        OscType::Int(v)
    }
}

impl From<f32> for OscType {
    fn from(v: f32) -> Self {
        OscType::Float(v)
    }
}

impl From<&str> for OscType {
    fn from(v: &str) -> Self {
        OscType::String(v.to_string())
    }
}

impl From<String> for OscType {
    fn from(v: String) -> Self {
        OscType::String(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub addr: String,
    pub args: Vec<OscType>,
}

impl OscMessage {
    pub fn new(addr: impl Into<String>, args: Vec<OscType>) -> Self {
        Self {
            addr: addr.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscBundle {
    /// NTP time tag; `1` means "immediately".
    pub timetag: u64,
    pub content: Vec<OscPacket>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle(OscBundle),
}

impl OscPacket {
    /// Messages in wire order, bundles flattened depth-first.
    pub fn into_messages(self) -> Vec<OscMessage> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(self, out: &mut Vec<OscMessage>) {
        match self {
            OscPacket::Message(m) => out.push(m),
            OscPacket::Bundle(b) => {
                for p in b.content {
                    p.flatten_into(out);
                }
            }
        }
    }
}

const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

pub fn decode(buf: &[u8]) -> Result<OscPacket, OscError> {
    match buf.first() {
        None => Err(OscError::Empty),
        Some(b'/') => decode_message(buf).map(OscPacket::Message),
        Some(b'#') => decode_bundle(buf).map(OscPacket::Bundle),
        Some(&b) => Err(OscError::BadPacketStart(b)),
    }
}

fn decode_message(buf: &[u8]) -> Result<OscMessage, OscError> {
    let mut r = Reader { buf, pos: 0 };
    let addr = r.string()?;

    // a message with no type tag string is legal in OSC 1.0 and carries no arguments
    if r.pos >= buf.len() {
        return Ok(OscMessage::new(addr, vec![]));
    }
    let tags_at = r.pos;
    let tags = r.string()?;
    let Some(tags) = tags.strip_prefix(',') else {
        return Err(OscError::BadString(tags_at));
    };

    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        let arg = match tag {
            'i' => OscType::Int(i32::from_be_bytes(r.take4()?)),
            'f' => OscType::Float(f32::from_be_bytes(r.take4()?)),
            's' => OscType::String(r.string()?),
            'b' => {
                let len = i32::from_be_bytes(r.take4()?);
                if len < 0 {
                    return Err(OscError::Truncated(r.pos));
                }
                let data = r.take(len as usize)?.to_vec();
                r.skip_pad(len as usize)?;
                OscType::Blob(data)
            }
            other => return Err(OscError::UnsupportedTag(other)),
        };
        args.push(arg);
    }
    Ok(OscMessage::new(addr, args))
}

fn decode_bundle(buf: &[u8]) -> Result<OscBundle, OscError> {
    if buf.len() < 16 {
        return Err(OscError::BadBundle("shorter than header"));
    }
    if &buf[..8] != BUNDLE_TAG {
        return Err(OscError::BadBundle("missing #bundle tag"));
    }
    let mut r = Reader { buf, pos: 8 };
    let tt = r.take(8)?;
    let mut tt_bytes = [0u8; 8];
    tt_bytes.copy_from_slice(tt);
    let timetag = u64::from_be_bytes(tt_bytes);

    let mut content = Vec::new();
    while r.pos < buf.len() {
        let size = i32::from_be_bytes(r.take4()?);
        if size < 0 || size % 4 != 0 {
            return Err(OscError::BadBundle("element size not a multiple of 4"));
        }
        let elem = r.take(size as usize)?;
        content.push(decode(elem)?);
    }
    Ok(OscBundle { timetag, content })
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], OscError> {
        let end = self.pos.checked_add(n).ok_or(OscError::Truncated(self.pos))?;
        if end > self.buf.len() {
            return Err(OscError::Truncated(self.pos));
        }
        let s = &self.buf[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    fn take4(&mut self) -> Result<[u8; 4], OscError> {
        let s = self.take(4)?;
        Ok([s[0], s[1], s[2], s[3]])
    }

    fn skip_pad(&mut self, len: usize) -> Result<(), OscError> {
        let pad = padded_len(len) - len;
        self.take(pad).map(|_| ())
    }

    fn string(&mut self) -> Result<String, OscError> {
        let start = self.pos;
        let rest = &self.buf[start..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(OscError::BadString(start))?;
        let s = std::str::from_utf8(&rest[..nul]).map_err(|_| OscError::BadString(start))?;
        let total = padded_len(nul + 1);
        if start + total > self.buf.len() {
            return Err(OscError::Truncated(start));
        }
        self.pos = start + total;
        Ok(s.to_string())
    }
}

fn padded_len(n: usize) -> usize {
    (n + 3) & !3
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    let total = padded_len(s.len() + 1);
    out.resize(out.len() + (total - s.len()), 0);
}

pub fn encode_message(msg: &OscMessage) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    write_string(&mut out, &msg.addr);

    let mut tags = String::with_capacity(msg.args.len() + 1);
    tags.push(',');
    tags.extend(msg.args.iter().map(OscType::tag));
    write_string(&mut out, &tags);

    for arg in &msg.args {
        match arg {
            OscType::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            OscType::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
            OscType::String(s) => write_string(&mut out, s),
            OscType::Blob(b) => {
                out.extend_from_slice(&(b.len() as i32).to_be_bytes());
                out.extend_from_slice(b);
                out.resize(out.len() + (padded_len(b.len()) - b.len()), 0);
            }
        }
    }
    out
}

pub fn encode(packet: &OscPacket) -> Vec<u8> {
    match packet {
        OscPacket::Message(m) => encode_message(m),
        OscPacket::Bundle(b) => {
            let mut out = Vec::with_capacity(64);
            out.extend_from_slice(BUNDLE_TAG);
            out.extend_from_slice(&b.timetag.to_be_bytes());
            for p in &b.content {
                let elem = encode(p);
                out.extend_from_slice(&(elem.len() as i32).to_be_bytes());
                out.extend_from_slice(&elem);
            }
            out
        }
    }
}
