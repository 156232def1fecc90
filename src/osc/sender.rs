//! Outbound OSC over UDP with a retrying backlog for when the socket is not ready.

use log::{debug, info, warn};
use std::{
    collections::VecDeque,
    io,
    net::{SocketAddr, UdpSocket},
    time::{Duration, Instant},
};

use super::codec::{OscMessage, encode_message};

/// Messages flushed per retry tick.
pub const MAX_BACKLOG_SALVO: usize = 20;
pub const RETRY_WAIT: Duration = Duration::from_millis(500);

/// Transport under the sender. `UdpSink` in production, an in-memory sink in tests.
pub trait PacketSink {
    fn open(&mut self) -> io::Result<()>;
    fn is_open(&self) -> bool;
    fn send_packet(&mut self, bytes: &[u8]) -> io::Result<()>;
}

#[derive(Debug)]
pub struct UdpSink {
    remote: SocketAddr,
    socket: Option<UdpSocket>,
}

impl UdpSink {
    pub fn new(remote: SocketAddr) -> Self {
        Self {
            remote,
            socket: None,
        }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

impl PacketSink for UdpSink {
    fn open(&mut self) -> io::Result<()> {
        let bind_addr: SocketAddr = if self.remote.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(self.remote)?;
        self.socket = Some(socket);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn send_packet(&mut self, bytes: &[u8]) -> io::Result<()> {
        let Some(socket) = &self.socket else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket not open"));
        };
        match socket.send(bytes) {
            Ok(_) => Ok(()),
            Err(e) => {
                // a refused send leaves the socket usable; anything else forces a reopen
                if e.kind() != io::ErrorKind::ConnectionRefused {
                    self.socket = None;
                }
                Err(e)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

pub struct OscSender<S: PacketSink = UdpSink> {
    sink: S,
    backlog: VecDeque<(String, Vec<u8>)>,
    next_retry: Option<Instant>,
    consecutive_fails: u32,
}

impl OscSender<UdpSink> {
    /// Opens a UDP sender; a failed open is logged and left to the backlog retry.
    pub fn connect(remote: SocketAddr) -> Self {
        let mut sink = UdpSink::new(remote);
        match sink.open() {
            Ok(()) => info!("osc: sending to {remote}"),
            Err(e) => warn!("osc: could not open socket to {remote}, will retry: {e}"),
        }
        Self::with_sink(sink)
    }
}

impl<S: PacketSink> OscSender<S> {
    pub fn with_sink(sink: S) -> Self {
        Self {
            sink,
            backlog: VecDeque::new(),
            next_retry: None,
            consecutive_fails: 0,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Sends now if possible. Once anything is queued, later messages queue behind it
    /// so delivery order always matches call order.
    pub fn send(&mut self, msg: &OscMessage, now: Instant) -> Delivery {
        let bytes = encode_message(msg);
        if self.backlog.is_empty() && self.sink.is_open() {
            match self.sink.send_packet(&bytes) {
                Ok(()) => {
                    self.consecutive_fails = 0;
                    return Delivery::Sent;
                }
                Err(e) => self.note_failure(&msg.addr, &e),
            }
        }
        self.backlog.push_back((msg.addr.clone(), bytes));
        if self.next_retry.is_none() {
            self.next_retry = Some(now + RETRY_WAIT);
        }
        debug!("osc: queued {} ({} in backlog)", msg.addr, self.backlog.len());
        Delivery::Queued
    }

    /// Retry tick: once `RETRY_WAIT` has passed, reopens the sink if needed and sends
    /// up to `MAX_BACKLOG_SALVO` queued messages. Returns how many went out.
    pub fn poll(&mut self, now: Instant) -> usize {
        match self.next_retry {
            None => 0,
            Some(at) if now < at => 0,
            Some(_) => {
                let sent = self.salvo();
                self.next_retry = (!self.backlog.is_empty()).then_some(now + RETRY_WAIT);
                sent
            }
        }
    }

    /// One salvo regardless of the retry timer; used on shutdown.
    pub fn flush(&mut self) -> usize {
        let sent = self.salvo();
        if self.backlog.is_empty() {
            self.next_retry = None;
        }
        sent
    }

    fn salvo(&mut self) -> usize {
        if self.backlog.is_empty() {
            return 0;
        }
        if !self.sink.is_open() {
            if let Err(e) = self.sink.open() {
                self.note_failure("<open>", &e);
                return 0;
            }
        }
        let mut sent = 0;
        while sent < MAX_BACKLOG_SALVO {
            let Some((addr, bytes)) = self.backlog.front() else {
                break;
            };
            match self.sink.send_packet(bytes) {
                Ok(()) => {
                    self.backlog.pop_front();
                    sent += 1;
                }
                Err(e) => {
                    let addr = addr.clone();
                    self.note_failure(&addr, &e);
                    break;
                }
            }
        }
        if sent > 0 {
            self.consecutive_fails = 0;
            debug!("osc: flushed {sent} from backlog, {} left", self.backlog.len());
        }
        sent
    }

    fn note_failure(&mut self, what: &str, e: &io::Error) {
        self.consecutive_fails += 1;
        if self.consecutive_fails == 1 {
            warn!("osc: send of {what} failed, backlogging: {e}");
        } else {
            debug!("osc: send of {what} failed ({} in a row): {e}", self.consecutive_fails);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osc::codec::{OscPacket, OscType, decode};

    #[derive(Default)]
    struct MemorySink {
        open: bool,
        openable: bool,
        sent: Vec<Vec<u8>>,
    }

    impl PacketSink for MemorySink {
        fn open(&mut self) -> io::Result<()> {
            if self.openable {
                self.open = true;
                Ok(())
            } else {
                Err(io::Error::other("not yet"))
            }
        }
        fn is_open(&self) -> bool {
            self.open
        }
        fn send_packet(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.sent.push(bytes.to_vec());
            Ok(())
        }
    }

    fn sent_ints(sink: &MemorySink) -> Vec<i32> {
        sink.sent
            .iter()
            .map(|b| match decode(b).unwrap() {
                OscPacket::Message(m) => m.args[0].as_int().unwrap(),
                OscPacket::Bundle(_) => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn backlog_drains_in_salvos_and_in_order() {
        let t0 = Instant::now();
        let mut sender = OscSender::with_sink(MemorySink::default());
        for i in 0..45 {
            let m = OscMessage::new("/n", vec![OscType::Int(i)]);
            assert_eq!(sender.send(&m, t0), Delivery::Queued);
        }
        assert_eq!(sender.backlog_len(), 45);

        // not yet due, then due but the sink still refuses to open
        assert_eq!(sender.poll(t0), 0);
        assert_eq!(sender.poll(t0 + RETRY_WAIT), 0);
        assert_eq!(sender.backlog_len(), 45);

        sender.sink_mut().openable = true;
        let mut t = t0 + RETRY_WAIT * 2;
        assert_eq!(sender.poll(t), 20);
        assert_eq!(sender.sink().sent.len(), 20);
        // the next salvo waits for the retry interval
        assert_eq!(sender.poll(t), 0);
        t += RETRY_WAIT;
        assert_eq!(sender.poll(t), 20);
        assert_eq!(sender.sink().sent.len(), 40);
        t += RETRY_WAIT;
        assert_eq!(sender.poll(t), 5);
        assert_eq!(sender.backlog_len(), 0);

        assert_eq!(sent_ints(sender.sink()), (0..45).collect::<Vec<_>>());
        assert_eq!(sender.poll(t + RETRY_WAIT), 0);
    }

    #[test]
    fn messages_queue_behind_a_pending_backlog() {
        let t0 = Instant::now();
        let mut sender = OscSender::with_sink(MemorySink::default());
        sender.send(&OscMessage::new("/n", vec![OscType::Int(1)]), t0);
        sender.sink_mut().openable = true;
        sender.sink_mut().open = true;
        // the socket is ready but an older message is still waiting
        assert_eq!(
            sender.send(&OscMessage::new("/n", vec![OscType::Int(2)]), t0),
            Delivery::Queued
        );
        assert_eq!(sender.flush(), 2);
        assert_eq!(
            sender.send(&OscMessage::new("/n", vec![OscType::Int(3)]), t0),
            Delivery::Sent
        );
        assert_eq!(sent_ints(sender.sink()), vec![1, 2, 3]);
    }

    #[test]
    fn udp_sender_delivers_to_a_local_socket() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        rx.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut sender = OscSender::connect(rx.local_addr().unwrap());
        let msg = OscMessage::new("/ghpr/game/end", vec!["game".into()]);
        assert_eq!(sender.send(&msg, Instant::now()), Delivery::Sent);

        let mut buf = [0u8; 256];
        let n = rx.recv(&mut buf).unwrap();
        assert_eq!(decode(&buf[..n]).unwrap(), OscPacket::Message(msg));
    }
}
