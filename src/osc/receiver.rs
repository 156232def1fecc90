//! UDP receive loop on its own thread, dispatching decoded messages by address.

use anyhow::Result;
use log::{debug, error, info, trace, warn};
use std::{
    io::ErrorKind,
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use super::codec::{OscMessage, decode};
use crate::dispatch::{SubscriptionId, safe_call};

pub type OscHandler = Arc<dyn Fn(&OscMessage) -> Result<()> + Send + Sync>;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_DATAGRAM: usize = 65_536;

// `None` address = catch-all.
#[derive(Default)]
struct HandlerTable {
    entries: Vec<(SubscriptionId, Option<String>, OscHandler)>,
    next: u64,
}

pub struct OscReceiver {
    handlers: Arc<Mutex<HandlerTable>>,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl OscReceiver {
    /// Binds `0.0.0.0:port` and starts the receive thread.
    ///
    /// With `allowed = Some(ip)` only datagrams from that address (or loopback) are handled.
    pub fn bind(port: u16, allowed: Option<IpAddr>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))?;
        Self::from_socket(socket, allowed)
    }

    pub fn from_socket(socket: UdpSocket, allowed: Option<IpAddr>) -> std::io::Result<Self> {
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let local_addr = socket.local_addr()?;
        let handlers = Arc::new(Mutex::new(HandlerTable::default()));
        let running = Arc::new(AtomicBool::new(true));

        let h = handlers.clone();
        let r = running.clone();
        let thread = thread::Builder::new()
            .name("osc-receiver".into())
            .spawn(move || receive_loop(socket, allowed, h, r))?;

        info!("osc: listening on {local_addr}");
        Ok(Self {
            handlers,
            running,
            thread: Some(thread),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Registers a handler for one exact address.
    pub fn on<F>(&self, addr: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&OscMessage) -> Result<()> + Send + Sync + 'static,
    {
        self.table().add(Some(addr.to_string()), Arc::new(handler))
    }

    /// Registers a handler that sees every message.
    pub fn on_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&OscMessage) -> Result<()> + Send + Sync + 'static,
    {
        self.table().add(None, Arc::new(handler))
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.table().remove(id)
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HandlerTable> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops the thread and releases the socket. Returns once the thread has exited.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(t) = self.thread.take() {
            if t.join().is_err() {
                error!("osc: receive thread panicked");
            }
            info!("osc: receiver on {} stopped", self.local_addr);
        }
    }
}

impl Drop for OscReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

impl HandlerTable {
    fn add(&mut self, addr: Option<String>, handler: OscHandler) -> SubscriptionId {
        self.next += 1;
        let id = SubscriptionId(self.next);
        self.entries.push((id, addr, handler));
        id
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(i, _, _)| *i != id);
        self.entries.len() != before
    }

    /// Exact-address handlers first, then catch-alls, each in registration order.
    fn snapshot_for(&self, addr: &str) -> Vec<OscHandler> {
        let exact = self
            .entries
            .iter()
            .filter(|(_, a, _)| a.as_deref() == Some(addr));
        let any = self.entries.iter().filter(|(_, a, _)| a.is_none());
        exact.chain(any).map(|(_, _, h)| h.clone()).collect()
    }
}

fn sender_allowed(from: IpAddr, allowed: Option<IpAddr>) -> bool {
    match allowed {
        None => true,
        Some(ip) => from == ip || from.is_loopback(),
    }
}

fn receive_loop(
    socket: UdpSocket,
    allowed: Option<IpAddr>,
    handlers: Arc<Mutex<HandlerTable>>,
    running: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while running.load(Ordering::SeqCst) {
        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // ICMP port-unreachable from an earlier send surfaces here on some platforms
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                debug!("osc: ignoring connection reset: {e}");
                continue;
            }
            Err(e) => {
                error!("osc: receive failed, stopping receiver: {e}");
                break;
            }
        };

        if !sender_allowed(from.ip(), allowed) {
            warn!("osc: dropped {n} bytes from disallowed sender {from}");
            continue;
        }

        let packet = match decode(&buf[..n]) {
            Ok(p) => p,
            Err(e) => {
                debug!("osc: dropped malformed packet from {from}: {e}");
                continue;
            }
        };

        for msg in packet.into_messages() {
            trace!("osc: {} {:?}", msg.addr, msg.args);
            let targets = handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot_for(&msg.addr);
            for handler in targets {
                safe_call(&msg.addr, || handler(&msg));
            }
        }
    }
    running.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osc::codec::{OscType, encode_message};
    use anyhow::anyhow;
    use std::sync::mpsc;

    fn loopback_receiver() -> OscReceiver {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        OscReceiver::from_socket(socket, None).unwrap()
    }

    fn send(to: SocketAddr, msg: &OscMessage) {
        let s = UdpSocket::bind("127.0.0.1:0").unwrap();
        s.send_to(&encode_message(msg), to).unwrap();
    }

    #[test]
    fn failing_handlers_do_not_stop_dispatch_or_the_loop() {
        let mut rx = loopback_receiver();
        let (tx, seen) = mpsc::channel::<String>();

        rx.on("/x", |_| panic!("handler panics"));
        rx.on("/x", |_| Err(anyhow!("handler errors")));
        let t1 = tx.clone();
        rx.on("/x", move |m| {
            t1.send(format!("addr {}", m.addr)).ok();
            Ok(())
        });
        let t2 = tx.clone();
        rx.on_any(move |m| {
            t2.send(format!("any {}", m.addr)).ok();
            Ok(())
        });

        let to = rx.local_addr();
        send(to, &OscMessage::new("/x", vec![OscType::Int(1)]));
        let first = seen.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = seen.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first, "addr /x");
        assert_eq!(second, "any /x");

        // garbage in between is dropped and the loop keeps going
        UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .send_to(b"not osc", to)
            .unwrap();
        send(to, &OscMessage::new("/y", vec![]));
        assert_eq!(
            seen.recv_timeout(Duration::from_secs(2)).unwrap(),
            "any /y"
        );
        assert!(rx.is_running());
        rx.stop();
    }

    #[test]
    fn stop_returns_without_traffic() {
        let mut rx = loopback_receiver();
        let started = std::time::Instant::now();
        rx.stop();
        assert!(!rx.is_running());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn off_removes_a_handler() {
        let rx = loopback_receiver();
        let id = rx.on("/z", |_| Ok(()));
        assert!(rx.off(id));
        assert!(!rx.off(id));
    }

    #[test]
    fn allow_list_accepts_loopback_and_the_named_sender() {
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        assert!(sender_allowed(ip, Some(ip)));
        assert!(sender_allowed("127.0.0.1".parse().unwrap(), Some(ip)));
        assert!(!sender_allowed("10.0.0.6".parse().unwrap(), Some(ip)));
        assert!(sender_allowed("10.0.0.6".parse().unwrap(), None));
    }
}
