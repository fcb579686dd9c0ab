/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Transport context and endpoints behind [`Port`](super::Port).
//!
//! Every endpoint is built around one keep-latest slot: a
//! `tokio::sync::watch` channel carrying `Option<Frame>`.  Publishing
//! replaces the slot content (never blocks, never queues); a subscriber
//! observes the newest value exactly once via `has_changed()` /
//! `borrow_and_update()`.
//!
//! ```text
//! inproc://name   Output ──send_replace──► [watch slot in Context] ──► Input, Input, ...
//!
//! tcp://h:p       Output ──send_replace──► [local slot] ──► per-connection writer ──TCP──►
//!                 ──TCP──► reader task ──send_replace──► [local slot] ──► Input
//! ```
//!
//! Wire framing for `tcp://`: little-endian `u32` payload length, then the
//! payload.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::PortError;

/// One published message.  Shared, immutable, published atomically.
pub type Frame = Arc<[u8]>;

type Slot = Arc<watch::Sender<Option<Frame>>>;

/// Delay between TCP subscriber connection attempts.
pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(100);

const INPROC_SCHEME: &str = "inproc://";
const TCP_SCHEME: &str = "tcp://";

// ── Address ───────────────────────────────────────────────────────────────────

/// Parsed transport address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Process-local channel, `inproc://<name>`.
    InProc(String),
    /// Network channel, `tcp://<host>:<port>` (`*` as host binds all
    /// interfaces).
    Tcp(SocketAddr),
}

impl Address {
    /// Parse a transport address string.
    pub fn parse(address: &str) -> Result<Self, PortError> {
        let invalid = |reason: &str| PortError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        if let Some(name) = address.strip_prefix(INPROC_SCHEME) {
            if name.is_empty() {
                return Err(invalid("empty inproc channel name"));
            }
            return Ok(Address::InProc(name.to_string()));
        }

        if let Some(rest) = address.strip_prefix(TCP_SCHEME) {
            let rest = match rest.strip_prefix("*:") {
                Some(port) => format!("0.0.0.0:{port}"),
                None => rest.to_string(),
            };
            let addr = rest
                .to_socket_addrs()
                .map_err(|e| invalid(&e.to_string()))?
                .next()
                .ok_or_else(|| invalid("host did not resolve to any address"))?;
            return Ok(Address::Tcp(addr));
        }

        Err(invalid("unsupported scheme (expected inproc:// or tcp://)"))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::InProc(name) => write!(f, "{INPROC_SCHEME}{name}"),
            Address::Tcp(addr) => write!(f, "{TCP_SCHEME}{addr}"),
        }
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

struct InProcChannel {
    slot: Slot,
    bound: bool,
}

/// Messaging context shared by every port of one registry.
///
/// Holds the `inproc://` channel table and, once the first `tcp://` endpoint
/// is opened, a single-worker tokio runtime that performs all network I/O.
/// Must outlive every port opened through it; ports keep it alive through
/// an `Arc`.
pub struct Context {
    inproc: Mutex<HashMap<String, InProcChannel>>,
    runtime: OnceCell<Runtime>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("inproc_channels", &self.inproc_channels())
            .field("io_runtime", &self.runtime.get().is_some())
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            inproc: Mutex::new(HashMap::new()),
            runtime: OnceCell::new(),
        }
    }

    /// Open a publishing endpoint on `address`.
    pub(crate) fn bind(self: &Arc<Self>, address: &Address) -> Result<Publisher, PortError> {
        match address {
            Address::InProc(name) => {
                let mut channels = self.inproc.lock();
                prune(&mut channels);
                let channel = channels
                    .entry(name.clone())
                    .or_insert_with(|| InProcChannel {
                        slot: Arc::new(watch::channel(None).0),
                        bound: false,
                    });
                if channel.bound {
                    return Err(PortError::AddressInUse {
                        address: address.to_string(),
                    });
                }
                channel.bound = true;
                Ok(Publisher {
                    slot: channel.slot.clone(),
                    kind: PublisherKind::InProc {
                        context: Arc::clone(self),
                        name: name.clone(),
                    },
                })
            }
            Address::Tcp(addr) => {
                // Bind synchronously so address errors surface from `bind()`.
                let listener = std::net::TcpListener::bind(addr).map_err(|source| {
                    if source.kind() == io::ErrorKind::AddrInUse {
                        PortError::AddressInUse {
                            address: address.to_string(),
                        }
                    } else {
                        PortError::Bind {
                            address: address.to_string(),
                            source,
                        }
                    }
                })?;
                listener.set_nonblocking(true).map_err(|source| PortError::Bind {
                    address: address.to_string(),
                    source,
                })?;

                let slot: Slot = Arc::new(watch::channel(None).0);
                let accept_slot = slot.clone();
                let task = self
                    .io_runtime()?
                    .spawn(accept_loop(listener, accept_slot));
                info!(address = %address, "tcp publisher bound");

                Ok(Publisher {
                    slot,
                    kind: PublisherKind::Tcp { accept: task },
                })
            }
        }
    }

    /// Open a keep-latest subscribing endpoint on `address`.
    ///
    /// `frame_len` is the byte length every accepted frame must have; the
    /// TCP reader drops the connection on a mismatching frame.
    pub(crate) fn connect(
        self: &Arc<Self>,
        address: &Address,
        frame_len: usize,
    ) -> Result<Subscriber, PortError> {
        match address {
            Address::InProc(name) => {
                let mut channels = self.inproc.lock();
                prune(&mut channels);
                let channel = channels
                    .entry(name.clone())
                    .or_insert_with(|| InProcChannel {
                        slot: Arc::new(watch::channel(None).0),
                        bound: false,
                    });
                Ok(Subscriber {
                    rx: channel.slot.subscribe(),
                    reader: None,
                })
            }
            Address::Tcp(addr) => {
                let (tx, rx) = watch::channel(None);
                let task = self
                    .io_runtime()?
                    .spawn(read_loop(*addr, frame_len, tx));
                debug!(address = %address, "tcp subscriber connecting");
                Ok(Subscriber {
                    rx,
                    reader: Some(task),
                })
            }
        }
    }

    /// Returns `true` while an output port binds the in-process channel.
    pub fn is_bound(&self, name: &str) -> bool {
        self.inproc
            .lock()
            .get(name)
            .map(|c| c.bound)
            .unwrap_or(false)
    }

    fn release(&self, name: &str) {
        let mut channels = self.inproc.lock();
        if let Some(channel) = channels.get_mut(name) {
            channel.bound = false;
        }
        prune(&mut channels);
    }

    /// Number of in-process channels currently tracked.
    pub fn inproc_channels(&self) -> usize {
        self.inproc.lock().len()
    }

    fn io_runtime(&self) -> Result<&Runtime, PortError> {
        self.runtime
            .get_or_try_init(|| {
                tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("nomad-port-io")
                    .enable_all()
                    .build()
            })
            .map_err(PortError::Runtime)
    }
}

/// Forget channels that no publisher binds and no subscriber reads.
fn prune(channels: &mut HashMap<String, InProcChannel>) {
    channels.retain(|_, c| c.bound || c.slot.receiver_count() > 0);
}

// ── Endpoints ─────────────────────────────────────────────────────────────────

enum PublisherKind {
    InProc { context: Arc<Context>, name: String },
    Tcp { accept: JoinHandle<()> },
}

/// Publishing side of an open output port.
pub(crate) struct Publisher {
    slot: Slot,
    kind: PublisherKind,
}

impl Publisher {
    /// Replace the slot content with `frame`.  Never blocks.
    pub(crate) fn publish(&self, frame: Frame) {
        self.slot.send_replace(Some(frame));
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        match &self.kind {
            PublisherKind::InProc { context, name } => context.release(name),
            // Writer tasks end on their own once the slot sender is dropped.
            PublisherKind::Tcp { accept } => accept.abort(),
        }
    }
}

/// Subscribing side of an open input port.
pub(crate) struct Subscriber {
    rx: watch::Receiver<Option<Frame>>,
    reader: Option<JoinHandle<()>>,
}

impl Subscriber {
    /// Take the newest frame published since the previous call, if any.
    pub(crate) fn take_latest(&mut self) -> Option<Frame> {
        if !self.rx.has_changed().unwrap_or(false) {
            return None;
        }
        self.rx.borrow_and_update().clone()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if let Some(reader) = &self.reader {
            reader.abort();
        }
    }
}

// ── TCP I/O tasks ─────────────────────────────────────────────────────────────

async fn accept_loop(listener: std::net::TcpListener, slot: Slot) {
    let listener = match tokio::net::TcpListener::from_std(listener) {
        Ok(l) => l,
        Err(e) => {
            warn!(error = %e, "tcp publisher could not register listener");
            return;
        }
    };

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(peer = %peer, "tcp subscriber connected");
                let rx = slot.subscribe();
                tokio::spawn(write_loop(stream, rx, peer));
            }
            Err(e) => {
                // Persistent failures (EMFILE) would otherwise spin the I/O worker.
                warn!(error = %e, "tcp accept failed");
                tokio::time::sleep(RECONNECT_INTERVAL).await;
            }
        }
    }
}

async fn write_loop(
    mut stream: tokio::net::TcpStream,
    mut rx: watch::Receiver<Option<Frame>>,
    peer: SocketAddr,
) {
    let _ = stream.set_nodelay(true);
    // Ends when the publisher drops its slot sender.
    while rx.changed().await.is_ok() {
        let frame = rx.borrow_and_update().clone();
        let Some(frame) = frame else { continue };
        if let Err(e) = write_frame(&mut stream, &frame).await {
            debug!(peer = %peer, error = %e, "tcp subscriber disconnected");
            return;
        }
    }
}

async fn write_frame(stream: &mut tokio::net::TcpStream, frame: &[u8]) -> io::Result<()> {
    let len = u32::try_from(frame.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame exceeds u32::MAX"))?;
    stream.write_all(&len.to_le_bytes()).await?;
    stream.write_all(frame).await?;
    stream.flush().await
}

async fn read_loop(addr: SocketAddr, frame_len: usize, tx: watch::Sender<Option<Frame>>) {
    loop {
        match tokio::net::TcpStream::connect(addr).await {
            Ok(mut stream) => {
                let _ = stream.set_nodelay(true);
                debug!(address = %addr, "tcp subscriber connected to publisher");
                if let Err(e) = read_frames(&mut stream, frame_len, &tx).await {
                    debug!(address = %addr, error = %e, "tcp publisher connection lost");
                }
            }
            Err(e) => {
                debug!(address = %addr, error = %e, "tcp publisher not reachable yet");
            }
        }
        tokio::time::sleep(RECONNECT_INTERVAL).await;
    }
}

async fn read_frames(
    stream: &mut tokio::net::TcpStream,
    frame_len: usize,
    tx: &watch::Sender<Option<Frame>>,
) -> io::Result<()> {
    let mut len_buf = [0u8; 4];
    loop {
        stream.read_exact(&mut len_buf).await?;
        let len = u32::from_le_bytes(len_buf) as usize;
        if len != frame_len {
            warn!(
                expected = frame_len,
                actual = len,
                "dropping tcp connection: frame length does not match port"
            );
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame length mismatch",
            ));
        }
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await?;
        tx.send_replace(Some(Frame::from(payload)));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bytes: &[u8]) -> Frame {
        Frame::from(bytes.to_vec())
    }

    // ── Address ───────────────────────────────────────────────────────────────

    #[test]
    fn parses_inproc_address() {
        assert_eq!(
            Address::parse("inproc://nomad/state").unwrap(),
            Address::InProc("nomad/state".into())
        );
    }

    #[test]
    fn parses_tcp_address_and_wildcard() {
        assert_eq!(
            Address::parse("tcp://127.0.0.1:5555").unwrap(),
            Address::Tcp("127.0.0.1:5555".parse().unwrap())
        );
        assert_eq!(
            Address::parse("tcp://*:5556").unwrap(),
            Address::Tcp("0.0.0.0:5556".parse().unwrap())
        );
    }

    #[test]
    fn rejects_unknown_scheme_and_empty_name() {
        assert!(matches!(
            Address::parse("udp://127.0.0.1:1"),
            Err(PortError::InvalidAddress { .. })
        ));
        assert!(matches!(
            Address::parse("inproc://"),
            Err(PortError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn address_display_round_trips_inproc() {
        let a = Address::parse("inproc://x").unwrap();
        assert_eq!(a.to_string(), "inproc://x");
    }

    // ── InProc ────────────────────────────────────────────────────────────────

    #[test]
    fn second_inproc_bind_is_rejected_until_first_is_dropped() {
        let ctx = Arc::new(Context::new());
        let addr = Address::parse("inproc://dup").unwrap();

        let first = ctx.bind(&addr).unwrap();
        assert!(ctx.is_bound("dup"));
        assert!(matches!(
            ctx.bind(&addr),
            Err(PortError::AddressInUse { .. })
        ));

        drop(first);
        assert!(!ctx.is_bound("dup"));
        assert!(ctx.bind(&addr).is_ok());
    }

    #[test]
    fn unused_inproc_channels_are_forgotten() {
        let ctx = Arc::new(Context::new());
        let a = Address::parse("inproc://gc/a").unwrap();
        let b = Address::parse("inproc://gc/b").unwrap();
        let c = Address::parse("inproc://gc/c").unwrap();

        drop(ctx.bind(&a).unwrap());
        assert_eq!(ctx.inproc_channels(), 0);

        // A reader keeps the channel alive after its publisher leaves.
        let sub = ctx.connect(&b, 8).unwrap();
        drop(ctx.bind(&b).unwrap());
        assert_eq!(ctx.inproc_channels(), 1);

        drop(sub);
        let _other = ctx.connect(&c, 8).unwrap();
        assert_eq!(ctx.inproc_channels(), 1);
        assert!(!ctx.is_bound("gc/b"));
    }

    #[test]
    fn subscriber_keeps_only_latest_frame() {
        let ctx = Arc::new(Context::new());
        let addr = Address::parse("inproc://latest").unwrap();
        let publisher = ctx.bind(&addr).unwrap();
        let mut sub = ctx.connect(&addr, 1).unwrap();

        publisher.publish(frame(&[1]));
        publisher.publish(frame(&[2]));
        publisher.publish(frame(&[3]));

        assert_eq!(sub.take_latest().as_deref(), Some(&[3u8][..]));
        assert!(sub.take_latest().is_none());
    }

    #[test]
    fn connect_before_bind_receives_later_publications() {
        let ctx = Arc::new(Context::new());
        let addr = Address::parse("inproc://early").unwrap();
        let mut sub = ctx.connect(&addr, 1).unwrap();
        assert!(sub.take_latest().is_none());

        let publisher = ctx.bind(&addr).unwrap();
        publisher.publish(frame(&[9]));
        assert_eq!(sub.take_latest().as_deref(), Some(&[9u8][..]));
    }

    #[test]
    fn fan_out_delivers_to_every_subscriber() {
        let ctx = Arc::new(Context::new());
        let addr = Address::parse("inproc://fan").unwrap();
        let publisher = ctx.bind(&addr).unwrap();
        let mut a = ctx.connect(&addr, 1).unwrap();
        let mut b = ctx.connect(&addr, 1).unwrap();

        publisher.publish(frame(&[7]));
        assert!(a.take_latest().is_some());
        assert!(b.take_latest().is_some());
    }

    // ── TCP ───────────────────────────────────────────────────────────────────

    #[test]
    fn tcp_publisher_reaches_subscriber() {
        let ctx = Arc::new(Context::new());
        // Port 0 lets the OS pick; read back the real port from a probe bind.
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let addr = Address::parse(&format!("tcp://127.0.0.1:{port}")).unwrap();
        let publisher = ctx.bind(&addr).unwrap();
        let mut sub = ctx.connect(&addr, 2).unwrap();

        // Republish until the asynchronous connection is up.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut got = None;
        while std::time::Instant::now() < deadline {
            publisher.publish(frame(&[4, 2]));
            if let Some(f) = sub.take_latest() {
                got = Some(f);
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(got.as_deref(), Some(&[4u8, 2][..]));
    }

    #[test]
    fn tcp_double_bind_reports_address_in_use() {
        let ctx = Arc::new(Context::new());
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let addr = Address::parse(&format!("tcp://127.0.0.1:{port}")).unwrap();
        assert!(matches!(
            ctx.bind(&addr),
            Err(PortError::AddressInUse { .. })
        ));
    }
}
