/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Typed, directional communication endpoints between task nodes.
//!
//! A [`Port`] carries fixed-size messages (`count` elements of one
//! [`DataType`]) over a transport address:
//!
//! * an **output** port [`bind`](Port::bind)s the address and publishes with
//!   [`send`](Port::send), never blocking on subscribers;
//! * any number of **input** ports [`connect`](Port::connect) to it and read
//!   with [`receive`](Port::receive); only the newest message is retained
//!   (conflate), and "nothing new" is an ordinary `Ok(false)`.
//!
//! The address string is the only coupling between publisher and
//! subscribers:
//!
//! ```rust,ignore
//! let ctx = Arc::new(Context::new());
//! let mut out = Port::new(PortSpec::output("STATE", DataType::Double, 2), ctx.clone());
//! out.set_transport("inproc://nomad/state");
//! out.bind()?;
//!
//! let mut inp = Port::new(PortSpec::input("STATE", DataType::Double, 2), ctx);
//! inp.set_transport("inproc://nomad/state");
//! inp.connect()?;
//!
//! out.send_values(&[1.0_f64, 2.0])?;
//! let mut x = [0.0_f64; 2];
//! assert!(inp.receive_values(&mut x)?);
//! ```

pub mod table;
pub mod transport;

pub use table::Ports;
pub use transport::{Address, Context};

use std::fmt;
use std::mem::size_of;
use std::sync::Arc;
use std::time::Duration;

use bytemuck::Pod;
use tracing::{debug, warn};

use crate::error::PortError;
use transport::{Frame, Publisher, Subscriber};

// ── Direction / DataType ──────────────────────────────────────────────────────

/// Which way data flows through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Element type of a port payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Double,
    Float,
    Int32,
    Int64,
    UInt8,
    UInt32,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DataType::Double | DataType::Int64 => 8,
            DataType::Float | DataType::Int32 | DataType::UInt32 => 4,
            DataType::UInt8 => 1,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Double => "f64",
            DataType::Float => "f32",
            DataType::Int32 => "i32",
            DataType::Int64 => "i64",
            DataType::UInt8 => "u8",
            DataType::UInt32 => "u32",
        };
        f.write_str(s)
    }
}

/// Rust scalar usable as a port element.
pub trait Element: Pod {
    const DATA_TYPE: DataType;
}

impl Element for f64 {
    const DATA_TYPE: DataType = DataType::Double;
}
impl Element for f32 {
    const DATA_TYPE: DataType = DataType::Float;
}
impl Element for i32 {
    const DATA_TYPE: DataType = DataType::Int32;
}
impl Element for i64 {
    const DATA_TYPE: DataType = DataType::Int64;
}
impl Element for u8 {
    const DATA_TYPE: DataType = DataType::UInt8;
}
impl Element for u32 {
    const DATA_TYPE: DataType = DataType::UInt32;
}

// ── PortSpec ──────────────────────────────────────────────────────────────────

/// Static description of a port, fixed at declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSpec {
    pub name: String,
    pub direction: Direction,
    pub data_type: DataType,
    /// Number of elements per message.
    pub count: usize,
    /// Declared update period.  Informational only.
    pub period: Option<Duration>,
    /// Initial transport address; can be changed with
    /// [`Port::set_transport`] until the port is opened.
    pub transport: Option<String>,
}

impl PortSpec {
    pub fn input(name: impl Into<String>, data_type: DataType, count: usize) -> Self {
        Self::new(name, Direction::Input, data_type, count)
    }

    pub fn output(name: impl Into<String>, data_type: DataType, count: usize) -> Self {
        Self::new(name, Direction::Output, data_type, count)
    }

    fn new(name: impl Into<String>, direction: Direction, data_type: DataType, count: usize) -> Self {
        Self {
            name: name.into(),
            direction,
            data_type,
            count,
            period: None,
            transport: None,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_transport(mut self, address: impl Into<String>) -> Self {
        self.transport = Some(address.into());
        self
    }

    /// Payload size in bytes.
    pub fn byte_len(&self) -> usize {
        self.data_type.size() * self.count
    }
}

// ── Port ──────────────────────────────────────────────────────────────────────

enum Endpoint {
    Closed,
    Publisher(Publisher),
    Subscriber(Subscriber),
}

/// A communication endpoint owned by one task node.
///
/// `send`/`receive` take `&mut self`: a port is driven by the single thread
/// that owns it.
pub struct Port {
    spec: PortSpec,
    context: Arc<Context>,
    endpoint: Endpoint,
    /// Address the endpoint was actually opened on.
    open_address: Option<String>,
    sent: u64,
    received: u64,
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.spec.name)
            .field("direction", &self.spec.direction)
            .field("data_type", &self.spec.data_type)
            .field("count", &self.spec.count)
            .field("transport", &self.spec.transport)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Port {
    pub fn new(spec: PortSpec, context: Arc<Context>) -> Self {
        Self {
            spec,
            context,
            endpoint: Endpoint::Closed,
            open_address: None,
            sent: 0,
            received: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn direction(&self) -> Direction {
        self.spec.direction
    }

    pub fn data_type(&self) -> DataType {
        self.spec.data_type
    }

    pub fn count(&self) -> usize {
        self.spec.count
    }

    pub fn period(&self) -> Option<Duration> {
        self.spec.period
    }

    pub fn byte_len(&self) -> usize {
        self.spec.byte_len()
    }

    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }

    /// Configured transport address, if any.
    pub fn transport(&self) -> Option<&str> {
        self.spec.transport.as_deref()
    }

    /// Set or override the bind/connect target.
    ///
    /// Has no effect on an endpoint that is already open; the new address is
    /// only used by a later `bind`/`connect` on a fresh port.
    pub fn set_transport(&mut self, address: impl Into<String>) {
        let address = address.into();
        if let Some(open) = &self.open_address {
            warn!(
                port = %self.spec.name,
                open = %open,
                requested = %address,
                "transport changed on an open port; endpoint keeps its current address"
            );
        }
        self.spec.transport = Some(address);
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.endpoint, Endpoint::Closed)
    }

    /// Messages published through this port.
    pub fn messages_sent(&self) -> u64 {
        self.sent
    }

    /// New messages delivered by `receive*` calls.
    pub fn messages_received(&self) -> u64 {
        self.received
    }

    // ── Open ──────────────────────────────────────────────────────────────────

    /// Create the publishing endpoint.  Output ports only.
    pub fn bind(&mut self) -> Result<(), PortError> {
        self.require(Direction::Output, "bind")?;
        let address = self.address_for_open()?;
        let publisher = self.context.bind(&address)?;
        debug!(port = %self.spec.name, address = %address, "output port bound");
        self.endpoint = Endpoint::Publisher(publisher);
        self.open_address = Some(address.to_string());
        Ok(())
    }

    /// Create the keep-latest subscribing endpoint.  Input ports only.
    pub fn connect(&mut self) -> Result<(), PortError> {
        self.require(Direction::Input, "connect")?;
        let address = self.address_for_open()?;
        let subscriber = self.context.connect(&address, self.byte_len())?;
        debug!(port = %self.spec.name, address = %address, "input port connected");
        self.endpoint = Endpoint::Subscriber(subscriber);
        self.open_address = Some(address.to_string());
        Ok(())
    }

    /// Drop the open endpoint, if any.  An output releases its address; the
    /// port can be bound or connected again afterwards.
    pub fn close(&mut self) {
        if let Some(address) = self.open_address.take() {
            debug!(port = %self.spec.name, address = %address, "port closed");
        }
        self.endpoint = Endpoint::Closed;
    }

    fn address_for_open(&self) -> Result<Address, PortError> {
        if let Some(open) = &self.open_address {
            return Err(PortError::AlreadyOpen {
                name: self.spec.name.clone(),
                address: open.clone(),
            });
        }
        let transport = self
            .spec
            .transport
            .as_deref()
            .ok_or_else(|| PortError::NoTransport {
                name: self.spec.name.clone(),
            })?;
        Address::parse(transport)
    }

    // ── Send ──────────────────────────────────────────────────────────────────

    /// Publish one raw message of exactly [`byte_len`](Self::byte_len) bytes.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        self.require(Direction::Output, "send")?;
        self.check_len(bytes.len())?;
        match &self.endpoint {
            Endpoint::Publisher(publisher) => publisher.publish(Frame::from(bytes)),
            _ => return Err(self.not_open()),
        }
        self.sent += 1;
        Ok(())
    }

    /// Publish `count` elements of the declared type.
    pub fn send_values<T: Element>(&mut self, values: &[T]) -> Result<(), PortError> {
        self.check_type::<T>()?;
        self.send(bytemuck::cast_slice(values))
    }

    /// Publish a fixed-layout message whose size equals the payload length.
    pub fn send_message<M: Pod>(&mut self, message: &M) -> Result<(), PortError> {
        self.send(bytemuck::bytes_of(message))
    }

    // ── Receive ───────────────────────────────────────────────────────────────

    /// Copy the newest undelivered message into `buf`.
    ///
    /// Returns `Ok(false)`, leaving `buf` untouched, when nothing new was
    /// published since the previous receive.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<bool, PortError> {
        self.check_len(buf.len())?;
        match self.take_frame()? {
            Some(frame) => {
                buf.copy_from_slice(&frame);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Typed variant of [`receive`](Self::receive).
    pub fn receive_values<T: Element>(&mut self, out: &mut [T]) -> Result<bool, PortError> {
        self.check_type::<T>()?;
        self.receive(bytemuck::cast_slice_mut(out))
    }

    /// Receive a fixed-layout message; `Ok(None)` when nothing new arrived.
    pub fn receive_message<M: Pod>(&mut self) -> Result<Option<M>, PortError> {
        self.check_len(size_of::<M>())?;
        Ok(self
            .take_frame()?
            .map(|frame| bytemuck::pod_read_unaligned(&frame)))
    }

    fn take_frame(&mut self) -> Result<Option<Frame>, PortError> {
        self.require(Direction::Input, "receive")?;
        let frame = match &mut self.endpoint {
            Endpoint::Subscriber(subscriber) => subscriber.take_latest(),
            _ => {
                return Err(PortError::NotOpen {
                    name: self.spec.name.clone(),
                })
            }
        };
        match frame {
            // A mismatching in-process publisher cannot exist (send checks
            // its own length), but two ports may disagree on the declaration.
            Some(f) if f.len() != self.spec.byte_len() => Err(PortError::LengthMismatch {
                name: self.spec.name.clone(),
                expected: self.spec.byte_len(),
                actual: f.len(),
            }),
            Some(f) => {
                self.received += 1;
                Ok(Some(f))
            }
            None => Ok(None),
        }
    }

    // ── Checks ────────────────────────────────────────────────────────────────

    fn require(&self, direction: Direction, operation: &'static str) -> Result<(), PortError> {
        if self.spec.direction == direction {
            Ok(())
        } else {
            Err(PortError::WrongDirection {
                name: self.spec.name.clone(),
                operation,
                direction: self.spec.direction,
            })
        }
    }

    fn check_len(&self, actual: usize) -> Result<(), PortError> {
        if actual == self.spec.byte_len() {
            Ok(())
        } else {
            Err(PortError::LengthMismatch {
                name: self.spec.name.clone(),
                expected: self.spec.byte_len(),
                actual,
            })
        }
    }

    fn check_type<T: Element>(&self) -> Result<(), PortError> {
        if T::DATA_TYPE == self.spec.data_type {
            Ok(())
        } else {
            Err(PortError::TypeMismatch {
                name: self.spec.name.clone(),
                expected: self.spec.data_type,
                actual: T::DATA_TYPE,
            })
        }
    }

    fn not_open(&self) -> PortError {
        PortError::NotOpen {
            name: self.spec.name.clone(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    fn wired_pair(address: &str, count: usize) -> (Port, Port) {
        let ctx = Arc::new(Context::new());
        let mut out = Port::new(
            PortSpec::output("X", DataType::Double, count).with_transport(address),
            ctx.clone(),
        );
        let mut inp = Port::new(
            PortSpec::input("X", DataType::Double, count).with_transport(address),
            ctx,
        );
        out.bind().unwrap();
        inp.connect().unwrap();
        (out, inp)
    }

    // ── Latest-wins ───────────────────────────────────────────────────────────

    #[test]
    fn end_to_end_latest_wins_then_no_new_data() {
        let (mut a, mut b) = wired_pair("inproc://addr1", 2);

        a.send_values(&[1.0_f64, 2.0]).unwrap();
        a.send_values(&[3.0_f64, 4.0]).unwrap();

        let mut x = [0.0_f64; 2];
        assert!(b.receive_values(&mut x).unwrap());
        assert_eq!(x, [3.0, 4.0]);

        // Nothing published since: explicit "no new data", buffer untouched.
        let mut y = [-1.0_f64; 2];
        assert!(!b.receive_values(&mut y).unwrap());
        assert_eq!(y, [-1.0, -1.0]);
    }

    #[test]
    fn three_sends_before_receive_yield_only_the_third() {
        let (mut a, mut b) = wired_pair("inproc://m123", 1);
        for v in [1.0_f64, 2.0, 3.0] {
            a.send_values(&[v]).unwrap();
        }
        let mut x = [0.0_f64];
        assert!(b.receive_values(&mut x).unwrap());
        assert_eq!(x, [3.0]);
        assert!(!b.receive_values(&mut x).unwrap());
        assert_eq!(b.messages_received(), 1);
        assert_eq!(a.messages_sent(), 3);
    }

    #[test]
    fn send_without_subscribers_does_not_block_or_fail() {
        let ctx = Arc::new(Context::new());
        let mut out = Port::new(
            PortSpec::output("lonely", DataType::UInt8, 4).with_transport("inproc://lonely"),
            ctx,
        );
        out.bind().unwrap();
        for _ in 0..1_000 {
            out.send(&[1, 2, 3, 4]).unwrap();
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Sample {
        timestamp_us: u64,
        value: f64,
    }

    #[test]
    fn pod_message_round_trip() {
        let ctx = Arc::new(Context::new());
        let mut out = Port::new(
            PortSpec::output("S", DataType::UInt8, 16).with_transport("inproc://pod"),
            ctx.clone(),
        );
        let mut inp = Port::new(
            PortSpec::input("S", DataType::UInt8, 16).with_transport("inproc://pod"),
            ctx,
        );
        out.bind().unwrap();
        inp.connect().unwrap();

        assert_eq!(inp.receive_message::<Sample>().unwrap(), None);
        let s = Sample {
            timestamp_us: 42,
            value: 0.5,
        };
        out.send_message(&s).unwrap();
        assert_eq!(inp.receive_message::<Sample>().unwrap(), Some(s));
        assert_eq!(Sample::zeroed().timestamp_us, 0);
    }

    // ── Misuse ────────────────────────────────────────────────────────────────

    #[test]
    fn direction_is_enforced() {
        let (mut a, mut b) = wired_pair("inproc://dir", 1);
        assert!(matches!(
            b.send_values(&[1.0_f64]),
            Err(PortError::WrongDirection { .. })
        ));
        let mut x = [0.0_f64];
        assert!(matches!(
            a.receive_values(&mut x),
            Err(PortError::WrongDirection { .. })
        ));
        assert!(matches!(a.connect(), Err(PortError::WrongDirection { .. })));
    }

    #[test]
    fn length_and_type_are_enforced() {
        let (mut a, _b) = wired_pair("inproc://len", 2);
        assert!(matches!(
            a.send_values(&[1.0_f64]),
            Err(PortError::LengthMismatch { expected: 16, actual: 8, .. })
        ));
        assert!(matches!(
            a.send_values(&[1.0_f32, 2.0, 3.0, 4.0]),
            Err(PortError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn unopened_and_unaddressed_ports_fail() {
        let ctx = Arc::new(Context::new());
        let mut out = Port::new(PortSpec::output("O", DataType::Double, 1), ctx);
        assert!(matches!(
            out.send_values(&[1.0_f64]),
            Err(PortError::NotOpen { .. })
        ));
        assert!(matches!(out.bind(), Err(PortError::NoTransport { .. })));
    }

    #[test]
    fn second_output_on_same_address_is_rejected() {
        let ctx = Arc::new(Context::new());
        let spec = PortSpec::output("O", DataType::Double, 1).with_transport("inproc://one");
        let mut first = Port::new(spec.clone(), ctx.clone());
        let mut second = Port::new(spec, ctx);
        first.bind().unwrap();
        assert!(matches!(second.bind(), Err(PortError::AddressInUse { .. })));
    }

    #[test]
    fn set_transport_after_open_keeps_endpoint() {
        let (mut a, mut b) = wired_pair("inproc://stay", 1);
        b.set_transport("inproc://elsewhere");
        assert_eq!(b.transport(), Some("inproc://elsewhere"));
        assert!(matches!(b.connect(), Err(PortError::AlreadyOpen { .. })));

        a.send_values(&[5.0_f64]).unwrap();
        let mut x = [0.0_f64];
        assert!(b.receive_values(&mut x).unwrap());
        assert_eq!(x, [5.0]);
    }

    #[test]
    fn declaration_mismatch_between_ports_is_reported() {
        let ctx = Arc::new(Context::new());
        let mut out = Port::new(
            PortSpec::output("O", DataType::Double, 2).with_transport("inproc://mm"),
            ctx.clone(),
        );
        let mut inp = Port::new(
            PortSpec::input("I", DataType::Double, 1).with_transport("inproc://mm"),
            ctx,
        );
        out.bind().unwrap();
        inp.connect().unwrap();
        out.send_values(&[1.0_f64, 2.0]).unwrap();
        let mut x = [0.0_f64];
        assert!(matches!(
            inp.receive_values(&mut x),
            Err(PortError::LengthMismatch { .. })
        ));
    }
}
