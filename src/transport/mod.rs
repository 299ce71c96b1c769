//! The transport collaborator contract.
//!
//! Connections drive an underlying messaging socket exclusively through these
//! traits: non-blocking `send`/`recv` with a distinguished [`ZmqError::WouldBlock`]
//! condition, a readiness-events bitmask, and typed socket options. The
//! SNDMORE/RCVMORE multipart contract rides on [`MsgFlags::MORE`]: every sent
//! frame except the last of a logical message carries it, and `recv` sets it on
//! every returned frame except the last.

mod mem;

pub use mem::MemTransport;

use crate::error::ZmqError;
use crate::message::{Blob, Msg};
use bitflags::bitflags;
use std::os::fd::RawFd;
use std::time::Duration;

bitflags! {
  /// Readiness-events bitmask reported by [`TransportSocket::events`].
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
  pub struct PollEvents: u8 {
    /// At least one complete message can be received without blocking.
    const POLLIN = 0b01;
    /// At least one message can be sent without blocking.
    const POLLOUT = 0b10;
  }
}

/// The closed set of socket types the pattern adapters are built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
  /// Distributes messages to all connected subscribers, filtered by tag prefix.
  Pub,
  /// Receives messages matching its subscribed tag prefixes.
  Sub,
  /// Load-balances outgoing messages among connected pullers.
  Push,
  /// Fair-queues incoming messages from connected pushers.
  Pull,
  /// Asynchronous bidirectional socket; backs the request adapter so several
  /// requests can be in flight at once.
  Dealer,
  /// Identity-routing socket; prefixes received messages with the sender
  /// identity and routes sends by an explicit recipient identity.
  Router,
}

/// Typed socket options.
#[derive(Debug, Clone)]
pub enum SocketOption {
  /// How long to keep trying to deliver pending messages after close.
  Linger(Duration),
  /// Whether multicast loopback is allowed.
  MulticastLoop(bool),
  /// Maximum allowed multicast rate, kbps.
  MulticastRate(u32),
  /// Hard limit on messages queued in memory per peer; 0 means unbounded.
  HighWaterMark(u32),
  /// Socket identity used for routing.
  Identity(Blob),
  /// Register a prefix filter (SUB sockets only).
  Subscribe(Blob),
  /// Remove a prefix filter (SUB sockets only).
  Unsubscribe(Blob),
}

/// One underlying messaging socket, exclusively owned by a connection.
pub trait TransportSocket {
  /// The readiness descriptor usable by an event loop. Stable for the
  /// socket's lifetime.
  fn fd(&self) -> RawFd;

  fn set_option(&self, option: SocketOption) -> Result<(), ZmqError>;

  /// Current readiness-events bitmask.
  fn events(&self) -> Result<PollEvents, ZmqError>;

  fn bind(&self, address: &str) -> Result<(), ZmqError>;

  fn connect(&self, address: &str) -> Result<(), ZmqError>;

  /// Non-blocking send of one frame. `MsgFlags::MORE` on the frame marks that
  /// more frames of the same message follow. Returns `Err(WouldBlock)` when
  /// the transport cannot accept the frame right now.
  fn send(&self, msg: Msg) -> Result<(), ZmqError>;

  /// Non-blocking receive of one frame. The returned frame carries
  /// `MsgFlags::MORE` when more frames of the same message remain. Returns
  /// `Err(WouldBlock)` when no message is pending.
  fn recv(&self) -> Result<Msg, ZmqError>;

  fn close(&self) -> Result<(), ZmqError>;
}

/// The shared messaging context: creates sockets and owns process-wide
/// transport state until terminated.
pub trait Transport {
  fn socket(&self, socket_type: SocketType) -> Result<Box<dyn TransportSocket>, ZmqError>;

  /// Releases the context. Called by the factory once every connection has
  /// been shut down.
  fn terminate(&self) -> Result<(), ZmqError>;
}
