//! The connection engine: a non-blocking duplex message pump over one
//! underlying socket.
//!
//! The engine owns the socket, its outbound FIFO and the inbound multipart
//! accumulator. The reactor drives it through [`ReadDescriptor::do_read`];
//! sends go through [`Connection::send`], which enqueues frames and schedules
//! a deferred flush so bursts coalesce into one pump pass and callers never
//! block.

use crate::endpoint::{Endpoint, EndpointType};
use crate::error::ZmqError;
use crate::factory::Factory;
use crate::message::{Blob, Msg, MsgFlags};
use crate::reactor::{DelayedCall, ReadDescriptor};
use crate::transport::{PollEvents, SocketOption, SocketType, TransportSocket};

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

/// Receives complete inbound messages from a connection's pump.
///
/// Each pattern adapter implements this; the engine invokes it synchronously
/// during the pump, after releasing its own interior borrows, so a sink may
/// reenter `send` on the same connection. Single-frame messages go to
/// `on_message`, larger ones to `on_multipart`; the default `on_message`
/// delegates so simple patterns can ignore the split.
pub trait MessageSink {
  fn on_message(&self, frame: Msg) -> Result<(), ZmqError> {
    self.on_multipart(vec![frame])
  }

  fn on_multipart(&self, frames: Vec<Msg>) -> Result<(), ZmqError>;

  /// Invoked exactly once when the connection shuts down, on every shutdown
  /// path (direct or factory teardown). Adapters holding per-message state
  /// (pending replies in particular) fault it here so callers never hang on a
  /// message that cannot arrive. The connection is already deregistered; the
  /// sink must not send.
  fn on_shutdown(&self) {}
}

/// Sink for send-only socket types; anything inbound is unexpected.
pub struct DiscardSink;

impl MessageSink for DiscardSink {
  fn on_multipart(&self, frames: Vec<Msg>) -> Result<(), ZmqError> {
    warn!(frames = frames.len(), "discarding unexpected inbound message");
    Ok(())
  }
}

/// Construction-time configuration for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
  pub socket_type: SocketType,
  pub endpoint: Option<Endpoint>,
  pub identity: Option<Blob>,
  /// Whether loopback multicast is allowed.
  pub multicast_loop: bool,
  /// Maximum allowed multicast rate, kbps.
  pub multicast_rate: u32,
  /// Per-peer transport queue cap; 0 means unbounded.
  pub high_water_mark: u32,
}

impl ConnectionConfig {
  pub fn new(socket_type: SocketType) -> Self {
    Self {
      socket_type,
      endpoint: None,
      identity: None,
      multicast_loop: false,
      multicast_rate: 100,
      high_water_mark: 0,
    }
  }

  pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
    self.endpoint = Some(endpoint);
    self
  }

  pub fn identity(mut self, identity: Blob) -> Self {
    self.identity = Some(identity);
    self
  }
}

struct ConnState {
  endpoints: Vec<Endpoint>,
  /// Outbound FIFO. Frames carry `MsgFlags::MORE` on every part but the last
  /// of each logical message.
  queue: VecDeque<Msg>,
  /// Frames of the in-progress inbound multipart message.
  recv_parts: Vec<Msg>,
  /// At most one outstanding deferred flush per connection.
  scheduled_flush: Option<DelayedCall>,
}

/// One messaging socket wired into a reactor.
pub struct Connection {
  handle: Cell<usize>,
  fd: RawFd,
  socket: Box<dyn TransportSocket>,
  sink: Box<dyn MessageSink>,
  self_weak: Weak<Connection>,
  /// Cleared by `shutdown()`. Doubles as the mid-pump shutdown guard and the
  /// used-after-shutdown detector.
  factory: RefCell<Option<Factory>>,
  state: RefCell<ConnState>,
}

impl Connection {
  /// Allocates the underlying socket, applies configuration, attaches the
  /// initial endpoint if given, and registers with the factory's live set and
  /// the reactor.
  pub fn new(
    factory: &Factory,
    config: ConnectionConfig,
    sink: Box<dyn MessageSink>,
  ) -> Result<Rc<Self>, ZmqError> {
    let socket = factory
      .transport()
      .socket(config.socket_type)
      .map_err(|e| ZmqError::SocketCreation(e.to_string()))?;
    socket.set_option(SocketOption::Linger(factory.linger()))?;
    socket.set_option(SocketOption::MulticastLoop(config.multicast_loop))?;
    socket.set_option(SocketOption::MulticastRate(config.multicast_rate))?;
    socket.set_option(SocketOption::HighWaterMark(config.high_water_mark))?;
    if let Some(identity) = config.identity {
      socket.set_option(SocketOption::Identity(identity))?;
    }
    let fd = socket.fd();

    let conn = Rc::new_cyclic(|weak| Self {
      handle: Cell::new(0),
      fd,
      socket,
      sink,
      self_weak: weak.clone(),
      factory: RefCell::new(Some(factory.clone())),
      state: RefCell::new(ConnState {
        endpoints: Vec::new(),
        queue: VecDeque::new(),
        recv_parts: Vec::new(),
        scheduled_flush: None,
      }),
    });

    if let Some(endpoint) = config.endpoint {
      if let Err(e) = conn.add_endpoints(vec![endpoint]) {
        let _ = conn.socket.close();
        conn.factory.borrow_mut().take();
        return Err(e);
      }
    }

    conn.handle.set(factory.register(conn.clone()));
    factory.reactor().add_reader(conn.clone());
    trace!(fd, "connection registered");
    Ok(conn)
  }

  /// The readiness descriptor of the underlying socket.
  pub fn fd(&self) -> RawFd {
    self.fd
  }

  /// Endpoints attached so far, in attachment order.
  pub fn endpoints(&self) -> Vec<Endpoint> {
    self.state.borrow().endpoints.clone()
  }

  /// Number of frames currently waiting in the outbound queue.
  pub fn queued_frames(&self) -> usize {
    self.state.borrow().queue.len()
  }

  fn live_factory(&self) -> Result<Factory, ZmqError> {
    self
      .factory
      .borrow()
      .clone()
      .ok_or(ZmqError::InvalidState("connection already shut down"))
  }

  /// Binds or connects each endpoint per its role, then appends them to the
  /// endpoint list. A connection may carry many endpoints, mixing roles and
  /// address schemes.
  pub fn add_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<(), ZmqError> {
    self.live_factory()?;
    for endpoint in &endpoints {
      match endpoint.kind {
        EndpointType::Bind => self.socket.bind(&endpoint.address)?,
        EndpointType::Connect => self.socket.connect(&endpoint.address)?,
      }
    }
    self.state.borrow_mut().endpoints.extend(endpoints);
    Ok(())
  }

  /// Applies a socket option (subscription filters in particular).
  pub fn set_option(&self, option: SocketOption) -> Result<(), ZmqError> {
    self.live_factory()?;
    self.socket.set_option(option)
  }

  /// Enqueues one multipart message for sending.
  ///
  /// All frames but the last are tagged `MORE`; that is how multipart
  /// boundaries reach the transport. Returns immediately after scheduling a
  /// deferred flush (never more than one outstanding). The queue is unbounded
  /// here; backpressure belongs to the transport's high-water-mark.
  pub fn send(&self, frames: Vec<Msg>) -> Result<(), ZmqError> {
    let factory = self.live_factory()?;
    if frames.is_empty() {
      return Err(ZmqError::InvalidArgument("multipart message must not be empty".into()));
    }
    let mut state = self.state.borrow_mut();
    let last = frames.len() - 1;
    for (i, mut msg) in frames.into_iter().enumerate() {
      if i < last {
        msg.set_flags(msg.flags() | MsgFlags::MORE);
      } else {
        msg.set_flags(msg.flags() - MsgFlags::MORE);
      }
      state.queue.push_back(msg);
    }
    if state.scheduled_flush.is_none() {
      let weak = self.self_weak.clone();
      state.scheduled_flush = Some(factory.reactor().call_soon(Box::new(move || {
        if let Some(conn) = weak.upgrade() {
          if let Err(e) = conn.pump() {
            warn!(fd = conn.fd, error = %e, "deferred flush failed");
          }
        }
      })));
    }
    Ok(())
  }

  /// Drains pending readiness: flushes queued sends while the transport
  /// accepts them and dispatches every complete inbound message to the sink.
  ///
  /// Invoked by the reactor on descriptor readiness and by the deferred
  /// flush. Clears the pending-flush marker before doing any work so an
  /// enqueue happening during the pump schedules a fresh flush instead of
  /// being absorbed by this pass.
  pub fn pump(&self) -> Result<(), ZmqError> {
    if let Some(call) = self.state.borrow_mut().scheduled_flush.take() {
      call.cancel();
    }
    if self.factory.borrow().is_none() {
      // Shutdown raced the scheduled flush; nothing left to pump.
      return Ok(());
    }
    let events = self.socket.events()?;
    if events.contains(PollEvents::POLLOUT) {
      self.flush_queue()?;
    }
    if events.contains(PollEvents::POLLIN) {
      self.drain_inbound()?;
    }
    Ok(())
  }

  fn flush_queue(&self) -> Result<(), ZmqError> {
    let mut state = self.state.borrow_mut();
    while let Some(msg) = state.queue.front() {
      match self.socket.send(msg.clone()) {
        Ok(()) => {
          state.queue.pop_front();
        }
        Err(ZmqError::WouldBlock) => break,
        Err(e) => {
          // The head frame is gone either way; surface the fault.
          state.queue.pop_front();
          return Err(e);
        }
      }
    }
    Ok(())
  }

  fn drain_inbound(&self) -> Result<(), ZmqError> {
    loop {
      // The sink may have shut this connection down while handling the
      // previous message; the socket is no longer ours to touch.
      if self.factory.borrow().is_none() {
        return Ok(());
      }
      let completed = {
        let mut state = self.state.borrow_mut();
        loop {
          match self.socket.recv() {
            Ok(msg) => {
              let more = msg.is_more();
              state.recv_parts.push(msg);
              if !more {
                break Some(std::mem::take(&mut state.recv_parts));
              }
            }
            Err(ZmqError::WouldBlock) => break None,
            Err(e) => return Err(e),
          }
        }
      };
      match completed {
        Some(frames) => self.message_received(frames)?,
        None => return Ok(()),
      }
    }
  }

  /// Splits dispatch between the single-frame and multipart sink entry
  /// points so simple patterns can ignore multipart plumbing.
  fn message_received(&self, mut frames: Vec<Msg>) -> Result<(), ZmqError> {
    if frames.len() == 1 {
      self.sink.on_message(frames.remove(0))
    } else {
      self.sink.on_multipart(frames)
    }
  }

  /// Shuts the connection down: deregisters from the reactor and the
  /// factory, closes the socket, cancels any pending flush.
  ///
  /// Not idempotent; a second call returns `Err(InvalidState)` and the
  /// connection must not be used for anything after the first.
  pub fn shutdown(&self) -> Result<(), ZmqError> {
    let factory = self
      .factory
      .borrow_mut()
      .take()
      .ok_or(ZmqError::InvalidState("connection already shut down"))?;
    factory.reactor().remove_reader(self.fd);
    factory.deregister(self.handle.get());
    if let Some(call) = self.state.borrow_mut().scheduled_flush.take() {
      call.cancel();
    }
    self.sink.on_shutdown();
    self.socket.close()?;
    trace!(fd = self.fd, "connection shut down");
    Ok(())
  }
}

impl ReadDescriptor for Connection {
  fn fileno(&self) -> RawFd {
    self.fd
  }

  fn do_read(&self) -> Result<(), ZmqError> {
    self.pump()
  }
}
