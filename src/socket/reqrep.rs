//! Request/reply adapters.
//!
//! The requester rides a DEALER socket rather than REQ precisely so several
//! requests can be in flight at once; replies correlate by an ID frame. The
//! replier rides a ROUTER socket so replies can go out in any order. Wire
//! framing, requester to replier: `[correlation id, empty frame, ...payload]`,
//! which the replier sees with its routing prefix prepended.

use crate::connection::{Connection, ConnectionConfig, MessageSink};
use crate::endpoint::Endpoint;
use crate::error::ZmqError;
use crate::factory::Factory;
use crate::message::{Blob, Msg};
use crate::transport::SocketType;

use futures::channel::oneshot;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

/// How many fresh correlation IDs to generate when the pool runs dry.
pub const ID_POOL_BATCH: usize = 5;

/// A random 128-bit token in canonical UUID string form; the on-wire
/// representation of a correlation ID.
fn generate_correlation_id() -> Blob {
  let mut bytes = rand::random::<u128>().to_be_bytes();
  // Version 4 / variant 1 bits, so the token reads as a well-formed UUID.
  bytes[6] = (bytes[6] & 0x0f) | 0x40;
  bytes[8] = (bytes[8] & 0x3f) | 0x80;
  let mut text = String::with_capacity(36);
  for (i, byte) in bytes.iter().enumerate() {
    if matches!(i, 4 | 6 | 8 | 10) {
      text.push('-');
    }
    let _ = write!(text, "{:02x}", byte);
  }
  Blob::from(text.into_bytes())
}

type PendingSender = oneshot::Sender<Result<Vec<Msg>, ZmqError>>;

/// Resolves with the reply payload of one request, on the reactor thread,
/// during a future pump of the requesting connection.
pub struct ReplyFuture {
  rx: oneshot::Receiver<Result<Vec<Msg>, ZmqError>>,
}

impl ReplyFuture {
  /// Non-blocking check; `Some` once the reply has arrived (or the
  /// connection was shut down with the request outstanding).
  pub fn try_resolve(&mut self) -> Option<Result<Vec<Msg>, ZmqError>> {
    match self.rx.try_recv() {
      Ok(Some(result)) => Some(result),
      Ok(None) => None,
      Err(_cancelled) => Some(Err(ZmqError::ConnectionClosed)),
    }
  }
}

impl Future for ReplyFuture {
  type Output = Result<Vec<Msg>, ZmqError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match Pin::new(&mut self.rx).poll(cx) {
      Poll::Ready(Ok(result)) => Poll::Ready(result),
      Poll::Ready(Err(_cancelled)) => Poll::Ready(Err(ZmqError::ConnectionClosed)),
      Poll::Pending => Poll::Pending,
    }
  }
}

#[derive(Default)]
struct ReqShared {
  pending: RefCell<HashMap<Blob, PendingSender>>,
  pool: RefCell<Vec<Blob>>,
}

impl ReqShared {
  /// Takes an ID from the pool, refilling a batch of fresh unique IDs when
  /// empty. Randomness guarantees uniqueness across the pool's lifetime, not
  /// just within one batch.
  fn next_id(&self) -> Blob {
    let mut pool = self.pool.borrow_mut();
    if pool.is_empty() {
      for _ in 0..ID_POOL_BATCH {
        pool.push(generate_correlation_id());
      }
    }
    pool.pop().unwrap_or_else(generate_correlation_id)
  }

  /// Returns an ID no longer on the wire to the pool, trimming back to one
  /// batch so the pool stays well under its 2x-batch bound.
  fn release_id(&self, id: Blob) {
    let mut pool = self.pool.borrow_mut();
    pool.push(id);
    if pool.len() > ID_POOL_BATCH {
      pool.truncate(ID_POOL_BATCH);
    }
  }
}

struct RequestSink {
  shared: Rc<ReqShared>,
}

impl MessageSink for RequestSink {
  fn on_multipart(&self, mut frames: Vec<Msg>) -> Result<(), ZmqError> {
    if frames.len() < 2 || !frames[1].is_empty() {
      return Err(ZmqError::ProtocolViolation("reply without correlation id and delimiter".into()));
    }
    let reply = frames.split_off(2);
    let id = Blob::from_bytes(frames[0].data_bytes());
    let sender = self
      .shared
      .pending
      .borrow_mut()
      .remove(&id)
      .ok_or_else(|| ZmqError::ProtocolViolation(format!("unmatched correlation id {:?}", id)))?;
    self.shared.release_id(id);
    // The caller may have dropped the future; the reply is simply discarded.
    let _ = sender.send(Ok(reply));
    Ok(())
  }

  fn on_shutdown(&self) {
    for (_, sender) in self.shared.pending.borrow_mut().drain() {
      let _ = sender.send(Err(ZmqError::ConnectionClosed));
    }
  }
}

/// REQ-like connection allowing multiple concurrent in-flight requests.
pub struct RequestConnection {
  conn: Rc<Connection>,
  shared: Rc<ReqShared>,
}

impl RequestConnection {
  pub fn new(factory: &Factory, endpoint: Endpoint) -> Result<Self, ZmqError> {
    Self::with_config(factory, ConnectionConfig::new(SocketType::Dealer).endpoint(endpoint))
  }

  pub fn with_config(factory: &Factory, mut config: ConnectionConfig) -> Result<Self, ZmqError> {
    config.socket_type = SocketType::Dealer;
    let shared = Rc::new(ReqShared::default());
    let sink = RequestSink {
      shared: shared.clone(),
    };
    let conn = Connection::new(factory, config, Box::new(sink))?;
    Ok(Self { conn, shared })
  }

  /// Sends one request and returns the handle that resolves with its reply.
  pub fn send(&self, parts: Vec<Msg>) -> Result<ReplyFuture, ZmqError> {
    let id = self.shared.next_id();
    let (tx, rx) = oneshot::channel();
    self.shared.pending.borrow_mut().insert(id.clone(), tx);

    let mut frames = Vec::with_capacity(parts.len() + 2);
    frames.push(Msg::from_bytes(id.to_bytes()));
    frames.push(Msg::new());
    frames.extend(parts);
    if let Err(e) = self.conn.send(frames) {
      self.shared.pending.borrow_mut().remove(&id);
      self.shared.release_id(id);
      return Err(e);
    }
    Ok(ReplyFuture { rx })
  }

  /// Number of requests awaiting a reply.
  pub fn pending_requests(&self) -> usize {
    self.shared.pending.borrow().len()
  }

  /// Number of generated-but-unused correlation IDs currently pooled.
  pub fn id_pool_size(&self) -> usize {
    self.shared.pool.borrow().len()
  }

  pub fn add_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<(), ZmqError> {
    self.conn.add_endpoints(endpoints)
  }

  pub fn connection(&self) -> &Rc<Connection> {
    &self.conn
  }

  /// Shuts the connection down. Every outstanding [`ReplyFuture`] faults with
  /// `ConnectionClosed`; the sink does the same on factory teardown, so no
  /// shutdown path leaves a request pending forever.
  pub fn shutdown(&self) -> Result<(), ZmqError> {
    self.conn.shutdown()
  }
}

struct RepShared {
  routing: RefCell<HashMap<Blob, Vec<Msg>>>,
  conn: RefCell<Weak<Connection>>,
}

impl RepShared {
  fn reply(&self, id: &Blob, parts: Vec<Msg>) -> Result<(), ZmqError> {
    let prefix = self
      .routing
      .borrow_mut()
      .remove(id)
      .ok_or_else(|| ZmqError::ProtocolViolation(format!("no saved route for correlation id {:?}", id)))?;
    let conn = self.conn.borrow().upgrade().ok_or(ZmqError::ConnectionClosed)?;
    let mut frames = prefix;
    frames.push(Msg::from_bytes(id.to_bytes()));
    frames.push(Msg::new());
    frames.extend(parts);
    conn.send(frames)
  }
}

/// Reply capability handed to the request handler, so it can answer from
/// wherever the work completes.
#[derive(Clone)]
pub struct Replier {
  shared: Rc<RepShared>,
}

impl Replier {
  pub fn reply(&self, id: &Blob, parts: Vec<Msg>) -> Result<(), ZmqError> {
    self.shared.reply(id, parts)
  }
}

type RequestHandler = dyn FnMut(&Replier, Blob, Vec<Msg>);

struct ReplySink {
  shared: Rc<RepShared>,
  handler: RefCell<Box<RequestHandler>>,
}

impl MessageSink for ReplySink {
  fn on_multipart(&self, mut frames: Vec<Msg>) -> Result<(), ZmqError> {
    let delimiter = frames
      .iter()
      .position(Msg::is_empty)
      .ok_or_else(|| ZmqError::ProtocolViolation("request envelope without delimiter frame".into()))?;
    if delimiter == 0 {
      return Err(ZmqError::ProtocolViolation("request envelope delimiter cannot come first".into()));
    }
    let payload = frames.split_off(delimiter + 1);
    let id_and_delimiter = frames.split_off(delimiter - 1);
    let id = Blob::from_bytes(id_and_delimiter[0].data_bytes());
    // One outstanding save per ID; a second request reusing an unresolved ID
    // is the requester's hazard and simply replaces the route.
    self.shared.routing.borrow_mut().insert(id.clone(), frames);
    let replier = Replier {
      shared: self.shared.clone(),
    };
    (self.handler.borrow_mut())(&replier, id, payload);
    Ok(())
  }
}

/// REP-like connection over a ROUTER socket, allowing concurrent handling and
/// out-of-order replies.
pub struct ReplyConnection {
  conn: Rc<Connection>,
  shared: Rc<RepShared>,
}

impl ReplyConnection {
  pub fn new(
    factory: &Factory,
    endpoint: Endpoint,
    handler: impl FnMut(&Replier, Blob, Vec<Msg>) + 'static,
  ) -> Result<Self, ZmqError> {
    Self::with_config(factory, ConnectionConfig::new(SocketType::Router).endpoint(endpoint), handler)
  }

  pub fn with_config(
    factory: &Factory,
    mut config: ConnectionConfig,
    handler: impl FnMut(&Replier, Blob, Vec<Msg>) + 'static,
  ) -> Result<Self, ZmqError> {
    config.socket_type = SocketType::Router;
    let shared = Rc::new(RepShared {
      routing: RefCell::new(HashMap::new()),
      conn: RefCell::new(Weak::new()),
    });
    let sink = ReplySink {
      shared: shared.clone(),
      handler: RefCell::new(Box::new(handler)),
    };
    let conn = Connection::new(factory, config, Box::new(sink))?;
    *shared.conn.borrow_mut() = Rc::downgrade(&conn);
    Ok(Self { conn, shared })
  }

  /// Sends the reply for `id` back along its saved routing prefix. Replying
  /// twice, or for an unknown ID, is a protocol violation.
  pub fn reply(&self, id: &Blob, parts: Vec<Msg>) -> Result<(), ZmqError> {
    self.shared.reply(id, parts)
  }

  /// Number of requests received but not yet answered.
  pub fn pending_replies(&self) -> usize {
    self.shared.routing.borrow().len()
  }

  pub fn add_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<(), ZmqError> {
    self.conn.add_endpoints(endpoints)
  }

  pub fn connection(&self) -> &Rc<Connection> {
    &self.conn
  }

  pub fn shutdown(&self) -> Result<(), ZmqError> {
    self.conn.shutdown()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn correlation_ids_are_canonical_uuids() {
    let id = generate_correlation_id();
    let text = std::str::from_utf8(&id).unwrap();
    assert_eq!(text.len(), 36);
    let dashes: Vec<usize> = text.char_indices().filter(|(_, c)| *c == '-').map(|(i, _)| i).collect();
    assert_eq!(dashes, vec![8, 13, 18, 23]);
    assert_eq!(&text[14..15], "4");
  }

  #[test]
  fn next_id_refills_one_batch_at_a_time() {
    let shared = ReqShared::default();
    assert_eq!(shared.pool.borrow().len(), 0);
    let first = shared.next_id();
    assert_eq!(shared.pool.borrow().len(), ID_POOL_BATCH - 1);
    let second = shared.next_id();
    assert_ne!(first, second);
  }

  #[test]
  fn ids_are_unique_across_many_draws() {
    let shared = ReqShared::default();
    let mut seen = HashSet::new();
    for _ in 0..1000 {
      assert!(seen.insert(shared.next_id()));
    }
  }

  #[test]
  fn release_trims_the_pool_back_to_one_batch() {
    let shared = ReqShared::default();
    let ids: Vec<Blob> = (0..10).map(|_| shared.next_id()).collect();
    assert_eq!(shared.pool.borrow().len(), 0);
    for id in ids {
      shared.release_id(id);
      assert!(shared.pool.borrow().len() <= 2 * ID_POOL_BATCH);
    }
    assert_eq!(shared.pool.borrow().len(), ID_POOL_BATCH);
  }

  #[test]
  fn release_after_single_draw_restores_a_full_batch() {
    let shared = ReqShared::default();
    let id = shared.next_id();
    shared.release_id(id);
    assert_eq!(shared.pool.borrow().len(), ID_POOL_BATCH);
  }
}
