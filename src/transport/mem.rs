//! In-process transport.
//!
//! A pattern-faithful implementation of the transport contract that routes
//! messages between sockets of one process without any wire protocol: PUB
//! fan-out with subscriber-side prefix filtering, PUSH/DEALER round-robin,
//! ROUTER identity routing with envelope prefixing, per-socket FIFO inboxes
//! with multipart atomicity.
//!
//! Descriptors handed out by this transport are placeholders, not pollable OS
//! descriptors; drive connections with a manually pumped reactor rather than
//! an OS poller.

use crate::error::ZmqError;
use crate::message::{Blob, Msg, MsgFlags};
use crate::transport::{PollEvents, SocketOption, SocketType, Transport, TransportSocket};

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

/// Placeholder descriptor space, well clear of real OS descriptors.
const FD_BASE: RawFd = 1 << 20;

/// Shared in-process messaging context.
///
/// Cloning yields another handle to the same context; sockets created from any
/// handle can reach each other through `mem://` style addresses (any scheme is
/// accepted; past validation, addresses are opaque registry keys).
#[derive(Clone, Default)]
pub struct MemTransport {
  inner: Rc<MemTransportInner>,
}

#[derive(Default)]
struct MemTransportInner {
  next_id: Cell<usize>,
  sockets: RefCell<HashMap<usize, Rc<MemSocketCore>>>,
  bindings: RefCell<HashMap<String, usize>>,
  /// Connects issued before the matching bind, resolved when the bind lands.
  pending_connects: RefCell<HashMap<String, Vec<usize>>>,
  terminated: Cell<bool>,
}

struct MemSocketCore {
  id: usize,
  fd: RawFd,
  socket_type: SocketType,
  transport: Weak<MemTransportInner>,
  state: RefCell<MemSocketState>,
}

#[derive(Default)]
struct MemSocketState {
  identity: Blob,
  peers: Vec<usize>,
  /// Round-robin cursor for PUSH/DEALER distribution.
  next_peer: usize,
  subscriptions: Vec<Blob>,
  /// Complete multipart messages, delivered atomically.
  inbox: VecDeque<VecDeque<Msg>>,
  /// Outgoing frames accumulated until the final (non-MORE) frame arrives.
  pending_out: Vec<Msg>,
  closed: bool,
}

struct MemSocket {
  core: Rc<MemSocketCore>,
}

impl MemTransport {
  pub fn new() -> Self {
    Self::default()
  }
}

/// Addresses must carry a scheme (`mem://name`); past that they are opaque
/// registry keys.
fn check_address(address: &str) -> Result<(), ZmqError> {
  match address.split_once("://") {
    Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => Ok(()),
    _ => Err(ZmqError::InvalidEndpoint(address.to_string())),
  }
}

impl Transport for MemTransport {
  fn socket(&self, socket_type: SocketType) -> Result<Box<dyn TransportSocket>, ZmqError> {
    if self.inner.terminated.get() {
      return Err(ZmqError::InvalidState("transport context already terminated"));
    }
    let id = self.inner.next_id.get();
    self.inner.next_id.set(id + 1);
    let core = Rc::new(MemSocketCore {
      id,
      fd: FD_BASE + id as RawFd,
      socket_type,
      transport: Rc::downgrade(&self.inner),
      state: RefCell::new(MemSocketState {
        identity: Blob::from(format!("anon-{}", id).into_bytes()),
        ..Default::default()
      }),
    });
    self.inner.sockets.borrow_mut().insert(id, core.clone());
    trace!(id, ?socket_type, "mem transport socket created");
    Ok(Box::new(MemSocket { core }))
  }

  fn terminate(&self) -> Result<(), ZmqError> {
    self.inner.terminated.set(true);
    let leftover = self.inner.sockets.borrow().len();
    if leftover > 0 {
      warn!(leftover, "mem transport terminated with open sockets");
    }
    self.inner.sockets.borrow_mut().clear();
    self.inner.bindings.borrow_mut().clear();
    self.inner.pending_connects.borrow_mut().clear();
    Ok(())
  }
}

impl MemTransportInner {
  fn socket_by_id(&self, id: usize) -> Option<Rc<MemSocketCore>> {
    self.sockets.borrow().get(&id).cloned()
  }

  /// Makes two sockets peers of each other.
  fn link(&self, a: &Rc<MemSocketCore>, b: &Rc<MemSocketCore>) {
    {
      let mut st = a.state.borrow_mut();
      if !st.peers.contains(&b.id) {
        st.peers.push(b.id);
      }
    }
    let mut st = b.state.borrow_mut();
    if !st.peers.contains(&a.id) {
      st.peers.push(a.id);
    }
  }
}

impl MemSocketCore {
  fn identity(&self) -> Blob {
    self.state.borrow().identity.clone()
  }

  /// Queues a complete message on this socket's inbox, prefixing the sender
  /// identity when this side is a ROUTER.
  fn deliver(&self, sender: Option<&Blob>, parts: Vec<Msg>) {
    let mut message: VecDeque<Msg> = parts.into();
    if self.socket_type == SocketType::Router {
      if let Some(identity) = sender {
        message.push_front(Msg::from_bytes(identity.to_bytes()));
      }
    }
    self.state.borrow_mut().inbox.push_back(message);
  }

  /// Picks the next live peer in round-robin order.
  fn next_live_peer(&self, transport: &MemTransportInner) -> Option<Rc<MemSocketCore>> {
    let mut st = self.state.borrow_mut();
    let count = st.peers.len();
    for _ in 0..count {
      let idx = st.next_peer % st.peers.len();
      st.next_peer = st.next_peer.wrapping_add(1);
      let peer_id = st.peers[idx];
      if let Some(peer) = transport.socket_by_id(peer_id) {
        if !peer.state.borrow().closed {
          return Some(peer);
        }
      }
    }
    None
  }

  /// Routes one complete multipart message according to the socket type.
  fn route(&self, parts: Vec<Msg>) -> Result<(), ZmqError> {
    let transport = self
      .transport
      .upgrade()
      .ok_or(ZmqError::InvalidState("transport context already terminated"))?;
    let identity = self.identity();
    match self.socket_type {
      SocketType::Pub => {
        let peers: Vec<usize> = self.state.borrow().peers.clone();
        let first = parts[0].data_bytes();
        for peer_id in peers {
          let Some(peer) = transport.socket_by_id(peer_id) else {
            continue;
          };
          let matched = {
            let st = peer.state.borrow();
            !st.closed && st.subscriptions.iter().any(|tag| first.starts_with(tag))
          };
          if matched {
            peer.deliver(Some(&identity), parts.clone());
          }
        }
        Ok(())
      }
      SocketType::Push | SocketType::Dealer => match self.next_live_peer(&transport) {
        Some(peer) => {
          peer.deliver(Some(&identity), parts);
          Ok(())
        }
        None => {
          warn!(id = self.id, "no live peer at routing time, message dropped");
          Ok(())
        }
      },
      SocketType::Router => {
        let mut parts = parts;
        if parts.is_empty() {
          return Err(ZmqError::ProtocolViolation("router send without recipient frame".into()));
        }
        let recipient = Blob::from_bytes(parts.remove(0).data_bytes());
        let peers: Vec<usize> = self.state.borrow().peers.clone();
        let target = peers.iter().find_map(|peer_id| {
          let peer = transport.socket_by_id(*peer_id)?;
          let live = {
            let st = peer.state.borrow();
            !st.closed && st.identity == recipient
          };
          live.then_some(peer)
        });
        match target {
          Some(peer) => peer.deliver(Some(&identity), parts),
          // libzmq default (non-mandatory routing): silently discard.
          None => warn!(id = self.id, ?recipient, "no peer with recipient identity, message dropped"),
        }
        Ok(())
      }
      SocketType::Sub | SocketType::Pull => {
        Err(ZmqError::InvalidState("socket type cannot send"))
      }
    }
  }

  /// True when at least one message could be sent without blocking.
  fn send_ready(&self) -> bool {
    match self.socket_type {
      // PUB and ROUTER discard undeliverable messages, so they always accept.
      SocketType::Pub | SocketType::Router => true,
      SocketType::Push | SocketType::Dealer => {
        let transport = match self.transport.upgrade() {
          Some(t) => t,
          None => return false,
        };
        let st = self.state.borrow();
        st.peers.iter().any(|peer_id| {
          transport
            .socket_by_id(*peer_id)
            .is_some_and(|peer| !peer.state.borrow().closed)
        })
      }
      SocketType::Sub | SocketType::Pull => false,
    }
  }
}

impl TransportSocket for MemSocket {
  fn fd(&self) -> RawFd {
    self.core.fd
  }

  fn set_option(&self, option: SocketOption) -> Result<(), ZmqError> {
    let core = &self.core;
    match option {
      SocketOption::Identity(identity) => {
        core.state.borrow_mut().identity = identity;
        Ok(())
      }
      SocketOption::Subscribe(tag) => {
        if core.socket_type != SocketType::Sub {
          return Err(ZmqError::InvalidArgument("subscribe on a non-SUB socket".into()));
        }
        core.state.borrow_mut().subscriptions.push(tag);
        Ok(())
      }
      SocketOption::Unsubscribe(tag) => {
        if core.socket_type != SocketType::Sub {
          return Err(ZmqError::InvalidArgument("unsubscribe on a non-SUB socket".into()));
        }
        let mut st = core.state.borrow_mut();
        if let Some(pos) = st.subscriptions.iter().position(|t| *t == tag) {
          st.subscriptions.remove(pos);
        }
        Ok(())
      }
      // Queueing here is unbounded and there is no real wire, so the remaining
      // transport tuning options are accepted and ignored.
      SocketOption::Linger(_)
      | SocketOption::MulticastLoop(_)
      | SocketOption::MulticastRate(_)
      | SocketOption::HighWaterMark(_) => Ok(()),
    }
  }

  fn events(&self) -> Result<PollEvents, ZmqError> {
    let mut events = PollEvents::empty();
    {
      let st = self.core.state.borrow();
      if st.closed {
        return Err(ZmqError::InvalidState("socket already closed"));
      }
      if !st.inbox.is_empty() {
        events |= PollEvents::POLLIN;
      }
    }
    if self.core.send_ready() {
      events |= PollEvents::POLLOUT;
    }
    Ok(events)
  }

  fn bind(&self, address: &str) -> Result<(), ZmqError> {
    check_address(address)?;
    let transport = self
      .core
      .transport
      .upgrade()
      .ok_or(ZmqError::InvalidState("transport context already terminated"))?;
    {
      let mut bindings = transport.bindings.borrow_mut();
      if bindings.contains_key(address) {
        return Err(ZmqError::AddrInUse(address.to_string()));
      }
      bindings.insert(address.to_string(), self.core.id);
    }
    // Resolve connects that raced ahead of this bind.
    let waiting = transport.pending_connects.borrow_mut().remove(address);
    for peer_id in waiting.unwrap_or_default() {
      if let Some(peer) = transport.socket_by_id(peer_id) {
        transport.link(&self.core, &peer);
      }
    }
    trace!(id = self.core.id, address, "mem socket bound");
    Ok(())
  }

  fn connect(&self, address: &str) -> Result<(), ZmqError> {
    check_address(address)?;
    let transport = self
      .core
      .transport
      .upgrade()
      .ok_or(ZmqError::InvalidState("transport context already terminated"))?;
    let binder = transport.bindings.borrow().get(address).copied();
    match binder.and_then(|id| transport.socket_by_id(id)) {
      Some(peer) => transport.link(&self.core, &peer),
      None => transport
        .pending_connects
        .borrow_mut()
        .entry(address.to_string())
        .or_default()
        .push(self.core.id),
    }
    trace!(id = self.core.id, address, "mem socket connected");
    Ok(())
  }

  fn send(&self, msg: Msg) -> Result<(), ZmqError> {
    let starting_new_message = {
      let st = self.core.state.borrow();
      if st.closed {
        return Err(ZmqError::InvalidState("socket already closed"));
      }
      st.pending_out.is_empty()
    };
    // Refuse the start of a new message while nothing could route it; a
    // partially accepted message is routed regardless once complete.
    if starting_new_message && !self.core.send_ready() {
      return Err(ZmqError::WouldBlock);
    }
    let complete = {
      let mut st = self.core.state.borrow_mut();
      let more = msg.is_more();
      st.pending_out.push(msg);
      if more {
        None
      } else {
        let mut parts = std::mem::take(&mut st.pending_out);
        for part in &mut parts {
          part.set_flags(part.flags() - MsgFlags::MORE);
        }
        Some(parts)
      }
    };
    match complete {
      Some(parts) => self.core.route(parts),
      None => Ok(()),
    }
  }

  fn recv(&self) -> Result<Msg, ZmqError> {
    let mut st = self.core.state.borrow_mut();
    if st.closed {
      return Err(ZmqError::InvalidState("socket already closed"));
    }
    let front = st.inbox.front_mut().ok_or(ZmqError::WouldBlock)?;
    let mut msg = front.pop_front().unwrap_or_default();
    if front.is_empty() {
      st.inbox.pop_front();
      msg.set_flags(msg.flags() - MsgFlags::MORE);
    } else {
      msg.set_flags(msg.flags() | MsgFlags::MORE);
    }
    Ok(msg)
  }

  fn close(&self) -> Result<(), ZmqError> {
    {
      let mut st = self.core.state.borrow_mut();
      if st.closed {
        return Err(ZmqError::InvalidState("socket already closed"));
      }
      st.closed = true;
    }
    if let Some(transport) = self.core.transport.upgrade() {
      transport.sockets.borrow_mut().remove(&self.core.id);
      transport
        .bindings
        .borrow_mut()
        .retain(|_, bound| *bound != self.core.id);
      for waiting in transport.pending_connects.borrow_mut().values_mut() {
        waiting.retain(|id| *id != self.core.id);
      }
    }
    trace!(id = self.core.id, "mem socket closed");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pair(
    transport: &MemTransport,
    bind_type: SocketType,
    connect_type: SocketType,
  ) -> (Box<dyn TransportSocket>, Box<dyn TransportSocket>) {
    let a = transport.socket(bind_type).unwrap();
    let b = transport.socket(connect_type).unwrap();
    a.bind("mem://pair").unwrap();
    b.connect("mem://pair").unwrap();
    (a, b)
  }

  fn send_parts(socket: &dyn TransportSocket, parts: &[&[u8]]) {
    for (i, part) in parts.iter().enumerate() {
      let mut msg = Msg::from(*part);
      if i + 1 < parts.len() {
        msg.set_flags(MsgFlags::MORE);
      }
      socket.send(msg).unwrap();
    }
  }

  fn recv_parts(socket: &dyn TransportSocket) -> Vec<Vec<u8>> {
    let mut parts = Vec::new();
    loop {
      let msg = socket.recv().unwrap();
      let more = msg.is_more();
      parts.push(msg.data().to_vec());
      if !more {
        return parts;
      }
    }
  }

  #[test]
  fn multipart_messages_arrive_atomically_and_in_order() {
    let transport = MemTransport::new();
    let (pull, push) = pair(&transport, SocketType::Pull, SocketType::Push);

    send_parts(push.as_ref(), &[b"a", b"bb", b"ccc"]);
    send_parts(push.as_ref(), &[b"second"]);

    assert_eq!(recv_parts(pull.as_ref()), vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);
    assert_eq!(recv_parts(pull.as_ref()), vec![b"second".to_vec()]);
    assert!(pull.recv().unwrap_err().is_would_block());
  }

  #[test]
  fn sub_prefix_filter_is_applied_on_delivery() {
    let transport = MemTransport::new();
    let (sub, publisher) = pair(&transport, SocketType::Sub, SocketType::Pub);
    sub.set_option(SocketOption::Subscribe(Blob::from("tag"))).unwrap();

    send_parts(publisher.as_ref(), &[b"tag1\0yes"]);
    send_parts(publisher.as_ref(), &[b"other\0no"]);

    assert_eq!(recv_parts(sub.as_ref()), vec![b"tag1\0yes".to_vec()]);
    assert!(sub.recv().unwrap_err().is_would_block());
  }

  #[test]
  fn router_routes_by_identity_and_prefixes_sender() {
    let transport = MemTransport::new();
    let router = transport.socket(SocketType::Router).unwrap();
    let dealer = transport.socket(SocketType::Dealer).unwrap();
    dealer.set_option(SocketOption::Identity(Blob::from("X"))).unwrap();
    router.bind("mem://router").unwrap();
    dealer.connect("mem://router").unwrap();

    send_parts(dealer.as_ref(), &[b"hello"]);
    assert_eq!(recv_parts(router.as_ref()), vec![b"X".to_vec(), b"hello".to_vec()]);

    send_parts(router.as_ref(), &[b"X", b"world"]);
    assert_eq!(recv_parts(dealer.as_ref()), vec![b"world".to_vec()]);
  }

  #[test]
  fn connect_before_bind_resolves_when_binder_arrives() {
    let transport = MemTransport::new();
    let push = transport.socket(SocketType::Push).unwrap();
    let pull = transport.socket(SocketType::Pull).unwrap();
    push.connect("mem://late").unwrap();

    assert!(push.send(Msg::from("early")).unwrap_err().is_would_block());

    pull.bind("mem://late").unwrap();
    send_parts(push.as_ref(), &[b"early"]);
    assert_eq!(recv_parts(pull.as_ref()), vec![b"early".to_vec()]);
  }

  #[test]
  fn addresses_without_a_scheme_are_rejected() {
    let transport = MemTransport::new();
    let socket = transport.socket(SocketType::Pull).unwrap();
    for bad in ["", "no-scheme", "mem://", "://name"] {
      assert!(matches!(socket.bind(bad), Err(ZmqError::InvalidEndpoint(_))));
      assert!(matches!(socket.connect(bad), Err(ZmqError::InvalidEndpoint(_))));
    }
    socket.bind("mem://good").unwrap();
  }

  #[test]
  fn bind_conflict_is_reported() {
    let transport = MemTransport::new();
    let a = transport.socket(SocketType::Pull).unwrap();
    let b = transport.socket(SocketType::Pull).unwrap();
    a.bind("mem://dup").unwrap();
    assert!(matches!(b.bind("mem://dup"), Err(ZmqError::AddrInUse(_))));
  }

  #[test]
  fn push_round_robins_across_pullers() {
    let transport = MemTransport::new();
    let push = transport.socket(SocketType::Push).unwrap();
    push.bind("mem://rr").unwrap();
    let pull_a = transport.socket(SocketType::Pull).unwrap();
    let pull_b = transport.socket(SocketType::Pull).unwrap();
    pull_a.connect("mem://rr").unwrap();
    pull_b.connect("mem://rr").unwrap();

    send_parts(push.as_ref(), &[b"1"]);
    send_parts(push.as_ref(), &[b"2"]);
    send_parts(push.as_ref(), &[b"3"]);

    let a_count = {
      let mut n = 0;
      while pull_a.recv().is_ok() {
        n += 1;
      }
      n
    };
    let b_count = {
      let mut n = 0;
      while pull_b.recv().is_ok() {
        n += 1;
      }
      n
    };
    assert_eq!(a_count + b_count, 3);
    assert!(a_count >= 1 && b_count >= 1);
  }
}
