//! Router/dealer adapters.
//!
//! The dealer is a plain send/receive passthrough distinguished only by its
//! underlying socket type. The router addresses sends by an explicit
//! recipient identity frame and strips the sender identity off every receive.

use crate::connection::{Connection, ConnectionConfig, MessageSink};
use crate::endpoint::Endpoint;
use crate::error::ZmqError;
use crate::factory::Factory;
use crate::message::{Blob, Msg};
use crate::socket::{HandlerSink, MessageHandler, RouterHandler};
use crate::transport::SocketType;

use std::cell::RefCell;
use std::rc::Rc;

/// Asynchronous peer connection over a DEALER socket.
pub struct DealerConnection {
  conn: Rc<Connection>,
}

impl DealerConnection {
  pub fn new(
    factory: &Factory,
    endpoint: Endpoint,
    handler: impl MessageHandler + 'static,
  ) -> Result<Self, ZmqError> {
    Self::with_config(factory, ConnectionConfig::new(SocketType::Dealer).endpoint(endpoint), handler)
  }

  pub fn with_config(
    factory: &Factory,
    mut config: ConnectionConfig,
    handler: impl MessageHandler + 'static,
  ) -> Result<Self, ZmqError> {
    config.socket_type = SocketType::Dealer;
    let conn = Connection::new(factory, config, Box::new(HandlerSink::new(handler)))?;
    Ok(Self { conn })
  }

  pub fn send(&self, frames: Vec<Msg>) -> Result<(), ZmqError> {
    self.conn.send(frames)
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

struct RouterSink {
  handler: RefCell<Box<dyn RouterHandler>>,
}

impl MessageSink for RouterSink {
  fn on_multipart(&self, mut frames: Vec<Msg>) -> Result<(), ZmqError> {
    if frames.len() < 2 {
      return Err(ZmqError::ProtocolViolation("router message without sender identity and payload".into()));
    }
    let sender = Blob::from_bytes(frames.remove(0).data_bytes());
    let mut handler = self.handler.borrow_mut();
    if frames.len() == 1 {
      handler.on_message(sender, frames.remove(0));
    } else {
      handler.on_multipart(sender, frames);
    }
    Ok(())
  }
}

/// Identity-routing connection over a ROUTER socket.
pub struct RouterConnection {
  conn: Rc<Connection>,
}

impl RouterConnection {
  pub fn new(
    factory: &Factory,
    endpoint: Endpoint,
    handler: impl RouterHandler + 'static,
  ) -> Result<Self, ZmqError> {
    Self::with_config(factory, ConnectionConfig::new(SocketType::Router).endpoint(endpoint), handler)
  }

  pub fn with_config(
    factory: &Factory,
    mut config: ConnectionConfig,
    handler: impl RouterHandler + 'static,
  ) -> Result<Self, ZmqError> {
    config.socket_type = SocketType::Router;
    let sink = RouterSink {
      handler: RefCell::new(Box::new(handler)),
    };
    let conn = Connection::new(factory, config, Box::new(sink))?;
    Ok(Self { conn })
  }

  /// Sends `frames` to the peer with the given identity; the identity rides
  /// as the first frame of the transmitted message.
  pub fn send(&self, recipient: impl Into<Blob>, frames: Vec<Msg>) -> Result<(), ZmqError> {
    let recipient: Blob = recipient.into();
    let mut message = Vec::with_capacity(frames.len() + 1);
    message.push(Msg::from_bytes(recipient.to_bytes()));
    message.extend(frames);
    self.conn.send(message)
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
