//! Push/pull adapters: direct aliases over the engine's send and receive
//! paths, no correlation or framing logic.

use crate::connection::{Connection, ConnectionConfig, DiscardSink};
use crate::endpoint::Endpoint;
use crate::error::ZmqError;
use crate::factory::Factory;
use crate::message::Msg;
use crate::socket::{HandlerSink, MessageHandler};
use crate::transport::SocketType;

use std::rc::Rc;

/// Load-balancing producer over a PUSH socket.
pub struct PushConnection {
  conn: Rc<Connection>,
}

impl PushConnection {
  pub fn new(factory: &Factory, endpoint: Endpoint) -> Result<Self, ZmqError> {
    Self::with_config(factory, ConnectionConfig::new(SocketType::Push).endpoint(endpoint))
  }

  pub fn with_config(factory: &Factory, mut config: ConnectionConfig) -> Result<Self, ZmqError> {
    config.socket_type = SocketType::Push;
    let conn = Connection::new(factory, config, Box::new(DiscardSink))?;
    Ok(Self { conn })
  }

  /// Pushes a single-frame message.
  pub fn push(&self, message: impl Into<Msg>) -> Result<(), ZmqError> {
    self.conn.send(vec![message.into()])
  }

  /// Pushes a multipart message.
  pub fn push_multipart(&self, parts: Vec<Msg>) -> Result<(), ZmqError> {
    self.conn.send(parts)
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

/// Consumer over a PULL socket; every received message goes straight to the
/// handler with the engine's single/multipart split preserved.
pub struct PullConnection {
  conn: Rc<Connection>,
}

impl PullConnection {
  pub fn new(
    factory: &Factory,
    endpoint: Endpoint,
    handler: impl MessageHandler + 'static,
  ) -> Result<Self, ZmqError> {
    Self::with_config(factory, ConnectionConfig::new(SocketType::Pull).endpoint(endpoint), handler)
  }

  pub fn with_config(
    factory: &Factory,
    mut config: ConnectionConfig,
    handler: impl MessageHandler + 'static,
  ) -> Result<Self, ZmqError> {
    config.socket_type = SocketType::Pull;
    let conn = Connection::new(factory, config, Box::new(HandlerSink::new(handler)))?;
    Ok(Self { conn })
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
