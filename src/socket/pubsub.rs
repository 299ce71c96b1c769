//! Publish/subscribe adapters.
//!
//! Wire framing is a single frame `tag 0x00 payload`. The historical
//! two-frame tag-prefix form is not produced and not auto-detected: a
//! subscriber receiving a multipart message reports a protocol violation.
//! Tags therefore must not contain the separator byte; `publish` rejects
//! them up front.

use crate::connection::{Connection, ConnectionConfig, DiscardSink, MessageSink};
use crate::endpoint::Endpoint;
use crate::error::ZmqError;
use crate::factory::Factory;
use crate::message::{Blob, Msg};
use crate::transport::{SocketOption, SocketType};

use bytes::Bytes;
use std::cell::RefCell;
use std::rc::Rc;

/// Separator between tag and payload inside a published frame.
pub const TAG_SEPARATOR: u8 = 0x00;

fn split_tagged_frame(data: Bytes) -> Result<(Blob, Bytes), ZmqError> {
  let sep = data
    .iter()
    .position(|b| *b == TAG_SEPARATOR)
    .ok_or_else(|| ZmqError::ProtocolViolation("published frame without tag separator".into()))?;
  let tag = Blob::from_bytes(data.slice(..sep));
  let payload = data.slice(sep + 1..);
  Ok((tag, payload))
}

/// Broadcast publisher over a PUB socket.
pub struct PubConnection {
  conn: Rc<Connection>,
}

impl PubConnection {
  pub fn new(factory: &Factory, endpoint: Endpoint) -> Result<Self, ZmqError> {
    Self::with_config(factory, ConnectionConfig::new(SocketType::Pub).endpoint(endpoint))
  }

  pub fn with_config(factory: &Factory, mut config: ConnectionConfig) -> Result<Self, ZmqError> {
    config.socket_type = SocketType::Pub;
    let conn = Connection::new(factory, config, Box::new(DiscardSink))?;
    Ok(Self { conn })
  }

  /// Broadcasts `message` under `tag`. Subscribers filter by tag prefix.
  pub fn publish(&self, tag: impl AsRef<[u8]>, message: impl AsRef<[u8]>) -> Result<(), ZmqError> {
    let tag = tag.as_ref();
    let message = message.as_ref();
    if tag.contains(&TAG_SEPARATOR) {
      return Err(ZmqError::InvalidArgument("tag must not contain the separator byte".into()));
    }
    let mut frame = Vec::with_capacity(tag.len() + 1 + message.len());
    frame.extend_from_slice(tag);
    frame.push(TAG_SEPARATOR);
    frame.extend_from_slice(message);
    self.conn.send(vec![Msg::from_vec(frame)])
  }

  /// Multipart publishing has no defined framing under the tagged
  /// single-frame scheme.
  pub fn publish_multipart(&self, _tag: impl AsRef<[u8]>, _parts: Vec<Msg>) -> Result<(), ZmqError> {
    Err(ZmqError::UnsupportedFeature("multipart publish"))
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

/// Receive callback of a subscriber: `(tag, payload)`.
pub type SubHandler = dyn FnMut(Blob, Bytes);

struct SubSink {
  handler: RefCell<Box<SubHandler>>,
}

impl MessageSink for SubSink {
  fn on_message(&self, frame: Msg) -> Result<(), ZmqError> {
    let (tag, payload) = split_tagged_frame(frame.data_bytes())?;
    (self.handler.borrow_mut())(tag, payload);
    Ok(())
  }

  fn on_multipart(&self, frames: Vec<Msg>) -> Result<(), ZmqError> {
    Err(ZmqError::ProtocolViolation(format!(
      "subscriber received a {}-frame message; tagged publishes are single-frame",
      frames.len()
    )))
  }
}

/// Tag-filtered subscriber over a SUB socket.
///
/// Prefix matching is delegated entirely to the transport; `subscribe("tag")`
/// matches every published tag starting with `tag`.
pub struct SubConnection {
  conn: Rc<Connection>,
}

impl SubConnection {
  pub fn new(
    factory: &Factory,
    endpoint: Endpoint,
    handler: impl FnMut(Blob, Bytes) + 'static,
  ) -> Result<Self, ZmqError> {
    Self::with_config(factory, ConnectionConfig::new(SocketType::Sub).endpoint(endpoint), handler)
  }

  pub fn with_config(
    factory: &Factory,
    mut config: ConnectionConfig,
    handler: impl FnMut(Blob, Bytes) + 'static,
  ) -> Result<Self, ZmqError> {
    config.socket_type = SocketType::Sub;
    let sink = SubSink {
      handler: RefCell::new(Box::new(handler)),
    };
    let conn = Connection::new(factory, config, Box::new(sink))?;
    Ok(Self { conn })
  }

  /// Subscribes to messages whose tag starts with `tag`.
  pub fn subscribe(&self, tag: impl AsRef<[u8]>) -> Result<(), ZmqError> {
    self.conn.set_option(SocketOption::Subscribe(Blob::from(tag.as_ref())))
  }

  /// Removes a previously registered prefix filter.
  pub fn unsubscribe(&self, tag: impl AsRef<[u8]>) -> Result<(), ZmqError> {
    self.conn.set_option(SocketOption::Unsubscribe(Blob::from(tag.as_ref())))
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

  #[test]
  fn tagged_frame_splits_on_first_separator() {
    let (tag, payload) = split_tagged_frame(Bytes::from_static(b"tag1\0abcd")).unwrap();
    assert_eq!(&tag[..], b"tag1");
    assert_eq!(&payload[..], b"abcd");
  }

  #[test]
  fn payload_may_contain_separator_bytes() {
    let (tag, payload) = split_tagged_frame(Bytes::from_static(b"t\0a\0b")).unwrap();
    assert_eq!(&tag[..], b"t");
    assert_eq!(&payload[..], b"a\0b");
  }

  #[test]
  fn empty_tag_is_valid() {
    let (tag, payload) = split_tagged_frame(Bytes::from_static(b"\0payload")).unwrap();
    assert!(tag.is_empty());
    assert_eq!(&payload[..], b"payload");
  }

  #[test]
  fn frame_without_separator_is_a_violation() {
    assert!(matches!(
      split_tagged_frame(Bytes::from_static(b"no separator here")),
      Err(ZmqError::ProtocolViolation(_))
    ));
  }
}
