//! Pattern adapters: role-specific framing, correlation and filtering layered
//! over the connection engine by composition. Each adapter wraps an
//! `Rc<Connection>` and installs its own [`MessageSink`](crate::MessageSink).

mod pubsub;
mod pushpull;
mod reqrep;
mod router_dealer;

pub use pubsub::{PubConnection, SubConnection, TAG_SEPARATOR};
pub use pushpull::{PullConnection, PushConnection};
pub use reqrep::{Replier, ReplyConnection, ReplyFuture, RequestConnection, ID_POOL_BATCH};
pub use router_dealer::{DealerConnection, RouterConnection};

use crate::connection::MessageSink;
use crate::error::ZmqError;
use crate::message::{Blob, Msg};
use std::cell::RefCell;

/// Receive callback with the single/multipart split of the engine dispatch.
///
/// The single-frame entry point delegates to the multipart one by default, so
/// a plain closure over `Vec<Msg>` handles everything.
pub trait MessageHandler {
  fn on_message(&mut self, message: Msg) {
    self.on_multipart(vec![message]);
  }

  fn on_multipart(&mut self, frames: Vec<Msg>);
}

impl<F: FnMut(Vec<Msg>)> MessageHandler for F {
  fn on_multipart(&mut self, frames: Vec<Msg>) {
    self(frames)
  }
}

/// Receive callback for router connections; the sender identity is stripped
/// off the envelope before dispatch.
pub trait RouterHandler {
  fn on_message(&mut self, sender: Blob, message: Msg) {
    self.on_multipart(sender, vec![message]);
  }

  fn on_multipart(&mut self, sender: Blob, frames: Vec<Msg>);
}

impl<F: FnMut(Blob, Vec<Msg>)> RouterHandler for F {
  fn on_multipart(&mut self, sender: Blob, frames: Vec<Msg>) {
    self(sender, frames)
  }
}

/// Bridges the engine's sink to a user [`MessageHandler`] without any
/// transformation; used by the passthrough patterns (pull, dealer).
pub(crate) struct HandlerSink {
  handler: RefCell<Box<dyn MessageHandler>>,
}

impl HandlerSink {
  pub(crate) fn new(handler: impl MessageHandler + 'static) -> Self {
    Self {
      handler: RefCell::new(Box::new(handler)),
    }
  }
}

impl MessageSink for HandlerSink {
  fn on_message(&self, frame: Msg) -> Result<(), ZmqError> {
    self.handler.borrow_mut().on_message(frame);
    Ok(())
  }

  fn on_multipart(&self, frames: Vec<Msg>) -> Result<(), ZmqError> {
    self.handler.borrow_mut().on_multipart(frames);
    Ok(())
  }
}
