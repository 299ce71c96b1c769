//! The reactor collaborator contract.
//!
//! A connection registers itself as a [`ReadDescriptor`] so the host event
//! loop can invoke its pump on descriptor readiness, and uses
//! [`Reactor::call_soon`] to schedule the deferred outbound flush. The crate
//! ships [`PollReactor`], an edge-triggered `mio` implementation; any loop
//! satisfying the trait works.

mod manual;
mod poll;

pub use manual::ManualReactor;
pub use poll::PollReactor;

use std::cell::Cell;
use std::os::fd::RawFd;
use std::rc::Rc;

use crate::error::ZmqError;

/// A readiness-driven participant in the event loop.
pub trait ReadDescriptor {
  /// The platform descriptor to watch for read readiness.
  fn fileno(&self) -> RawFd;

  /// Invoked by the reactor when the descriptor signals readiness. A returned
  /// error is fatal for this descriptor; the reactor reports it and stops
  /// watching.
  fn do_read(&self) -> Result<(), ZmqError>;
}

/// Cancellation handle for a single-shot scheduled callback.
///
/// Cancelling after the callback has run is a no-op.
#[derive(Clone)]
pub struct DelayedCall {
  cancelled: Rc<Cell<bool>>,
}

impl DelayedCall {
  pub(crate) fn new() -> Self {
    Self {
      cancelled: Rc::new(Cell::new(false)),
    }
  }

  pub fn cancel(&self) {
    self.cancelled.set(true);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.get()
  }
}

/// One scheduled callback together with its cancellation flag.
pub struct Scheduled {
  handle: DelayedCall,
  call: Box<dyn FnOnce()>,
}

impl Scheduled {
  pub fn new(call: Box<dyn FnOnce()>) -> (Self, DelayedCall) {
    let handle = DelayedCall::new();
    (
      Self {
        handle: handle.clone(),
        call,
      },
      handle,
    )
  }

  /// Runs the callback unless it was cancelled.
  pub fn fire(self) {
    if !self.handle.is_cancelled() {
      (self.call)();
    }
  }
}

/// The host event loop, as seen by connections.
pub trait Reactor {
  /// Starts watching a descriptor source for read readiness.
  fn add_reader(&self, reader: Rc<dyn ReadDescriptor>);

  /// Stops watching the descriptor. No further `do_read` calls are made for
  /// it once this returns.
  fn remove_reader(&self, fd: RawFd);

  /// Schedules a single-shot callback for the next reactor turn. The returned
  /// handle cancels it.
  fn call_soon(&self, call: Box<dyn FnOnce()>) -> DelayedCall;
}
