use crate::reactor::{DelayedCall, ReadDescriptor, Reactor, Scheduled};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::fd::RawFd;
use std::rc::Rc;

use tracing::error;

/// A reactor driven by explicit calls instead of an OS poller.
///
/// Every registered reader is pumped on each turn regardless of descriptor
/// state; readers whose pump finds no readiness return immediately. This makes
/// execution fully deterministic, which is what the test suite and transports
/// without pollable descriptors (such as the in-process transport) need. It is
/// also the integration seam for embedding connections into a foreign event
/// loop that prefers to drive turns itself.
#[derive(Default)]
pub struct ManualReactor {
  readers: RefCell<Vec<Rc<dyn ReadDescriptor>>>,
  pending: RefCell<VecDeque<Scheduled>>,
}

impl ManualReactor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fires all currently scheduled callbacks. Callbacks scheduled while the
  /// batch runs wait for the next turn.
  pub fn run_scheduled(&self) {
    let batch: Vec<Scheduled> = self.pending.borrow_mut().drain(..).collect();
    for scheduled in batch {
      scheduled.fire();
    }
  }

  /// Pumps every registered reader once. A reader error is fatal for that
  /// reader, mirroring the poll reactor.
  pub fn pump_readers(&self) {
    let readers: Vec<Rc<dyn ReadDescriptor>> = self.readers.borrow().clone();
    for reader in readers {
      if let Err(e) = reader.do_read() {
        error!(fd = reader.fileno(), error = %e, "reader failed, removing from reactor");
        self.remove_reader(reader.fileno());
      }
    }
  }

  /// One full turn: scheduled callbacks, then a pump of every reader.
  pub fn turn(&self) {
    self.run_scheduled();
    self.pump_readers();
  }

  /// Runs turns until no callback remains scheduled, with a few extra passes
  /// so freshly delivered messages get pumped through. `max_turns` bounds the
  /// loop against ping-pong workloads that keep rescheduling forever.
  pub fn run_until_idle(&self, max_turns: usize) {
    let mut quiet_turns = 0;
    for _ in 0..max_turns {
      self.turn();
      if self.pending.borrow().is_empty() {
        quiet_turns += 1;
        if quiet_turns >= 2 {
          return;
        }
      } else {
        quiet_turns = 0;
      }
    }
  }

  pub fn scheduled_calls(&self) -> usize {
    self.pending.borrow().len()
  }

  pub fn reader_count(&self) -> usize {
    self.readers.borrow().len()
  }
}

impl Reactor for ManualReactor {
  fn add_reader(&self, reader: Rc<dyn ReadDescriptor>) {
    self.readers.borrow_mut().push(reader);
  }

  fn remove_reader(&self, fd: RawFd) {
    self.readers.borrow_mut().retain(|r| r.fileno() != fd);
  }

  fn call_soon(&self, call: Box<dyn FnOnce()>) -> DelayedCall {
    let (scheduled, handle) = Scheduled::new(call);
    self.pending.borrow_mut().push_back(scheduled);
    handle
  }
}
