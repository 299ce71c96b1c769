use crate::error::ZmqError;
use crate::reactor::{DelayedCall, ReadDescriptor, Reactor, Scheduled};

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::{error, trace};

/// How long one poll pass may sleep when nothing is scheduled. Bounded so
/// `stop()` calls issued from a reader callback take effect promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Edge-triggered single-threaded reactor over `mio::Poll`.
///
/// Readers are keyed by raw descriptor; a descriptor's readiness dispatches to
/// the registered [`ReadDescriptor`]. Scheduled callbacks run at the start of
/// every turn, before polling.
pub struct PollReactor {
  poll: RefCell<Poll>,
  readers: RefCell<HashMap<RawFd, Rc<dyn ReadDescriptor>>>,
  pending: RefCell<VecDeque<Scheduled>>,
  running: Cell<bool>,
}

impl PollReactor {
  pub fn new() -> Result<Self, ZmqError> {
    Ok(Self {
      poll: RefCell::new(Poll::new()?),
      readers: RefCell::new(HashMap::new()),
      pending: RefCell::new(VecDeque::new()),
      running: Cell::new(false),
    })
  }

  /// Runs until `stop()` is called or no readers and no scheduled callbacks
  /// remain.
  pub fn run(&self) -> Result<(), ZmqError> {
    self.running.set(true);
    while self.running.get() {
      self.turn(Some(POLL_INTERVAL))?;
      if self.readers.borrow().is_empty() && self.pending.borrow().is_empty() {
        break;
      }
    }
    self.running.set(false);
    Ok(())
  }

  /// Requests the current `run()` call to return after the ongoing turn.
  pub fn stop(&self) {
    self.running.set(false);
  }

  /// One reactor turn: fire scheduled callbacks, then poll and dispatch
  /// readiness.
  pub fn turn(&self, timeout: Option<Duration>) -> Result<(), ZmqError> {
    self.run_scheduled();
    // Callbacks may have scheduled follow-ups; do not sleep past them.
    let timeout = if self.pending.borrow().is_empty() {
      timeout
    } else {
      Some(Duration::ZERO)
    };
    let mut events = Events::with_capacity(64);
    self.poll.borrow_mut().poll(&mut events, timeout)?;
    for event in events.iter() {
      let fd = event.token().0 as RawFd;
      let reader = self.readers.borrow().get(&fd).cloned();
      if let Some(reader) = reader {
        if let Err(e) = reader.do_read() {
          error!(fd, error = %e, "reader failed, removing from reactor");
          self.remove_reader(fd);
        }
      }
    }
    Ok(())
  }

  fn run_scheduled(&self) {
    // Swap the queue out so callbacks scheduling further callbacks do not run
    // in the same batch.
    let batch: Vec<Scheduled> = self.pending.borrow_mut().drain(..).collect();
    for scheduled in batch {
      scheduled.fire();
    }
  }
}

impl Reactor for PollReactor {
  fn add_reader(&self, reader: Rc<dyn ReadDescriptor>) {
    let fd = reader.fileno();
    if let Err(e) =
      self
        .poll
        .borrow()
        .registry()
        .register(&mut SourceFd(&fd), Token(fd as usize), Interest::READABLE)
    {
      error!(fd, error = %e, "failed to register descriptor with poller");
      return;
    }
    trace!(fd, "reader registered");
    self.readers.borrow_mut().insert(fd, reader);
  }

  fn remove_reader(&self, fd: RawFd) {
    if self.readers.borrow_mut().remove(&fd).is_some() {
      if let Err(e) = self.poll.borrow().registry().deregister(&mut SourceFd(&fd)) {
        trace!(fd, error = %e, "descriptor deregistration failed");
      }
      trace!(fd, "reader removed");
    }
  }

  fn call_soon(&self, call: Box<dyn FnOnce()>) -> DelayedCall {
    let (scheduled, handle) = Scheduled::new(call);
    self.pending.borrow_mut().push_back(scheduled);
    handle
  }
}
