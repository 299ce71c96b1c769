//! Process-wide bookkeeping: the shared transport context, the reactor handle
//! and the set of live connections.

use crate::connection::Connection;
use crate::error::ZmqError;
use crate::reactor::Reactor;
use crate::transport::Transport;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tracing::warn;

const DEFAULT_LINGER: Duration = Duration::from_millis(100);

struct FactoryInner {
  transport: Rc<dyn Transport>,
  reactor: Rc<dyn Reactor>,
  connections: RefCell<HashMap<usize, Rc<Connection>>>,
  next_handle: Cell<usize>,
  linger: Cell<Duration>,
}

/// Shared handle over the transport context, the reactor and the live
/// connection set. Cloning is cheap; every connection holds one.
///
/// There is deliberately no ambient process-wide instance: callers create a
/// factory for a process or test scope and tear it down with
/// [`Factory::shutdown`], which shuts every registered connection down and
/// then releases the transport context.
#[derive(Clone)]
pub struct Factory {
  inner: Rc<FactoryInner>,
}

impl Factory {
  pub fn new(transport: Rc<dyn Transport>, reactor: Rc<dyn Reactor>) -> Self {
    Self {
      inner: Rc::new(FactoryInner {
        transport,
        reactor,
        connections: RefCell::new(HashMap::new()),
        next_handle: Cell::new(1),
        linger: Cell::new(DEFAULT_LINGER),
      }),
    }
  }

  pub fn transport(&self) -> Rc<dyn Transport> {
    self.inner.transport.clone()
  }

  pub fn reactor(&self) -> Rc<dyn Reactor> {
    self.inner.reactor.clone()
  }

  /// Linger period applied to every socket created after the change.
  pub fn linger(&self) -> Duration {
    self.inner.linger.get()
  }

  pub fn set_linger(&self, linger: Duration) {
    self.inner.linger.set(linger);
  }

  /// Number of live connections registered with this factory.
  pub fn connection_count(&self) -> usize {
    self.inner.connections.borrow().len()
  }

  pub(crate) fn register(&self, connection: Rc<Connection>) -> usize {
    let handle = self.inner.next_handle.get();
    self.inner.next_handle.set(handle + 1);
    self.inner.connections.borrow_mut().insert(handle, connection);
    handle
  }

  pub(crate) fn deregister(&self, handle: usize) {
    self.inner.connections.borrow_mut().remove(&handle);
  }

  /// Shuts down every live connection, then releases the transport context.
  ///
  /// Connection shutdown failures are reported and do not stop the sweep; the
  /// first one is returned after the context is released.
  pub fn shutdown(&self) -> Result<(), ZmqError> {
    let connections: Vec<Rc<Connection>> = self.inner.connections.borrow().values().cloned().collect();
    let mut first_error = None;
    for connection in connections {
      if let Err(e) = connection.shutdown() {
        warn!(fd = connection.fd(), error = %e, "connection shutdown failed during factory teardown");
        first_error.get_or_insert(e);
      }
    }
    self.inner.connections.borrow_mut().clear();
    self.inner.transport.terminate()?;
    match first_error {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }
}
