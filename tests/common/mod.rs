#![allow(dead_code)] // Not every test file uses every helper.

use ezmq::{Factory, ManualReactor, MemTransport};

use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

static ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);
static TRACING_INIT: Once = Once::new();

pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    let default_filter = "ezmq=trace,info";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_test_writer()
      .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
  });
}

/// A factory over the in-process transport, driven by a manual reactor.
pub fn test_factory() -> (Factory, Rc<ManualReactor>) {
  setup_tracing();
  let reactor = Rc::new(ManualReactor::new());
  let factory = Factory::new(Rc::new(MemTransport::new()), reactor.clone());
  (factory, reactor)
}

/// Unique in-process endpoint per call, so tests never collide.
pub fn unique_endpoint() -> String {
  let count = ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("mem://test-sock-{}", count)
}

/// Enough turns for any of the message flows exercised here to settle.
pub const IDLE_TURNS: usize = 32;
