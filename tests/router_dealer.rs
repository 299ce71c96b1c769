mod common;

use ezmq::{
  Blob, ConnectionConfig, DealerConnection, Endpoint, Msg, RouterConnection, RouterHandler,
  SocketType,
};

use std::cell::RefCell;
use std::rc::Rc;

/// Records which dispatch entry point fired, to pin down the single/multipart
/// split.
struct RecordingRouterHandler {
  single: Rc<RefCell<Vec<(Vec<u8>, Vec<u8>)>>>,
  multi: Rc<RefCell<Vec<(Vec<u8>, Vec<Vec<u8>>)>>>,
}

impl RouterHandler for RecordingRouterHandler {
  fn on_message(&mut self, sender: Blob, message: Msg) {
    self.single.borrow_mut().push((sender.to_vec(), message.data().to_vec()));
  }

  fn on_multipart(&mut self, sender: Blob, frames: Vec<Msg>) {
    self
      .multi
      .borrow_mut()
      .push((sender.to_vec(), frames.iter().map(|m| m.data().to_vec()).collect()));
  }
}

#[test]
fn identity_round_trips_between_router_and_dealer() {
  let (factory, reactor) = common::test_factory();
  let endpoint = common::unique_endpoint();

  let router_got: Rc<RefCell<Vec<(Vec<u8>, Vec<Vec<u8>>)>>> = Rc::new(RefCell::new(Vec::new()));
  let sink = router_got.clone();
  let router = RouterConnection::new(
    &factory,
    Endpoint::bind(&endpoint),
    move |sender: Blob, frames: Vec<Msg>| {
      sink
        .borrow_mut()
        .push((sender.to_vec(), frames.iter().map(|m| m.data().to_vec()).collect()));
    },
  )
  .unwrap();

  let dealer_got: Rc<RefCell<Vec<Vec<Vec<u8>>>>> = Rc::new(RefCell::new(Vec::new()));
  let sink = dealer_got.clone();
  let dealer = DealerConnection::with_config(
    &factory,
    ConnectionConfig::new(SocketType::Dealer)
      .endpoint(Endpoint::connect(&endpoint))
      .identity(Blob::from("X")),
    move |frames: Vec<Msg>| {
      sink.borrow_mut().push(frames.iter().map(|m| m.data().to_vec()).collect());
    },
  )
  .unwrap();

  dealer.send(vec![Msg::from("payload")]).unwrap();
  reactor.run_until_idle(common::IDLE_TURNS);
  assert_eq!(*router_got.borrow(), vec![(b"X".to_vec(), vec![b"payload".to_vec()])]);

  router.send("X", vec![Msg::from("reply")]).unwrap();
  reactor.run_until_idle(common::IDLE_TURNS);
  assert_eq!(*dealer_got.borrow(), vec![vec![b"reply".to_vec()]]);
  factory.shutdown().unwrap();
}

#[test]
fn router_splits_single_and_multipart_dispatch() {
  let (factory, reactor) = common::test_factory();
  let endpoint = common::unique_endpoint();

  let single = Rc::new(RefCell::new(Vec::new()));
  let multi = Rc::new(RefCell::new(Vec::new()));
  let _router = RouterConnection::new(
    &factory,
    Endpoint::bind(&endpoint),
    RecordingRouterHandler {
      single: single.clone(),
      multi: multi.clone(),
    },
  )
  .unwrap();
  let dealer = DealerConnection::with_config(
    &factory,
    ConnectionConfig::new(SocketType::Dealer)
      .endpoint(Endpoint::connect(&endpoint))
      .identity(Blob::from("peer")),
    |_frames: Vec<Msg>| {},
  )
  .unwrap();

  dealer.send(vec![Msg::from("solo")]).unwrap();
  dealer.send(vec![Msg::from("first"), Msg::from("second")]).unwrap();
  reactor.run_until_idle(common::IDLE_TURNS);

  assert_eq!(*single.borrow(), vec![(b"peer".to_vec(), b"solo".to_vec())]);
  assert_eq!(
    *multi.borrow(),
    vec![(b"peer".to_vec(), vec![b"first".to_vec(), b"second".to_vec()])]
  );
  factory.shutdown().unwrap();
}

#[test]
fn send_to_unknown_identity_is_dropped_quietly() {
  let (factory, reactor) = common::test_factory();
  let endpoint = common::unique_endpoint();
  let router = RouterConnection::new(
    &factory,
    Endpoint::bind(&endpoint),
    |_sender: Blob, _frames: Vec<Msg>| {},
  )
  .unwrap();

  router.send("nobody", vec![Msg::from("lost")]).unwrap();
  reactor.run_until_idle(common::IDLE_TURNS);

  // Nothing crashed and the router is still live.
  assert_eq!(reactor.reader_count(), 1);
  factory.shutdown().unwrap();
}
