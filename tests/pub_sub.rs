mod common;

use ezmq::{Blob, Endpoint, Msg, PubConnection, SubConnection, ZmqError};

use bytes::Bytes;
use std::cell::RefCell;
use std::rc::Rc;

type Received = Rc<RefCell<Vec<(Vec<u8>, Vec<u8>)>>>;

fn subscriber(
  factory: &ezmq::Factory,
  endpoint: Endpoint,
) -> (SubConnection, Received) {
  let received: Received = Rc::new(RefCell::new(Vec::new()));
  let sink = received.clone();
  let sub = SubConnection::new(factory, endpoint, move |tag: Blob, payload: Bytes| {
    sink.borrow_mut().push((tag.to_vec(), payload.to_vec()));
  })
  .unwrap();
  (sub, received)
}

#[test]
fn subscriber_receives_only_matching_tags_in_order() {
  let (factory, reactor) = common::test_factory();
  let endpoint = common::unique_endpoint();
  let (sub, received) = subscriber(&factory, Endpoint::bind(&endpoint));
  sub.subscribe("tag").unwrap();
  let publisher = PubConnection::new(&factory, Endpoint::connect(&endpoint)).unwrap();

  publisher.publish("different-tag", "xyz").unwrap();
  publisher.publish("tag1", "abcd").unwrap();
  publisher.publish("tag2", "efgh").unwrap();
  reactor.run_until_idle(common::IDLE_TURNS);

  assert_eq!(
    *received.borrow(),
    vec![(b"tag1".to_vec(), b"abcd".to_vec()), (b"tag2".to_vec(), b"efgh".to_vec())]
  );
  factory.shutdown().unwrap();
}

#[test]
fn exact_tag_subscription_excludes_other_tags() {
  let (factory, reactor) = common::test_factory();
  let endpoint = common::unique_endpoint();
  let (sub, received) = subscriber(&factory, Endpoint::bind(&endpoint));
  sub.subscribe("tag1").unwrap();
  let publisher = PubConnection::new(&factory, Endpoint::connect(&endpoint)).unwrap();

  publisher.publish("tag1", "wanted").unwrap();
  publisher.publish("tag2", "unwanted").unwrap();
  publisher.publish("different-tag", "unwanted").unwrap();
  reactor.run_until_idle(common::IDLE_TURNS);

  assert_eq!(*received.borrow(), vec![(b"tag1".to_vec(), b"wanted".to_vec())]);
  factory.shutdown().unwrap();
}

#[test]
fn unsubscribe_stops_delivery() {
  let (factory, reactor) = common::test_factory();
  let endpoint = common::unique_endpoint();
  let (sub, received) = subscriber(&factory, Endpoint::bind(&endpoint));
  sub.subscribe("tag").unwrap();
  let publisher = PubConnection::new(&factory, Endpoint::connect(&endpoint)).unwrap();

  publisher.publish("tag", "first").unwrap();
  reactor.run_until_idle(common::IDLE_TURNS);
  sub.unsubscribe("tag").unwrap();
  publisher.publish("tag", "second").unwrap();
  reactor.run_until_idle(common::IDLE_TURNS);

  assert_eq!(*received.borrow(), vec![(b"tag".to_vec(), b"first".to_vec())]);
  factory.shutdown().unwrap();
}

#[test]
fn publish_rejects_tags_containing_the_separator() {
  let (factory, _reactor) = common::test_factory();
  let publisher = PubConnection::new(&factory, Endpoint::bind(common::unique_endpoint())).unwrap();
  assert!(matches!(
    publisher.publish(b"bad\0tag".as_slice(), "payload"),
    Err(ZmqError::InvalidArgument(_))
  ));
  factory.shutdown().unwrap();
}

#[test]
fn multipart_publish_is_unsupported() {
  let (factory, _reactor) = common::test_factory();
  let publisher = PubConnection::new(&factory, Endpoint::bind(common::unique_endpoint())).unwrap();
  assert!(matches!(
    publisher.publish_multipart("tag", vec![Msg::from("a"), Msg::from("b")]),
    Err(ZmqError::UnsupportedFeature(_))
  ));
  factory.shutdown().unwrap();
}

#[test]
fn payload_separator_bytes_survive_the_round_trip() {
  let (factory, reactor) = common::test_factory();
  let endpoint = common::unique_endpoint();
  let (sub, received) = subscriber(&factory, Endpoint::bind(&endpoint));
  sub.subscribe("t").unwrap();
  let publisher = PubConnection::new(&factory, Endpoint::connect(&endpoint)).unwrap();

  publisher.publish("t", b"with\0inner\0zeros".as_slice()).unwrap();
  reactor.run_until_idle(common::IDLE_TURNS);

  assert_eq!(*received.borrow(), vec![(b"t".to_vec(), b"with\0inner\0zeros".to_vec())]);
  factory.shutdown().unwrap();
}
