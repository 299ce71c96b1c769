//! ezmq - event-driven ZeroMQ messaging patterns for poll-based reactors.
//!
//! This crate bridges a non-blocking, descriptor-readiness event loop with a
//! messaging transport's own internal signaling: edge-triggered readiness
//! notifications drive a per-connection pump that drains the outbound queue
//! and dispatches complete inbound multipart messages to pattern adapters
//! (publish/subscribe, push/pull, request/reply, router/dealer).
//!
//! The host reactor and the underlying transport are collaborators behind
//! traits; the crate ships a `mio`-based [`PollReactor`], a deterministic
//! [`ManualReactor`] and an in-process [`MemTransport`].

/// The connection engine: outbound queue, readiness pump, multipart framing.
pub mod connection;
/// Bind/connect endpoint descriptors.
pub mod endpoint;
/// Defines custom error types used throughout the library.
pub mod error;
/// Process-wide registry of live connections and the shared transport context.
pub mod factory;
/// Message frame types (Msg, Blob, flags).
pub mod message;
/// The reactor collaborator contract and bundled implementations.
pub mod reactor;
/// Pattern adapters layered over the connection engine.
pub mod socket;
/// The transport collaborator contract and the in-process transport.
pub mod transport;

// Re-export core types for user convenience, accessible directly from the
// crate root (e.g., `ezmq::ZmqError`, `ezmq::Factory`).
pub use connection::{Connection, ConnectionConfig, DiscardSink, MessageSink};
pub use endpoint::{Endpoint, EndpointType};
pub use error::ZmqError;
pub use factory::Factory;
pub use message::{Blob, Msg, MsgFlags};
pub use reactor::{DelayedCall, ManualReactor, PollReactor, ReadDescriptor, Reactor};
pub use socket::{
  DealerConnection, MessageHandler, PubConnection, PullConnection, PushConnection, Replier,
  ReplyConnection, ReplyFuture, RequestConnection, RouterConnection, RouterHandler, SubConnection,
};
pub use transport::{MemTransport, PollEvents, SocketOption, SocketType, Transport, TransportSocket};

/// Major version number of the ezmq library.
const VERSION_MAJOR: i32 = 0;
/// Minor version number of the ezmq library.
const VERSION_MINOR: i32 = 1;
/// Patch version number of the ezmq library.
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}
