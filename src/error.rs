use std::io;
use thiserror::Error;

/// Errors surfaced by connections, adapters and transports.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ZmqError {
  // --- I/O Errors ---
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String),

  // --- Construction/Attach Errors ---
  #[error("Socket creation failed: {0}")]
  SocketCreation(String),
  #[error("Invalid endpoint: {0}")]
  InvalidEndpoint(String),
  #[error("Address already in use: {0}")]
  AddrInUse(String),

  // --- Transport Errors ---
  /// The non-blocking operation could not complete immediately and must be
  /// retried on the next readiness signal. The only retryable condition.
  #[error("Operation would block")]
  WouldBlock,
  /// Any other send/recv failure. Fatal for the connection, never retried.
  #[error("Transport fault: {0}")]
  Transport(String),

  // --- Protocol Errors ---
  /// Unmatched correlation ID, malformed routing envelope, missing delimiter
  /// frame. A logic error, not transient noise.
  #[error("Protocol violation: {0}")]
  ProtocolViolation(String),

  // --- State Errors ---
  #[error("Operation is invalid for the current connection state: {0}")]
  InvalidState(&'static str),
  #[error("Connection closed")]
  ConnectionClosed,

  // --- Unsupported ---
  #[error("Feature not supported: {0}")]
  UnsupportedFeature(&'static str),
}

impl ZmqError {
  /// True for the retry-later condition, false for everything fatal.
  pub fn is_would_block(&self) -> bool {
    matches!(self, ZmqError::WouldBlock)
  }
}
