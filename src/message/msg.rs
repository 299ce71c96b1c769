use crate::message::flags::MsgFlags;
use bytes::Bytes;
use std::fmt;

/// A single frame of a multipart message.
///
/// Frames are opaque byte strings; `Bytes` keeps clones cheap, which matters
/// because the outbound queue retains a frame until the transport accepts it.
#[derive(Clone, Default)]
pub struct Msg {
  data: Bytes,
  flags: MsgFlags,
}

impl Msg {
  /// Creates an empty frame (the request/reply delimiter is one of these).
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a frame from a `Vec<u8>`, taking ownership.
  pub fn from_vec(data: Vec<u8>) -> Self {
    Self {
      data: Bytes::from(data),
      flags: MsgFlags::empty(),
    }
  }

  /// Creates a frame from `bytes::Bytes`.
  pub fn from_bytes(data: Bytes) -> Self {
    Self {
      data,
      flags: MsgFlags::empty(),
    }
  }

  /// Creates a frame from a static byte slice (zero-copy).
  pub fn from_static(data: &'static [u8]) -> Self {
    Self {
      data: Bytes::from_static(data),
      flags: MsgFlags::empty(),
    }
  }

  /// Returns the frame payload.
  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// Returns the underlying `Bytes` (cheap reference-counted clone).
  pub fn data_bytes(&self) -> Bytes {
    self.data.clone()
  }

  /// Returns the payload size in bytes.
  pub fn size(&self) -> usize {
    self.data.len()
  }

  /// True for a zero-length frame.
  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn flags(&self) -> MsgFlags {
    self.flags
  }

  pub fn set_flags(&mut self, flags: MsgFlags) {
    self.flags = flags;
  }

  /// Checks whether the `MORE` flag is set.
  pub fn is_more(&self) -> bool {
    self.flags.contains(MsgFlags::MORE)
  }
}

impl From<Vec<u8>> for Msg {
  fn from(data: Vec<u8>) -> Self {
    Msg::from_vec(data)
  }
}

impl From<Bytes> for Msg {
  fn from(data: Bytes) -> Self {
    Msg::from_bytes(data)
  }
}

impl From<&[u8]> for Msg {
  fn from(data: &[u8]) -> Self {
    Msg::from_bytes(Bytes::copy_from_slice(data))
  }
}

impl From<&str> for Msg {
  fn from(data: &str) -> Self {
    Msg::from_bytes(Bytes::copy_from_slice(data.as_bytes()))
  }
}

impl PartialEq for Msg {
  fn eq(&self, other: &Self) -> bool {
    self.data == other.data
  }
}

impl Eq for Msg {}

impl fmt::Debug for Msg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Msg")
      .field("size", &self.size())
      .field("flags", &self.flags)
      .finish()
  }
}
