use bitflags::bitflags;

bitflags! {
  /// Flags associated with a `Msg`.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct MsgFlags: u8 {
    /// More frames of the same multipart message follow this one.
    const MORE = 0b01;
  }
}
