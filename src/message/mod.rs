//! Message frame types shared by connections, adapters and transports.

mod blob;
mod flags;
mod msg;

pub use blob::Blob;
pub use flags::MsgFlags;
pub use msg::Msg;
