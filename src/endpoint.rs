/// Whether an endpoint is bound locally or connected to a remote address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointType {
  Bind,
  Connect,
}

/// A bind/connect directive for a connection.
///
/// One connection may carry many endpoints, mixing roles and address schemes.
/// Endpoints are immutable; a connection only ever appends to its list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
  pub kind: EndpointType,
  pub address: String,
}

impl Endpoint {
  pub fn new(kind: EndpointType, address: impl Into<String>) -> Self {
    Self {
      kind,
      address: address.into(),
    }
  }

  /// An endpoint the socket will bind to.
  pub fn bind(address: impl Into<String>) -> Self {
    Self::new(EndpointType::Bind, address)
  }

  /// An endpoint the socket will connect to.
  pub fn connect(address: impl Into<String>) -> Self {
    Self::new(EndpointType::Connect, address)
  }
}
