pub mod api;
pub mod transport;

pub use api::RancherApi;
#[cfg(test)]
pub use transport::mock;
pub use transport::{ApiResponse, Credentials, HttpTransport, Transport, TransportError};
