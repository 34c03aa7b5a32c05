//! HTTP transport implementations.

#[cfg(test)]
pub(crate) mod mock;
mod reqwest_transport;

pub use reqwest_transport::{ReqwestTransport, TransportOptions};
