//! Interface definitions for the store clients.
//!
//! `HttpTransport` is the seam where the HTTP stack is injected and
//! `StoreClient` is the capability shared by both backend clients.

mod http_transport;
mod store_client;

pub use http_transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT,
};
pub use store_client::{Backend, StoreClient};
