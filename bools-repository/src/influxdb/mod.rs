//! InfluxDB implementation of the store client.
//!
//! Writes use the line protocol over `POST /write`; reads use a single
//! chunked `GET /query` response.

mod client;
pub mod line_protocol;

pub use client::{decode_chunks, InfluxDbClient, DEFAULT_QUERY_CHUNK_SIZE};
pub use line_protocol::{Point, Precision, TimestampNormalizer};
