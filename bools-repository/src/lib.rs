//! # Bools Repository
//!
//! Clients for Elasticsearch and InfluxDB that write large record sequences
//! in bounded chunks and read large result sets through cursored pagination.
//! It includes the error taxonomy, connection configuration, the injectable
//! HTTP transport and the record adapters used by the binary.

pub mod adapters;
pub mod batch;
pub mod config;
pub mod connection;
pub mod elasticsearch;
pub mod errors;
pub mod influxdb;
pub mod interfaces;
pub mod transport;

pub use batch::{WriteOptions, WriteSummary, DEFAULT_WRITE_BATCH_SIZE};
pub use config::ConnectionConfig;
pub use elasticsearch::{ElasticsearchClient, QueryOptions, ScrollOptions};
pub use errors::StoreError;
pub use influxdb::{InfluxDbClient, Point, Precision};
pub use interfaces::{Backend, HttpTransport, StoreClient};
pub use transport::ReqwestTransport;
