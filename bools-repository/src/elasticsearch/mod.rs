//! Elasticsearch implementation of the store client.
//!
//! This module provides the bulk writer, template bootstrap and scroll
//! reader for Elasticsearch.

mod client;
pub mod queries;
pub mod template;

pub use client::{
    BulkAction, Document, ElasticsearchClient, QueryOptions, ScrollOptions, DEFAULT_DOC_TYPE,
    DEFAULT_SCROLL_BATCH_SIZE,
};
pub use template::TEMPLATE_NAME;
