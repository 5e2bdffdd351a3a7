//! HTTP API Module
//!
//! Exposes the object store over HTTP.

mod http;

pub use http::{ApiError, HttpServer};
