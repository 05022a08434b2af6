//! Client Module
//!
//! HTTP transport for provider calls.

pub mod http;

pub use http::HttpClient;
