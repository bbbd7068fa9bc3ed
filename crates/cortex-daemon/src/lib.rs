//! Cortex Daemon Library
//!
//! Router, tool registry, and background workers, exposed as a library so
//! integration tests can drive the HTTP surface without a running
//! process.

pub mod http;
pub mod tools;
pub mod workers;

pub use http::AppState;
