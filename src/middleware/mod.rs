//! Middleware for observability.
//!
//! This module provides request logging with latency tracking, tagged
//! with the scan id when a request path carries one.

pub mod logging;

pub use logging::request_logging;
