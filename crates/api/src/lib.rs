//! HTTP API: bearer-token authentication, routing, and JSON mapping.

pub mod app;
pub mod middleware;
