//! Murmur server: configuration and HTTP/WebSocket routing. The binary entry
//! point is in main.rs; the router is exposed here for integration tests.

pub mod config;
pub mod routes;
