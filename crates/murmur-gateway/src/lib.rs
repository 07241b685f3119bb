//! Presence-and-delivery engine: who is online, where their connection is,
//! and how private messages, typing signals and unread counts reach them.

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod presence;
pub mod registry;
pub mod router;
pub mod store;
pub mod typing;
pub mod unread;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use lifecycle::{Connection, ConnectionState, Gateway, Outbound};
