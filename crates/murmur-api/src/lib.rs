pub mod auth;
pub mod messages;
pub mod middleware;
pub mod users;

pub use auth::{AppState, AppStateInner};
