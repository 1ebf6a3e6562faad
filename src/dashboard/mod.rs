//! Board HTTP server module.
//!
//! Serves the board page, the JSON/HTML API used by it, and a WebSocket that
//! relays refresh signals.

mod server;
pub mod templates;

pub use server::{
    ApiError, DashboardHandle, DashboardServer, DashboardStatus, start_server,
    start_server_with_retry,
};
