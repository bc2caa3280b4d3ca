//! HTTP server for meeting pages, the signaling relay and health checks

pub mod shared;
pub use shared::SharedState;

pub mod http_server;
pub use http_server::{build_router, run_http_server, serve};
