//! HTTP API Module
//!
//! Provides the bearer-protected REST API for client management.

mod auth;
mod http;
mod qr;

pub use auth::{check_bearer, require_bearer};
pub use http::{AppState, HttpServer};
pub use qr::render_png;
