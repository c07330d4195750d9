//! Arta HTTP service.
//!
//! All endpoints live under `/v1`; the same router is mounted again under
//! `/api/v1` for backward compatibility. Requests and responses are JSON,
//! errors use the `{code, message, details?}` envelope, and `/v1/chat` can
//! stream Server-Sent Events when asked to.

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use routes::build_router;
pub use state::AppState;
