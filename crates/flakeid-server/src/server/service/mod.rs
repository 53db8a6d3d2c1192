//! HTTP surface of the server.
//!
//! ## Structure
//!
//! - [`handler`] - `/generate` and `/healthz`, plus the shared [`handler::AppState`].

pub mod handler;
