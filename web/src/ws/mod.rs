//! WebSocket upgrade handler for realtime sessions.
//!
//! Only the Axum upgrade handler lives here. The hub, sessions and
//! change listener live in the `realtime` crate.

pub mod handler;
