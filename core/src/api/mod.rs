//! HTTP surface (spec §6): thin `axum` handlers over the orchestrator,
//! discovery, and storage APIs, plus the `/api/events` SSE stream fed by
//! the event bus.

pub mod envelope;
mod routes;
mod sse;

pub use routes::{AppState, router};
