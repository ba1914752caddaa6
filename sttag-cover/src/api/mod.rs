//! HTTP API handlers for sttag-cover
//!
//! REST endpoints to start, cancel and poll cache runs, plus an SSE stream of
//! run events.

pub mod cache;
pub mod health;
pub mod sse;

pub use cache::cache_routes;
pub use health::health_routes;
pub use sse::cache_event_stream;
