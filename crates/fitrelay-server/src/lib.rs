//! # fitrelay-server
//!
//! Axum listeners for the relay: the WebSocket hub that fans device frames
//! out to every viewer, and the REST API that reads and writes the same
//! exercise store.

pub mod api;
pub mod connection;
pub mod error;
pub mod hub;
pub mod ingest;
pub mod server;

pub use error::ApiError;
pub use hub::{ConnectionHub, ConnectionId, IngestPath};
pub use ingest::ExerciseSubmission;
pub use server::{build_router, build_ws_router, start, AppState, BoundPorts, ServerHandle};
