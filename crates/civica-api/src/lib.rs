//! Authenticated API client for the Civica backend
//!
//! Wraps every outgoing call with bearer attachment and token rotation
//! capture, maps failures into the caller-facing error taxonomy, and exposes
//! the quiz/leaderboard/history surface as thin typed calls. Auth bootstrap
//! (login, code exchange, refresh) lives in `civica-auth`; this crate is for
//! traffic that already rides on stored tokens.

pub mod client;
pub mod error;
pub mod headers;
pub mod quiz;
pub mod resource;

pub use client::ApiClient;
pub use error::{ApiError, classify_status};
pub use resource::{Resource, resource_stream};
